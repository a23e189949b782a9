use relief_pipeline::PipelineConfig;

use crate::errors::FormatError;

/// Parse and validate a JSON pipeline configuration. Missing options take
/// their defaults.
pub fn load_config(json: &str) -> Result<PipelineConfig, FormatError> {
    let config: PipelineConfig = serde_json::from_str(json).map_err(|e| FormatError::ParseError(e.to_string()))?;
    config
        .validate()
        .map_err(|e| FormatError::InvalidConfig(e.to_string()))?;
    Ok(config)
}

/// Serialize a configuration to pretty-printed JSON.
pub fn save_config(config: &PipelineConfig) -> Result<String, FormatError> {
    serde_json::to_string_pretty(config).map_err(|e| FormatError::ParseError(e.to_string()))
}
