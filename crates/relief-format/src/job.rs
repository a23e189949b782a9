//! Job files: a configuration plus the tiles to run.

use relief_pipeline::{PipelineConfig, TileInput};
use serde::{Deserialize, Serialize};

use crate::errors::FormatError;

/// Format identifier written into every job file.
pub const JOB_FORMAT: &str = "relief-job";

/// Current job file version.
pub const JOB_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFile {
    pub format: String,
    pub version: u32,
    #[serde(default)]
    pub config: PipelineConfig,
    pub tiles: Vec<TileInput>,
}

impl JobFile {
    pub fn new(config: PipelineConfig, tiles: Vec<TileInput>) -> Self {
        Self {
            format: JOB_FORMAT.to_string(),
            version: JOB_VERSION,
            config,
            tiles,
        }
    }
}

/// Deserialize a job, checking the format identifier, version and config.
pub fn load_job(json: &str) -> Result<JobFile, FormatError> {
    let job: JobFile = serde_json::from_str(json).map_err(|e| FormatError::ParseError(e.to_string()))?;

    if job.format != JOB_FORMAT {
        return Err(FormatError::UnknownFormat(job.format));
    }
    if job.version > JOB_VERSION {
        return Err(FormatError::FutureVersion {
            file_version: job.version,
            supported_version: JOB_VERSION,
        });
    }
    job.config
        .validate()
        .map_err(|e| FormatError::InvalidConfig(e.to_string()))?;
    Ok(job)
}

pub fn save_job(job: &JobFile) -> Result<String, FormatError> {
    serde_json::to_string_pretty(job).map_err(|e| FormatError::ParseError(e.to_string()))
}
