use relief_kernel::SurfaceError;
use relief_ops::OpError;

/// Errors that abort a tile run.
///
/// Per-feature and per-cutter problems never surface here; they are
/// counted in the run summary instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("terrain surface is empty")]
    EmptySurface,

    #[error("terrain surface: {0}")]
    Surface(#[from] SurfaceError),

    #[error("terrain solid destroyed during {stage}")]
    TerrainDestroyed { stage: &'static str },

    #[error(transparent)]
    Op(#[from] OpError),

    #[error("tile {tile} could not be loaded: {reason}")]
    Load { tile: String, reason: String },

    #[error("tile output rejected: {reason}")]
    Sink { reason: String },
}
