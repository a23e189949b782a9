//! Per-tile terrain-to-solid runs and sequential batch processing.

pub mod batch;
pub mod config;
pub mod error;
pub mod input;
pub mod run;

pub use batch::{run_batch, BatchReport, CancelToken, TileOutcome};
pub use config::{
    BaseConfig, BuildingConfig, BuildingSource, CityJsonConfig, CutMode, DebossConfig, DetailConfig, HoleConfig,
    LabelConfig, NotchConfig, OutputConfig, PipelineConfig, RoadConfig,
};
pub use error::PipelineError;
pub use input::{CityJsonInput, TerrainSource, TileInput};
pub use run::{CategoryCounts, CutGroups, RunSummary, TileOutput, TileRun};
