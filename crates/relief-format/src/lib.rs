//! File formats for relief runs: STL output, JSON configs, job files and
//! the output manifest.

pub mod config;
pub mod errors;
pub mod job;
pub mod manifest;
pub mod stl;

pub use config::{load_config, save_config};
pub use errors::FormatError;
pub use job::{load_job, save_job, JobFile, JOB_FORMAT, JOB_VERSION};
pub use manifest::{stl_file_name, Manifest, ManifestFailure, ManifestFile, ManifestTile};
pub use stl::{ascii_stl, binary_stl, write_binary_stl};
