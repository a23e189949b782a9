//! Output manifest written next to the STL files.

use chrono::{DateTime, Utc};
use relief_pipeline::{BatchReport, RunSummary, TileOutput};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One STL file produced for a tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub category: String,
    pub path: String,
    pub triangles: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestTile {
    pub name: String,
    pub files: Vec<ManifestFile>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestFailure {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: Uuid,
    pub created: DateTime<Utc>,
    pub tiles: Vec<ManifestTile>,
    pub failures: Vec<ManifestFailure>,
    pub cancelled: bool,
}

impl Manifest {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            created: Utc::now(),
            tiles: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }

    /// Record a finished tile and the files written for it.
    pub fn add_tile(&mut self, output: &TileOutput, files: Vec<ManifestFile>) {
        self.tiles.push(ManifestTile {
            name: output.name.clone(),
            files,
            summary: output.summary.clone(),
        });
    }

    /// Copy failures and the cancel flag from a finished batch.
    pub fn finish(&mut self, report: &BatchReport) {
        self.run_id = report.run_id;
        self.cancelled = report.cancelled;
        self.failures = report
            .tiles
            .iter()
            .filter_map(|t| {
                t.result.as_ref().err().map(|e| ManifestFailure {
                    name: t.name.clone(),
                    reason: e.to_string(),
                })
            })
            .collect();
    }

    pub fn triangle_total(&self) -> usize {
        self.tiles
            .iter()
            .flat_map(|t| t.files.iter())
            .map(|f| f.triangles)
            .sum()
    }

    pub fn to_json(&self) -> Result<String, crate::FormatError> {
        serde_json::to_string_pretty(self).map_err(|e| crate::FormatError::ParseError(e.to_string()))
    }
}

/// File name for one category of a tile: `<tile>_<category>.stl`.
pub fn stl_file_name(tile: &str, category: &str) -> String {
    let stem: String = tile
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{stem}_{category}.stl")
}
