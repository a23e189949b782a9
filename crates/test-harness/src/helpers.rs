//! Helper functions: error type, terrain fixtures, feature builders.

use relief_kernel::HeightGrid;
use relief_pipeline::{CutMode, PipelineConfig, RoadConfig, TerrainSource, TileInput};
use relief_types::{Point2, VectorFeature};

// ── Error Type ──────────────────────────────────────────────────────────────

/// Unified error type for the test harness.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("assertion failed: {detail}")]
    AssertionFailed { detail: String },

    #[error("oracle failure ({oracle}): {detail}")]
    OracleFailure { oracle: String, detail: String },

    #[error("pipeline error: {0}")]
    Pipeline(#[from] relief_pipeline::PipelineError),

    #[error("format error: {0}")]
    Format(#[from] relief_format::FormatError),

    #[error("fixture error: {0}")]
    Fixture(String),
}

// ── Terrain Fixtures ────────────────────────────────────────────────────────

/// Grid with `cells × cells` cells of size `cell`, origin at (0, 0).
pub fn grid(cells: usize, cell: f64, f: impl Fn(f64, f64) -> f64) -> Result<HeightGrid, HarnessError> {
    HeightGrid::from_fn(Point2::origin(), cell, cells + 1, cells + 1, f).map_err(|e| HarnessError::Fixture(e.to_string()))
}

/// Flat 100×100 terrain at height `z`.
pub fn flat_terrain(z: f64) -> Result<TerrainSource, HarnessError> {
    Ok(TerrainSource::Grid(grid(10, 10.0, |_, _| z)?))
}

/// 100×100 plane rising `slope_x` per unit in X and `slope_y` in Y from `z0`.
pub fn sloped_terrain(z0: f64, slope_x: f64, slope_y: f64) -> Result<TerrainSource, HarnessError> {
    Ok(TerrainSource::Grid(grid(10, 10.0, |x, y| z0 + slope_x * x + slope_y * y)?))
}

/// 100×100 terrain with a ridge along x = 50 peaking at `z0 + peak`.
pub fn ridge_terrain(z0: f64, peak: f64) -> Result<TerrainSource, HarnessError> {
    Ok(TerrainSource::Grid(grid(20, 5.0, |x, _| {
        z0 + peak * (1.0 - (x - 50.0).abs() / 50.0)
    })?))
}

/// 100×100 rolling terrain of amplitude `amp` around `z0`.
pub fn bumpy_terrain(z0: f64, amp: f64) -> Result<TerrainSource, HarnessError> {
    Ok(TerrainSource::Grid(grid(20, 5.0, |x, y| {
        z0 + amp * (x / 11.0).sin() * (y / 17.0).cos()
    })?))
}

pub fn tile(name: &str, terrain: TerrainSource) -> TileInput {
    TileInput::new(name, terrain)
}

// ── Feature Builders ────────────────────────────────────────────────────────

pub fn line(points: &[(f64, f64)]) -> VectorFeature {
    VectorFeature::polyline(points.iter().map(|&(x, y)| Point2::new(x, y)).collect())
}

pub fn named_line(name: &str, points: &[(f64, f64)]) -> VectorFeature {
    line(points).with_name(name)
}

/// Axis-aligned rectangular footprint.
pub fn rect_footprint(x0: f64, y0: f64, x1: f64, y1: f64) -> VectorFeature {
    VectorFeature::polygon(vec![
        Point2::new(x0, y0),
        Point2::new(x1, y0),
        Point2::new(x1, y1),
        Point2::new(x0, y1),
    ])
}

// ── Configurations ──────────────────────────────────────────────────────────

/// Config sized for 100-unit tiles: one model unit per millimetre, thin
/// base cut at zero, no deboss, narrow roads.
pub fn small_config() -> PipelineConfig {
    let mut config = PipelineConfig::new();
    config.output.width_mm = 100.0;
    config.base.thickness = 10.0;
    config.base.cut = CutMode::Manual { elevation: 0.0 };
    config.base.min_cutter_height = 50.0;
    config.deboss.enabled = false;
    config.roads = RoadConfig {
        width: 4.0,
        height: 1.0,
        depth: 2.0,
    };
    config.trails = RoadConfig {
        width: 2.0,
        height: 0.5,
        depth: 1.0,
    };
    config
}
