//! End-to-end tile runs on small synthetic terrain.

use approx::assert_relative_eq;
use relief_kernel::{HeightGrid, Scripted, ScriptedSolver};
use relief_ops::CsgEngine;
use relief_pipeline::{CutMode, PipelineConfig, PipelineError, RoadConfig, TerrainSource, TileInput, TileRun};
use relief_types::{Point2, VectorFeature};

fn flat(name: &str, z: f64) -> TileInput {
    let grid = HeightGrid::from_fn(Point2::origin(), 10.0, 11, 11, |_, _| z).unwrap();
    TileInput::new(name, TerrainSource::Grid(grid))
}

fn config() -> PipelineConfig {
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
    config
}

fn road(points: &[(f64, f64)]) -> VectorFeature {
    VectorFeature::polyline(points.iter().map(|&(x, y)| Point2::new(x, y)).collect())
}

// ---------------------------------------------------------------------------
// Terrain only
// ---------------------------------------------------------------------------

#[test]
fn flat_surface_becomes_a_slab_between_floor_and_surface() {
    let config = config();
    let out = TileRun::new(&config).unwrap().run(&flat("slab", 1.0)).unwrap();
    let bb = out.terrain.bounds().unwrap();
    assert_relative_eq!(bb.min.z, 0.0, epsilon = 1e-9);
    assert_relative_eq!(bb.max.z, 1.0, epsilon = 1e-9);
    assert_relative_eq!(bb.extent().x, 100.0, epsilon = 1e-9);
    assert_relative_eq!(out.terrain.signed_volume(), 100.0 * 100.0, max_relative = 1e-6);
    assert!(out.buildings.is_empty() && out.roads.is_empty());
}

#[test]
fn summary_carries_counts_and_identity() {
    let config = config();
    let run = TileRun::new(&config).unwrap();
    let a = run.run(&flat("a", 1.0)).unwrap().summary;
    let b = run.run(&flat("b", 1.0)).unwrap().summary;
    assert_eq!(a.tile, "a");
    assert_ne!(a.run_id, b.run_id);
    assert!(a.faces > 0 && a.vertices > 0);
    assert_eq!(a.cuts.total().attempts, 1);
}

// ---------------------------------------------------------------------------
// Overlays
// ---------------------------------------------------------------------------

#[test]
fn road_sits_on_the_terrain_and_stays_in_the_tile() {
    let mut input = flat("roads", 1.0);
    input.roads = vec![
        road(&[(-20.0, 50.0), (50.0, 50.0), (120.0, 50.0)]),
        road(&[(300.0, 300.0), (400.0, 300.0)]),
    ];
    let config = config();
    let out = TileRun::new(&config).unwrap().run(&input).unwrap();

    assert_eq!(out.summary.roads.attempted, 2);
    assert_eq!(out.summary.roads.produced, 1);
    assert_eq!(out.summary.roads.dropped, 1);

    let bb = out.roads.bounds().unwrap();
    assert!(bb.min.x >= -1e-6 && bb.max.x <= 100.0 + 1e-6);
    assert_relative_eq!(bb.max.z, 2.0, epsilon = 1e-6);
    assert_relative_eq!(bb.min.z, -1.0, epsilon = 1e-6);
    assert!(out.solids().iter().any(|(name, _)| *name == "roads"));
}

#[test]
fn trails_use_their_own_profile() {
    let mut input = flat("trails", 1.0);
    input.trails = vec![road(&[(10.0, 10.0), (90.0, 90.0)])];
    let mut config = config();
    config.trails = RoadConfig {
        width: 2.0,
        height: 0.5,
        depth: 1.0,
    };
    let out = TileRun::new(&config).unwrap().run(&input).unwrap();
    let bb = out.trails.bounds().unwrap();
    assert_relative_eq!(bb.max.z, 1.5, epsilon = 1e-6);
    assert_eq!(out.summary.trails.produced, 1);
}

#[test]
fn footprint_buildings_are_draped_and_extruded() {
    let mut input = flat("buildings", 1.0);
    input.buildings = vec![VectorFeature::polygon(vec![
        Point2::new(20.0, 20.0),
        Point2::new(40.0, 20.0),
        Point2::new(40.0, 35.0),
        Point2::new(20.0, 35.0),
    ])];
    let mut config = config();
    config.buildings.enabled = true;
    config.buildings.source = relief_pipeline::BuildingSource::Footprints { height: 12.0, depth: 3.0 };
    let out = TileRun::new(&config).unwrap().run(&input).unwrap();
    let bb = out.buildings.bounds().unwrap();
    assert_relative_eq!(bb.max.z, 13.0, epsilon = 1e-6);
    assert_relative_eq!(bb.min.z, -2.0, epsilon = 1e-6);
    assert_eq!(out.summary.buildings.produced, 1);
}

// ---------------------------------------------------------------------------
// Cutters and failures
// ---------------------------------------------------------------------------

#[test]
fn solver_failures_leave_terrain_intact() {
    let mut config = config();
    config.deboss.enabled = true;
    config.notches.enabled = true;
    config.mounting_holes.enabled = true;
    let engine = CsgEngine::new(
        Box::new(ScriptedSolver::new("exact", Scripted::Fail)),
        Box::new(ScriptedSolver::new("fast", Scripted::Fail)),
    );
    let out = TileRun::with_engine(&config, engine).unwrap().run(&flat("fail", 1.0)).unwrap();
    let cuts = out.summary.cuts;
    assert_eq!(cuts.total().succeeded(), 0);
    assert!(cuts.deboss.attempts > 0);
    assert_eq!(cuts.notches.attempts, 8);
    assert_eq!(cuts.mounting_holes.attempts, 4);
    let bb = out.terrain.bounds().unwrap();
    assert_relative_eq!(bb.min.z, -9.0, epsilon = 1e-9);
}

#[test]
fn fallback_successes_are_counted_separately() {
    let engine = CsgEngine::new(
        Box::new(ScriptedSolver::new("exact", Scripted::Fail)),
        Box::new(ScriptedSolver::new("fast", Scripted::Pass)),
    );
    let config = config();
    let out = TileRun::with_engine(&config, engine).unwrap().run(&flat("fallback", 1.0)).unwrap();
    assert_eq!(out.summary.cuts.flat_bottom.fallback, 1);
    assert_eq!(out.summary.cuts.flat_bottom.exact, 0);
}

#[test]
fn nodata_terrain_is_rejected() {
    let grid = HeightGrid::from_fn(Point2::origin(), 10.0, 3, 3, |_, _| f64::NAN).unwrap();
    let config = config();
    let result = TileRun::new(&config)
        .unwrap()
        .run(&TileInput::new("void", TerrainSource::Grid(grid)));
    assert!(matches!(result, Err(PipelineError::EmptySurface) | Err(PipelineError::Surface(_))));
}
