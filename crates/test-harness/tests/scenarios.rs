//! End-to-end tile scenarios through the full pipeline.
//!
//! Each scenario builds a small synthetic tile, runs it and checks the
//! produced solids with the harness oracles.

use approx::assert_relative_eq;
use relief_pipeline::{BuildingSource, CutMode, PipelineError};
use test_harness::assertions::*;
use test_harness::helpers::*;
use test_harness::{HarnessError, Scenario, Solvers};

// ── Scenario 1: Flat slab ───────────────────────────────────────────────

#[test]
fn flat_slab_spans_floor_to_surface() {
    let (out, report) = Scenario::new("slab", flat_terrain(1.0).unwrap())
        .run_with_report()
        .unwrap();

    assert_bounding_box(&out.terrain, [0.0, 0.0, 0.0], [100.0, 100.0, 1.0], 1e-9, "slab").unwrap();
    assert_volume(&out.terrain, 10_000.0, 1e-6, "slab").unwrap();
    assert_output_valid(&out).unwrap();
    assert_no_cut_failures(&out).unwrap();
    assert_eq!(report.solids.len(), 1);
}

// ── Scenario 2: Auto cut lowered below a thin base ──────────────────────

#[test]
fn auto_cut_is_lowered_when_base_is_thinner_than_relief() {
    let out = Scenario::new("slope", sloped_terrain(100.0, 0.2, 0.0).unwrap())
        .configure(|c| c.base.cut = CutMode::Auto)
        .run()
        .unwrap();

    assert_relative_eq!(out.summary.cut_elevation, 99.0, epsilon = 1e-9);
    assert_eq!(out.summary.warnings.len(), 1);
    assert_z_extent(&out.terrain, 99.0, 120.0, 1e-6, "slope").unwrap();
}

#[test]
fn auto_cut_keeps_the_full_base_when_it_is_thick_enough() {
    let out = Scenario::new("thick", sloped_terrain(100.0, 0.05, 0.0).unwrap())
        .configure(|c| c.base.cut = CutMode::Auto)
        .run()
        .unwrap();
    assert_relative_eq!(out.summary.cut_elevation, 95.0, epsilon = 1e-9);
    assert!(out.summary.warnings.is_empty());
    assert_z_extent(&out.terrain, 95.0, 105.0, 1e-6, "thick").unwrap();
}

// ── Scenario 3: Overlays on a ridge ─────────────────────────────────────

#[test]
fn roads_and_trails_follow_the_ridge() {
    let out = Scenario::new("ridge", ridge_terrain(10.0, 20.0).unwrap())
        .road(line(&[(0.0, 30.0), (100.0, 30.0)]))
        .trail(line(&[(0.0, 70.0), (50.0, 70.0), (100.0, 70.0)]))
        .run()
        .unwrap();

    assert_eq!(out.summary.roads.produced, 1);
    assert_eq!(out.summary.trails.produced, 1);
    assert_output_valid(&out).unwrap();

    let roads = out.roads.bounds().unwrap();
    assert_relative_eq!(roads.max.z, 31.0, epsilon = 1e-6);
    assert_relative_eq!(roads.min.z, 8.0, epsilon = 1e-6);
    let trails = out.trails.bounds().unwrap();
    assert_relative_eq!(trails.max.z, 30.5, epsilon = 1e-6);
}

#[test]
fn overlays_off_the_tile_are_counted_as_dropped() {
    let out = Scenario::new("off", flat_terrain(1.0).unwrap())
        .road(line(&[(200.0, 200.0), (300.0, 200.0)]))
        .road(line(&[(10.0, 10.0), (90.0, 10.0)]))
        .run()
        .unwrap();
    assert_eq!(out.summary.roads.attempted, 2);
    assert_eq!(out.summary.roads.dropped, 1);
    assert_eq!(out.summary.roads.produced, 1);
}

#[test]
fn footprint_buildings_stand_on_the_terrain() {
    let out = Scenario::new("footprint", flat_terrain(1.0).unwrap())
        .configure(|c| {
            c.buildings.enabled = true;
            c.buildings.source = BuildingSource::Footprints { height: 8.0, depth: 2.0 };
        })
        .footprint(rect_footprint(70.0, 40.0, 95.0, 60.0))
        .footprint(rect_footprint(300.0, 300.0, 320.0, 320.0))
        .run()
        .unwrap();
    assert_eq!(out.summary.buildings.attempted, 2);
    assert_eq!(out.summary.buildings.produced, 1);
    assert_bounding_box(&out.buildings, [70.0, 40.0, -1.0], [95.0, 60.0, 9.0], 1e-6, "footprint").unwrap();
    assert_output_valid(&out).unwrap();
}

// ── Scenario 4: Road labels ─────────────────────────────────────────────

#[test]
fn named_road_gets_a_label_through_its_body() {
    let out = Scenario::new("labels", flat_terrain(1.0).unwrap())
        .configure(|c| {
            c.labels.enabled = true;
            c.labels.settings.size = 8.0;
            c.labels.settings.height = 2.0;
            c.labels.settings.min_length = 20.0;
        })
        .road(named_line("Main Street", &[(10.0, 50.0), (90.0, 50.0)]))
        .run()
        .unwrap();

    assert_eq!(out.summary.labels.produced, 1);
    assert_z_extent(&out.road_labels, -1.5, 3.5, 1e-6, "labels").unwrap();
    let bb = out.road_labels.bounds().unwrap();
    assert!(bb.min.x > 10.0 && bb.max.x < 90.0);
    assert!(bb.min.y > 40.0 && bb.max.y < 60.0);
}

#[test]
fn road_names_are_matched_through_the_dataset_offset() {
    let out = Scenario::new("names", flat_terrain(1.0).unwrap())
        .configure(|c| {
            c.labels.enabled = true;
            c.labels.settings.size = 8.0;
            c.labels.settings.min_length = 20.0;
        })
        .road(line(&[(10.0, 50.0), (90.0, 50.0)]))
        .road_name(named_line("Oak Avenue", &[(5010.0, 7050.0), (5090.0, 7050.0)]))
        .run()
        .unwrap();
    assert_eq!(out.summary.labels.attempted, 1);
    assert_eq!(out.summary.labels.produced, 1);
}

// ── Scenario 5: Cutters ─────────────────────────────────────────────────

#[test]
fn notches_and_holes_remove_material() {
    let out = Scenario::new("cut", flat_terrain(20.0).unwrap())
        .configure(|c| {
            c.base.thickness = 30.0;
            c.notches.enabled = true;
            c.mounting_holes.enabled = true;
        })
        .run()
        .unwrap();
    let cuts = out.summary.cuts;
    assert_eq!(cuts.notches.attempts, 8);
    assert_eq!(cuts.mounting_holes.attempts, 4);
    assert_eq!(cuts.notches.disjoint + cuts.mounting_holes.disjoint, 0);
    assert!(out.terrain.signed_volume() < 20.0 * 10_000.0);
    assert_z_extent(&out.terrain, 0.0, 20.0, 1e-6, "cut").unwrap();
}

#[test]
fn deboss_cuts_one_group_per_glyph() {
    let out = Scenario::new("HI", flat_terrain(20.0).unwrap())
        .configure(|c| {
            c.base.thickness = 30.0;
            c.deboss.enabled = true;
        })
        .run()
        .unwrap();
    // H, I, the north N and the arrow, more if a glyph union fell back to strokes.
    assert!(out.summary.cuts.deboss.attempts >= 4);
    assert!(out.terrain.signed_volume() < 20.0 * 10_000.0);
}

#[test]
fn failing_solvers_never_abort_the_tile() {
    let out = Scenario::new("fail", flat_terrain(1.0).unwrap())
        .configure(|c| {
            c.deboss.enabled = true;
            c.notches.enabled = true;
            c.mounting_holes.enabled = true;
        })
        .solvers(Solvers::Failing)
        .run()
        .unwrap();
    let total = out.summary.cuts.total();
    assert_eq!(total.succeeded(), 0);
    assert_eq!(total.failures + total.disjoint, total.attempts);
    assert!(assert_no_cut_failures(&out).is_err());
}

#[test]
fn fallback_solver_is_reported() {
    let out = Scenario::new("fallback", flat_terrain(1.0).unwrap())
        .solvers(Solvers::FallbackOnly)
        .run()
        .unwrap();
    assert_eq!(out.summary.cuts.flat_bottom.fallback, 1);
}

// ── Scenario 6: Watertight terrain after every cut ─────────────────────

fn cut_everything(c: &mut relief_pipeline::PipelineConfig) {
    c.base.thickness = 30.0;
    c.deboss.enabled = true;
    c.notches.enabled = true;
    c.mounting_holes.enabled = true;
}

fn assert_watertight_with_exact_cuts(name: &str, terrain: relief_pipeline::TerrainSource) {
    let out = Scenario::new(name, terrain).configure(cut_everything).run().unwrap();
    let audit = relief_kernel::topology::audit_edges(&out.terrain);
    assert!(audit.is_closed(), "{name}: {audit:?}");
    assert!(audit.is_consistent(), "{name}: {audit:?}");
    assert_eq!(out.summary.repair.holes_left, 0);
    assert!(out.summary.cuts.deboss.attempts >= 4);
    assert_exact_cuts(&out).unwrap();
    assert_no_cut_failures(&out).unwrap();
    assert_output_valid(&out).unwrap();
}

#[test]
fn flat_terrain_stays_closed_through_every_cut() {
    assert_watertight_with_exact_cuts("FLAT", flat_terrain(20.0).unwrap());
}

#[test]
fn ridge_terrain_stays_closed_through_every_cut() {
    assert_watertight_with_exact_cuts("RIDGE", ridge_terrain(10.0, 20.0).unwrap());
}

#[test]
fn bumpy_terrain_stays_closed_through_every_cut() {
    assert_watertight_with_exact_cuts("BUMPY", bumpy_terrain(20.0, 5.0).unwrap());
}

#[test]
fn deboss_strokes_all_go_through_the_exact_solver() {
    let out = Scenario::new("HI", flat_terrain(20.0).unwrap())
        .configure(|c| {
            c.base.thickness = 30.0;
            c.deboss.enabled = true;
        })
        .run()
        .unwrap();
    let deboss = out.summary.cuts.deboss;
    assert_eq!(deboss.exact, deboss.attempts);
    assert_eq!(deboss.fallback, 0);
}

// ── Scenario 7: Fatal failures and scaling ──────────────────────────────

#[test]
fn cutting_above_the_surface_destroys_the_terrain() {
    let err = Scenario::new("gone", flat_terrain(1.0).unwrap())
        .configure(|c| c.base.cut = CutMode::Manual { elevation: 5.0 })
        .run()
        .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Pipeline(PipelineError::TerrainDestroyed { stage: "flat_bottom" })
    ));
}

#[test]
fn all_solids_scale_together() {
    let out = Scenario::new("scaled", flat_terrain(1.0).unwrap())
        .configure(|c| c.output.width_mm = 200.0)
        .road(line(&[(0.0, 50.0), (100.0, 50.0)]))
        .run()
        .unwrap();
    assert_bounding_box(&out.terrain, [0.0, 0.0, 0.0], [200.0, 200.0, 2.0], 1e-9, "scaled").unwrap();
    let roads = out.roads.bounds().unwrap();
    assert_relative_eq!(roads.max.z, 4.0, epsilon = 1e-6);
    assert_output_valid(&out).unwrap();
}
