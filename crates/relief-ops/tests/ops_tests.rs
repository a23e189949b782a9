//! Integration tests across the overlay operations.

use std::cell::RefCell;
use std::rc::Rc;

use approx::assert_relative_eq;
use nalgebra::{Point2, Point3};

use relief_kernel::primitives::make_box;
use relief_kernel::topology::audit_edges;
use relief_kernel::{HeightGrid, HeightSurface, Scripted, ScriptedSolver};
use relief_ops::cutters::{notch_plan, notch_z_range};
use relief_ops::{
    BoundaryClipper, CsgEngine, DrapeSettings, LabelPlacer, LabelSettings, NotchSettings, Profile, Solidifier,
    SurfaceProjector,
};
use relief_types::{CoordinateOffset, TileRect, VectorFeature};

fn ramp() -> HeightSurface {
    let grid = HeightGrid::from_fn(Point2::origin(), 10.0, 11, 11, |x, _| 0.1 * x).unwrap();
    HeightSurface::from_grid(&grid).unwrap()
}

#[test]
fn notches_are_subtracted_one_at_a_time() {
    let tile = TileRect::new(0.0, 100.0, 0.0, 100.0);
    let settings = NotchSettings {
        size: 6.0,
        depth: 3.0,
        position_pct: 25.0,
        edge_inset_pct: 50.0,
    };
    let solver = ScriptedSolver::new("exact", Scripted::Pass);
    let journal = solver.journal();
    let fallback = ScriptedSolver::new("fast", Scripted::Fail).with_journal(journal.clone());
    let engine = CsgEngine::new(Box::new(solver), Box::new(fallback));

    let target = make_box(Point3::new(0.0, 0.0, 0.0), Point3::new(100.0, 100.0, 10.0));
    let (z0, z1) = notch_z_range(0.0, settings.depth);
    let plan = notch_plan(&tile, &settings);

    // Journal length seen at the moment each cutter is built.
    let built_at = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&built_at);
    let seen = journal.clone();
    let cutters = plan
        .iter()
        .map(|spec| spec.cutter(z0, z1).unwrap())
        .inspect(move |_| log.borrow_mut().push(seen.borrow().len()));

    let (_, tally) = engine.apply_cutters(target, cutters, "notches");

    assert_eq!(tally.attempts, 8);
    assert_eq!(tally.exact, 8);
    assert_eq!(*built_at.borrow(), (0..8).collect::<Vec<usize>>());
    let calls = journal.borrow();
    assert_eq!(calls.len(), 8);
    for (call, spec) in calls.iter().zip(&plan) {
        assert_eq!(call.op, "subtract");
        let bb = call.cutter_bounds.unwrap();
        assert!(bb.contains_xy(spec.center.x, spec.center.y));
    }
}

#[test]
fn a_failing_notch_does_not_stop_the_rest() {
    let tile = TileRect::new(0.0, 100.0, 0.0, 100.0);
    let settings = NotchSettings {
        size: 6.0,
        depth: 3.0,
        position_pct: 25.0,
        edge_inset_pct: 50.0,
    };
    let primary = ScriptedSolver::new("exact", Scripted::Pass).with_script([Scripted::Pass, Scripted::Fail]);
    let journal = primary.journal();
    let fallback = ScriptedSolver::new("fast", Scripted::Fail).with_journal(journal.clone());
    let engine = CsgEngine::new(Box::new(primary), Box::new(fallback));
    let target = make_box(Point3::new(0.0, 0.0, 0.0), Point3::new(100.0, 100.0, 10.0));
    let (z0, z1) = notch_z_range(0.0, settings.depth);
    let cutters = notch_plan(&tile, &settings).into_iter().map(|s| s.cutter(z0, z1).unwrap());

    let (out, tally) = engine.apply_cutters(target.clone(), cutters, "notches");
    assert_eq!(out, target);
    assert_eq!(tally.attempts, 8);
    assert_eq!(tally.failures, 1);
    assert_eq!(tally.exact, 7);
    assert_eq!(journal.borrow().len(), 9);
}

#[test]
fn real_notch_removes_its_prism() {
    let tile = TileRect::new(0.0, 100.0, 0.0, 100.0);
    let settings = NotchSettings {
        size: 10.0,
        depth: 3.0,
        position_pct: 25.0,
        edge_inset_pct: 100.0,
    };
    let target = make_box(Point3::new(0.0, 0.0, 0.0), Point3::new(100.0, 100.0, 10.0));
    let (z0, z1) = notch_z_range(0.0, settings.depth);
    let spec = notch_plan(&tile, &settings)[0];
    let (out, tally) = CsgEngine::default().apply_cutters(target, [spec.cutter(z0, z1).unwrap()], "notches");
    assert_eq!(tally.succeeded(), 1);
    // Whole triangle inside the tile, cut from z = 0 to 3.6.
    assert_relative_eq!(out.signed_volume(), 100_000.0 - 50.0 * 3.6, epsilon = 1e-6);
}

#[test]
fn disjoint_cutter_leaves_target_identical() {
    let target = make_box(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
    let far = make_box(Point3::new(50.0, 50.0, 50.0), Point3::new(60.0, 60.0, 60.0));
    let (out, tally) = CsgEngine::default().apply_cutters(target.clone(), [far], "holes");
    assert_eq!(out.vertex_count(), target.vertex_count());
    assert_eq!(out.signed_volume(), target.signed_volume());
    assert_eq!(tally.disjoint, 1);
}

#[test]
fn draped_road_becomes_a_closed_solid_inside_the_tile() {
    let surface = ramp();
    let projector = SurfaceProjector::new(&surface, DrapeSettings::default());
    let tile = TileRect::new(0.0, 100.0, 0.0, 100.0);
    let road = [Point2::new(-20.0, 50.0), Point2::new(50.0, 50.0), Point2::new(80.0, 90.0)];
    let profile = Profile {
        width: 4.0,
        above: 1.5,
        below: 2.0,
    };
    let paths = projector.drape_polyline(&road, false, surface.sample_spacing());
    assert_eq!(paths.len(), 1);
    let solid = Solidifier::default().sweep(&paths[0], &profile).unwrap();
    let clipped = BoundaryClipper::capped(tile).clip(&solid);
    assert!(audit_edges(&clipped).is_closed());
    let bb = clipped.bounds().unwrap();
    assert!(bb.min.x >= 0.0 && bb.max.y <= 100.0);
    assert!(clipped.signed_volume() > 0.0);
}

#[test]
fn label_solid_spans_the_road_body() {
    let grid = HeightGrid::from_fn(Point2::origin(), 10.0, 21, 21, |_, _| 10.0).unwrap();
    let surface = HeightSurface::from_grid(&grid).unwrap();
    let projector = SurfaceProjector::new(&surface, DrapeSettings::default());
    let tile = TileRect::new(0.0, 200.0, 0.0, 200.0);
    let placer = LabelPlacer::new(LabelSettings {
        size: 10.0,
        min_length: 50.0,
        ..LabelSettings::default()
    });
    let roads = [VectorFeature::polyline(vec![Point2::new(20.0, 100.0), Point2::new(180.0, 100.0)]).with_name("Oak Street")];
    let placement = placer.place(&roads, &CoordinateOffset::default(), &tile);
    assert_eq!(placement.accepted.len(), 1);
    let road = Profile {
        width: 12.0,
        above: 1.5,
        below: 20.0,
    };
    let solid = placer
        .label_solid(&placement.accepted[0], &projector, &road, &tile, surface.sample_spacing())
        .unwrap();
    assert!(!solid.is_empty());
    let bb = solid.bounds().unwrap();
    assert_relative_eq!(bb.max.z, 10.0 + 1.5 + 1.5, epsilon = 1e-9);
    assert_relative_eq!(bb.min.z, 10.0 - 20.0 - 5.0 + 1.5, epsilon = 1e-9);
    assert!(audit_edges(&solid).is_closed());
}
