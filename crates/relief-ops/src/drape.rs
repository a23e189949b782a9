//! SurfaceProjector: vertical projection of overlay geometry onto a
//! height surface.
//!
//! Every vertex is lifted to a common height above the surface maximum and
//! dropped straight down. Misses are reported, not raised: the caller
//! decides whether a partially projected feature is still worth keeping.

use nalgebra::{Point2, Point3};
use relief_kernel::topology::remove_vertices;
use relief_kernel::HeightSurface;
use relief_types::Mesh;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrapeSettings {
    /// Rays start this far above the surface maximum.
    pub lift_margin: f64,
    /// XY margin around the surface footprint kept by the pre-prune pass.
    pub prune_margin: f64,
    /// Vertical offset added to every accepted hit.
    pub bias: f64,
}

impl Default for DrapeSettings {
    fn default() -> Self {
        Self {
            lift_margin: 500.0,
            prune_margin: 500.0,
            bias: 0.0,
        }
    }
}

/// Outcome of projecting a set of vertices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrapeResult {
    /// `(input index, projected point)`, ascending by index.
    pub projected: Vec<(usize, Point3<f64>)>,
    /// Input indices whose ray missed the surface, ascending. A missed
    /// vertex would stay at the ray start, above every surface point.
    pub failed: Vec<usize>,
}

impl DrapeResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Point3<f64>> {
        self.projected
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|k| &self.projected[k].1)
    }

    /// Move projected vertices of `mesh` into place and delete failed ones
    /// together with every face that references them.
    pub fn apply(&self, mesh: &Mesh) -> Mesh {
        let mut moved = mesh.clone();
        for &(i, p) in &self.projected {
            moved.vertices[i] = p;
        }
        let mut dead = vec![false; mesh.vertices.len()];
        for &i in &self.failed {
            dead[i] = true;
        }
        remove_vertices(&moved, &dead)
    }
}

/// A draped polyline run.
#[derive(Debug, Clone, PartialEq)]
pub struct DrapedPath {
    pub points: Vec<Point3<f64>>,
    /// The run is a full ring; the last point joins the first.
    pub closed: bool,
}

pub struct SurfaceProjector<'a> {
    surface: &'a HeightSurface,
    settings: DrapeSettings,
}

impl<'a> SurfaceProjector<'a> {
    pub fn new(surface: &'a HeightSurface, settings: DrapeSettings) -> Self {
        Self { surface, settings }
    }

    pub fn surface(&self) -> &HeightSurface {
        self.surface
    }

    pub fn settings(&self) -> &DrapeSettings {
        &self.settings
    }

    fn ray_origin_z(&self) -> f64 {
        self.surface.bounds().max.z + self.settings.lift_margin
    }

    /// Drop a ray at `(x, y)`. `None` when it misses the surface.
    pub fn project_xy(&self, x: f64, y: f64) -> Option<Point3<f64>> {
        let hit = self.surface.cast_down_from(x, y, self.ray_origin_z())?;
        Some(Point3::new(x, y, hit.z() + self.settings.bias))
    }

    /// Project every vertex of `mesh`. Input Z is ignored.
    #[instrument(skip_all, fields(vertices = mesh.vertex_count()))]
    pub fn project(&self, mesh: &Mesh) -> DrapeResult {
        let mut result = DrapeResult::default();
        for (i, v) in mesh.vertices.iter().enumerate() {
            match self.project_xy(v.x, v.y) {
                Some(p) => result.projected.push((i, p)),
                None => result.failed.push(i),
            }
        }
        debug!(
            projected = result.projected.len(),
            failed = result.failed.len(),
            "projection complete"
        );
        result
    }

    /// Pre-pass: delete vertices far outside the surface footprint, keeping
    /// any vertex that shares a face edge with one inside the margin so
    /// faces crossing the boundary survive to be projected and clipped.
    pub fn prune(&self, mesh: &Mesh) -> Mesh {
        let reach = self.surface.bounds().expanded(self.settings.prune_margin);
        let near: Vec<bool> = mesh
            .vertices
            .iter()
            .map(|v| reach.contains_xy(v.x, v.y))
            .collect();
        let mut keep = near.clone();
        for face in &mesh.faces {
            for k in 0..face.len() {
                let (a, b) = (face[k] as usize, face[(k + 1) % face.len()] as usize);
                if near[a] || near[b] {
                    keep[a] = true;
                    keep[b] = true;
                }
            }
        }
        let dead: Vec<bool> = keep.iter().map(|k| !k).collect();
        remove_vertices(mesh, &dead)
    }

    /// Prune, project and drop failures. The result may be empty.
    pub fn drape_mesh(&self, mesh: &Mesh) -> Mesh {
        let pruned = self.prune(mesh);
        if pruned.is_empty() {
            return pruned;
        }
        self.project(&pruned).apply(&pruned)
    }

    /// Drape a polyline, densified to `spacing`. The line is split into
    /// separate runs wherever projection fails; runs shorter than two
    /// points are discarded.
    pub fn drape_polyline(&self, points: &[Point2<f64>], closed: bool, spacing: f64) -> Vec<DrapedPath> {
        let mut ring: Vec<Point2<f64>> = points.to_vec();
        ring.dedup();
        if closed && ring.len() > 2 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() < 2 {
            return Vec::new();
        }
        let closed = closed && ring.len() > 2;
        let mut path = ring.clone();
        if closed {
            path.push(ring[0]);
        }

        let reach = self.surface.bounds().expanded(self.settings.prune_margin);
        let near: Vec<bool> = path.iter().map(|p| reach.contains_xy(p.x, p.y)).collect();
        let keep = |i: usize| near[i] || (i > 0 && near[i - 1]) || (i + 1 < near.len() && near[i + 1]);

        let mut runs: Vec<DrapedPath> = Vec::new();
        let mut kept: Vec<Point2<f64>> = Vec::new();
        let mut whole = true;
        for i in 0..path.len() {
            if keep(i) {
                kept.push(path[i]);
            } else {
                whole = false;
                self.project_run(&kept, spacing, &mut runs);
                kept.clear();
            }
        }
        let before = runs.len();
        self.project_run(&kept, spacing, &mut runs);
        if closed && whole && before == 0 && runs.len() == 1 {
            let run = &mut runs[0];
            if run.points.len() > 3 && run.points.first() == run.points.last() {
                run.points.pop();
                run.closed = true;
            }
        }
        runs
    }

    fn project_run(&self, points: &[Point2<f64>], spacing: f64, runs: &mut Vec<DrapedPath>) {
        if points.len() < 2 {
            return;
        }
        let mut current: Vec<Point3<f64>> = Vec::new();
        for p in densify(points, spacing) {
            match self.project_xy(p.x, p.y) {
                Some(q) => current.push(q),
                None => flush(&mut current, runs),
            }
        }
        flush(&mut current, runs);
    }
}

fn flush(current: &mut Vec<Point3<f64>>, runs: &mut Vec<DrapedPath>) {
    if current.len() >= 2 {
        runs.push(DrapedPath {
            points: std::mem::take(current),
            closed: false,
        });
    } else {
        current.clear();
    }
}

/// Insert points so no segment is longer than `spacing`. Original points
/// are kept exactly.
pub fn densify(points: &[Point2<f64>], spacing: f64) -> Vec<Point2<f64>> {
    if !(spacing > 0.0 && spacing.is_finite()) || points.len() < 2 {
        return points.to_vec();
    }
    let mut out = Vec::with_capacity(points.len());
    out.push(points[0]);
    for w in points.windows(2) {
        let (a, b) = (w[0], w[1]);
        let n = ((b - a).norm() / spacing).ceil().max(1.0) as usize;
        for k in 1..n {
            let t = k as f64 / n as f64;
            out.push(a + (b - a) * t);
        }
        out.push(b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use relief_kernel::HeightGrid;

    /// 100 x 100 plane rising 0.1 per unit of x.
    fn ramp() -> HeightSurface {
        let grid = HeightGrid::from_fn(Point2::new(0.0, 0.0), 10.0, 11, 11, |x, _| 0.1 * x).unwrap();
        HeightSurface::from_grid(&grid).unwrap()
    }

    #[test]
    fn projected_points_land_on_the_surface() {
        let s = ramp();
        let p = SurfaceProjector::new(&s, DrapeSettings::default());
        let q = p.project_xy(37.0, 12.5).unwrap();
        assert_relative_eq!(q.z, 3.7, epsilon = 1e-9);
        assert!(p.project_xy(-1.0, 50.0).is_none());
    }

    #[test]
    fn hits_far_below_the_summit_are_kept() {
        // 300-unit cliff along x = 50; the low side is far below the maximum.
        let grid = HeightGrid::from_fn(Point2::new(0.0, 0.0), 10.0, 11, 11, |x, _| if x > 50.0 { 300.0 } else { 0.0 })
            .unwrap();
        let s = HeightSurface::from_grid(&grid).unwrap();
        let p = SurfaceProjector::new(&s, DrapeSettings::default());
        assert_relative_eq!(p.project_xy(20.0, 20.0).unwrap().z, 0.0, epsilon = 1e-9);
        assert_relative_eq!(p.project_xy(80.0, 20.0).unwrap().z, 300.0, epsilon = 1e-9);
        assert!(p.project_xy(20.0, 101.0).is_none());
    }

    #[test]
    fn bias_lifts_every_hit() {
        let s = ramp();
        let settings = DrapeSettings {
            bias: 0.5,
            ..Default::default()
        };
        let q = SurfaceProjector::new(&s, settings).project_xy(50.0, 50.0).unwrap();
        assert_relative_eq!(q.z, 5.5, epsilon = 1e-9);
    }

    #[test]
    fn project_reports_exact_failures() {
        let s = ramp();
        let mesh = Mesh {
            vertices: vec![
                Point3::new(10.0, 10.0, 99.0),
                Point3::new(120.0, 10.0, 99.0),
                Point3::new(10.0, 90.0, 99.0),
            ],
            faces: vec![vec![0, 1, 2]],
        };
        let r = SurfaceProjector::new(&s, DrapeSettings::default()).project(&mesh);
        assert_eq!(r.failed, vec![1]);
        assert_eq!(r.projected.len(), 2);
        assert!(r.get(1).is_none());
        assert_relative_eq!(r.get(2).unwrap().z, 1.0, epsilon = 1e-9);
        // The only face touched the failed vertex.
        assert!(r.apply(&mesh).is_empty());
    }

    #[test]
    fn prune_keeps_vertices_connected_to_the_tile() {
        let s = ramp();
        let mesh = Mesh {
            vertices: vec![
                Point3::new(50.0, 50.0, 0.0),
                Point3::new(5000.0, 50.0, 0.0),
                Point3::new(50.0, 60.0, 0.0),
                Point3::new(9000.0, 9000.0, 0.0),
                Point3::new(9100.0, 9000.0, 0.0),
                Point3::new(9000.0, 9100.0, 0.0),
            ],
            faces: vec![vec![0, 1, 2], vec![3, 4, 5]],
        };
        let pruned = SurfaceProjector::new(&s, DrapeSettings::default()).prune(&mesh);
        assert_eq!(pruned.face_count(), 1);
        assert_eq!(pruned.vertex_count(), 3);
        assert!(pruned.vertices.iter().any(|v| v.x == 5000.0));
    }

    #[test]
    fn polyline_splits_at_misses() {
        let grid = HeightGrid::from_fn(Point2::new(0.0, 0.0), 10.0, 11, 11, |x, _| {
            if (40.0..=60.0).contains(&x) {
                f64::NAN
            } else {
                1.0
            }
        })
        .unwrap();
        let s = HeightSurface::from_grid(&grid).unwrap();
        let p = SurfaceProjector::new(&s, DrapeSettings::default());
        let runs = p.drape_polyline(&[Point2::new(5.0, 50.0), Point2::new(95.0, 50.0)], false, 5.0);
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.points.iter().all(|q| q.z == 1.0)));
        assert!(runs[0].points.last().unwrap().x <= 30.0 + 1e-9);
        assert!(runs[1].points[0].x >= 70.0 - 1e-9);
    }

    #[test]
    fn closed_ring_inside_stays_closed() {
        let s = ramp();
        let p = SurfaceProjector::new(&s, DrapeSettings::default());
        let square = [
            Point2::new(20.0, 20.0),
            Point2::new(80.0, 20.0),
            Point2::new(80.0, 80.0),
            Point2::new(20.0, 80.0),
        ];
        let runs = p.drape_polyline(&square, true, 100.0);
        assert_eq!(runs.len(), 1);
        assert!(runs[0].closed);
        assert_eq!(runs[0].points.len(), 4);
    }

    #[test]
    fn densify_keeps_endpoints_and_limits_spacing() {
        let pts = densify(&[Point2::new(0.0, 0.0), Point2::new(10.0, 0.0)], 3.0);
        assert_eq!(pts.len(), 5);
        assert_eq!(pts[0], Point2::new(0.0, 0.0));
        assert_eq!(pts[4], Point2::new(10.0, 0.0));
        assert!(pts.windows(2).all(|w| (w[1] - w[0]).norm() <= 3.0));
    }
}
