//! Height surfaces: triangulated 2.5D terrain with vertical ray queries.

use nalgebra::{Point2, Point3, Vector3};
use relief_types::{Aabb, Mesh};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::index::BucketIndex;

/// Errors building a height surface.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    #[error("surface has no usable triangles")]
    Empty,

    #[error("grid needs at least 2x2 samples, got {cols}x{rows}")]
    GridTooSmall { cols: usize, rows: usize },

    #[error("grid has {actual} heights, expected {expected}")]
    GridSizeMismatch { expected: usize, actual: usize },

    #[error("cell size must be positive, got {0}")]
    BadCellSize(f64),
}

/// Result of a vertical ray query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    pub point: Point3<f64>,
    /// Unit normal of the hit triangle, oriented upward.
    pub normal: Vector3<f64>,
}

impl SurfaceHit {
    pub fn z(&self) -> f64 {
        self.point.z
    }
}

/// Regular raster of elevations, row-major from the minimum corner.
///
/// Non-finite heights mark nodata samples; triangles touching them are
/// left out of the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightGrid {
    pub origin: Point2<f64>,
    pub cell_size: f64,
    pub cols: usize,
    pub rows: usize,
    pub heights: Vec<f64>,
}

impl HeightGrid {
    pub fn new(
        origin: Point2<f64>,
        cell_size: f64,
        cols: usize,
        rows: usize,
        heights: Vec<f64>,
    ) -> Result<Self, SurfaceError> {
        if cols < 2 || rows < 2 {
            return Err(SurfaceError::GridTooSmall { cols, rows });
        }
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(SurfaceError::BadCellSize(cell_size));
        }
        if heights.len() != cols * rows {
            return Err(SurfaceError::GridSizeMismatch {
                expected: cols * rows,
                actual: heights.len(),
            });
        }
        Ok(Self {
            origin,
            cell_size,
            cols,
            rows,
            heights,
        })
    }

    pub fn from_fn(
        origin: Point2<f64>,
        cell_size: f64,
        cols: usize,
        rows: usize,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Self, SurfaceError> {
        let mut heights = Vec::with_capacity(cols * rows);
        for r in 0..rows {
            for c in 0..cols {
                let x = origin.x + c as f64 * cell_size;
                let y = origin.y + r as f64 * cell_size;
                heights.push(f(x, y));
            }
        }
        Self::new(origin, cell_size, cols, rows, heights)
    }

    pub fn height(&self, col: usize, row: usize) -> f64 {
        self.heights[row * self.cols + col]
    }

    /// Refine by bilinear interpolation. Each level halves the cell size.
    pub fn subdivide(&self, levels: u32) -> HeightGrid {
        let mut grid = self.clone();
        for _ in 0..levels {
            let cols = grid.cols * 2 - 1;
            let rows = grid.rows * 2 - 1;
            let mut heights = Vec::with_capacity(cols * rows);
            for r in 0..rows {
                for c in 0..cols {
                    let (c0, c1) = (c / 2, (c + 1) / 2);
                    let (r0, r1) = (r / 2, (r + 1) / 2);
                    let h = 0.25
                        * (grid.height(c0, r0)
                            + grid.height(c1, r0)
                            + grid.height(c0, r1)
                            + grid.height(c1, r1));
                    heights.push(h);
                }
            }
            grid = HeightGrid {
                origin: grid.origin,
                cell_size: grid.cell_size * 0.5,
                cols,
                rows,
                heights,
            };
        }
        grid
    }

    /// Triangulate into an upward-facing surface mesh.
    pub fn to_mesh(&self) -> Mesh {
        let mut mesh = Mesh::new();
        mesh.vertices.reserve(self.cols * self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                mesh.vertices.push(Point3::new(
                    self.origin.x + c as f64 * self.cell_size,
                    self.origin.y + r as f64 * self.cell_size,
                    self.height(c, r),
                ));
            }
        }
        let idx = |c: usize, r: usize| (r * self.cols + c) as u32;
        let ok = |i: u32| self.heights[i as usize].is_finite();
        for r in 0..self.rows - 1 {
            for c in 0..self.cols - 1 {
                let (a, b, cc, d) = (idx(c, r), idx(c + 1, r), idx(c + 1, r + 1), idx(c, r + 1));
                if ok(a) && ok(b) && ok(cc) {
                    mesh.faces.push(vec![a, b, cc]);
                }
                if ok(a) && ok(cc) && ok(d) {
                    mesh.faces.push(vec![a, cc, d]);
                }
            }
        }
        crate::topology::remove_loose(&mesh)
    }
}

/// Triangulated terrain supporting "drop a vertical ray" queries.
#[derive(Debug, Clone)]
pub struct HeightSurface {
    mesh: Mesh,
    triangles: Vec<[Point3<f64>; 3]>,
    bounds: Aabb,
    index: BucketIndex,
}

impl HeightSurface {
    /// Build from any mesh whose faces describe a height field. Faces that
    /// are vertical in plan view are ignored for ray queries.
    #[instrument(skip_all, fields(vertices = mesh.vertex_count(), faces = mesh.face_count()))]
    pub fn from_mesh(mesh: &Mesh) -> Result<Self, SurfaceError> {
        let triangles: Vec<[Point3<f64>; 3]> = mesh
            .triangles()
            .map(|[a, b, c]| {
                [
                    mesh.vertices[a as usize],
                    mesh.vertices[b as usize],
                    mesh.vertices[c as usize],
                ]
            })
            .filter(|t| plan_area2(t).abs() > 1e-300)
            .collect();
        if triangles.is_empty() {
            return Err(SurfaceError::Empty);
        }
        let bounds = Aabb::from_points(triangles.iter().flatten()).ok_or(SurfaceError::Empty)?;
        let index = BucketIndex::build(&bounds, &triangles);
        debug!(
            triangles = triangles.len(),
            buckets = index.bucket_count(),
            "height surface indexed"
        );
        Ok(Self {
            mesh: mesh.clone(),
            triangles,
            bounds,
            index,
        })
    }

    pub fn from_grid(grid: &HeightGrid) -> Result<Self, SurfaceError> {
        Self::from_mesh(&grid.to_mesh())
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Highest surface point directly below `(x, y)`, if the ray hits.
    pub fn cast_down(&self, x: f64, y: f64) -> Option<SurfaceHit> {
        self.cast_down_from(x, y, f64::INFINITY)
    }

    /// Highest surface point at or below `z_origin` under `(x, y)`.
    pub fn cast_down_from(&self, x: f64, y: f64, z_origin: f64) -> Option<SurfaceHit> {
        let slack = 1e-9 * self.bounds.diagonal().max(1.0);
        if x < self.bounds.min.x - slack
            || x > self.bounds.max.x + slack
            || y < self.bounds.min.y - slack
            || y > self.bounds.max.y + slack
        {
            return None;
        }
        let mut best: Option<SurfaceHit> = None;
        for &ti in self.index.candidates(x, y) {
            let tri = &self.triangles[ti as usize];
            let Some(z) = vertical_hit(tri, x, y) else {
                continue;
            };
            if z > z_origin {
                continue;
            }
            if best.map_or(true, |b| z > b.point.z) {
                let mut normal = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
                if normal.z < 0.0 {
                    normal = -normal;
                }
                best = Some(SurfaceHit {
                    point: Point3::new(x, y, z),
                    normal: normal.try_normalize(1e-300).unwrap_or_else(Vector3::z),
                });
            }
        }
        best
    }

    /// Mean plan-view edge length, used as the default densify spacing.
    pub fn sample_spacing(&self) -> f64 {
        let mut total = 0.0;
        let mut count = 0usize;
        for tri in &self.triangles {
            for k in 0..3 {
                let a = tri[k];
                let b = tri[(k + 1) % 3];
                total += ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
                count += 1;
            }
        }
        if count == 0 {
            return 0.0;
        }
        total / count as f64
    }
}

fn plan_area2(t: &[Point3<f64>; 3]) -> f64 {
    (t[1].x - t[0].x) * (t[2].y - t[0].y) - (t[2].x - t[0].x) * (t[1].y - t[0].y)
}

/// Z where the vertical line through `(x, y)` meets the triangle, using
/// inclusive barycentric bounds so shared edges never leak rays.
fn vertical_hit(t: &[Point3<f64>; 3], x: f64, y: f64) -> Option<f64> {
    let d = plan_area2(t);
    if d.abs() <= 1e-300 {
        return None;
    }
    let (px, py) = (x - t[0].x, y - t[0].y);
    let l1 = (px * (t[2].y - t[0].y) - py * (t[2].x - t[0].x)) / d;
    let l2 = ((t[1].x - t[0].x) * py - (t[1].y - t[0].y) * px) / d;
    let l0 = 1.0 - l1 - l2;
    const EDGE: f64 = -1e-9;
    if l0 < EDGE || l1 < EDGE || l2 < EDGE {
        return None;
    }
    // Relative form keeps flat triangles exactly flat.
    Some(t[0].z + l1 * (t[1].z - t[0].z) + l2 * (t[2].z - t[0].z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sloped() -> HeightSurface {
        let grid = HeightGrid::from_fn(Point2::new(0.0, 0.0), 1.0, 11, 11, |x, y| x + 2.0 * y).unwrap();
        HeightSurface::from_grid(&grid).unwrap()
    }

    #[test]
    fn cast_down_interpolates_plane() {
        let s = sloped();
        let hit = s.cast_down(3.25, 4.5).unwrap();
        assert_relative_eq!(hit.z(), 3.25 + 9.0, epsilon = 1e-9);
        assert!(hit.normal.z > 0.0);
    }

    #[test]
    fn cast_down_on_grid_vertex_and_edge() {
        let s = sloped();
        assert_relative_eq!(s.cast_down(5.0, 5.0).unwrap().z(), 15.0, epsilon = 1e-9);
        assert_relative_eq!(s.cast_down(10.0, 0.5).unwrap().z(), 11.0, epsilon = 1e-9);
    }

    #[test]
    fn cast_down_misses_outside_footprint() {
        let s = sloped();
        assert!(s.cast_down(-0.5, 5.0).is_none());
        assert!(s.cast_down(5.0, 10.5).is_none());
    }

    #[test]
    fn cast_down_returns_highest_layer() {
        let mut mesh = Mesh::new();
        for z in [0.0, 5.0] {
            let a = mesh.push_vertex(Point3::new(0.0, 0.0, z));
            let b = mesh.push_vertex(Point3::new(10.0, 0.0, z));
            let c = mesh.push_vertex(Point3::new(0.0, 10.0, z));
            mesh.faces.push(vec![a, b, c]);
        }
        let s = HeightSurface::from_mesh(&mesh).unwrap();
        assert_relative_eq!(s.cast_down(1.0, 1.0).unwrap().z(), 5.0);
        assert_relative_eq!(s.cast_down_from(1.0, 1.0, 4.0).unwrap().z(), 0.0);
    }

    #[test]
    fn nodata_cells_are_holes() {
        let mut heights = vec![1.0; 9];
        heights[4] = f64::NAN;
        let grid = HeightGrid::new(Point2::origin(), 1.0, 3, 3, heights).unwrap();
        let s = HeightSurface::from_grid(&grid).unwrap();
        assert!(s.cast_down(1.0, 1.0).is_none());
    }

    #[test]
    fn subdivide_doubles_resolution() {
        let grid = HeightGrid::from_fn(Point2::origin(), 2.0, 3, 3, |x, _| x).unwrap();
        let fine = grid.subdivide(1);
        assert_eq!((fine.cols, fine.rows), (5, 5));
        assert_relative_eq!(fine.cell_size, 1.0);
        assert_relative_eq!(fine.height(1, 0), 1.0);
    }

    #[test]
    fn empty_mesh_is_rejected() {
        assert_eq!(HeightSurface::from_mesh(&Mesh::new()).unwrap_err(), SurfaceError::Empty);
    }

    #[test]
    fn grid_validation() {
        assert!(matches!(
            HeightGrid::new(Point2::origin(), 1.0, 1, 5, vec![0.0; 5]),
            Err(SurfaceError::GridTooSmall { .. })
        ));
        assert!(matches!(
            HeightGrid::new(Point2::origin(), 1.0, 2, 2, vec![0.0; 3]),
            Err(SurfaceError::GridSizeMismatch { .. })
        ));
    }

    #[test]
    fn sample_spacing_on_unit_grid() {
        let s = sloped();
        let spacing = s.sample_spacing();
        assert!(spacing > 1.0 && spacing < 1.2, "spacing = {spacing}");
    }
}
