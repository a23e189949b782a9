//! Point-in-solid classification by signed vertical ray crossings.

use nalgebra::Point3;
use relief_types::{Aabb, Mesh};

use crate::index::BucketIndex;

/// Counts signed crossings of an upward ray with a closed mesh.
///
/// Upward-facing triangles count +1 and downward-facing ones -1, so the
/// total is the winding number of the query point. Ties on shared edges
/// are broken by a symbolic perturbation of the ray so each edge belongs
/// to exactly one side.
#[derive(Debug, Clone)]
pub(crate) struct SolidClassifier {
    triangles: Vec<[Point3<f64>; 3]>,
    bounds: Option<Aabb>,
    index: Option<BucketIndex>,
}

impl SolidClassifier {
    pub fn new(mesh: &Mesh) -> Self {
        let triangles: Vec<[Point3<f64>; 3]> = mesh
            .triangles()
            .map(|[a, b, c]| {
                [
                    mesh.vertices[a as usize],
                    mesh.vertices[b as usize],
                    mesh.vertices[c as usize],
                ]
            })
            .filter(|t| orient2(&t[0], &t[1], &t[2]) != 0.0)
            .collect();
        let bounds = Aabb::from_points(triangles.iter().flatten());
        let index = bounds.map(|b| BucketIndex::build(&b, &triangles));
        Self {
            triangles,
            bounds,
            index,
        }
    }

    pub fn bounds(&self) -> Option<&Aabb> {
        self.bounds.as_ref()
    }

    pub fn winding(&self, p: &Point3<f64>) -> i32 {
        let (Some(bounds), Some(index)) = (&self.bounds, &self.index) else {
            return 0;
        };
        if !bounds.contains_xy(p.x, p.y) || p.z > bounds.max.z {
            return 0;
        }
        let mut winding = 0;
        for &ti in index.candidates(p.x, p.y) {
            let t = &self.triangles[ti as usize];
            let area = orient2(&t[0], &t[1], &t[2]);
            if !covers(t, area, p) {
                continue;
            }
            let z = plane_z(t, p.x, p.y);
            if z > p.z {
                winding += if area > 0.0 { 1 } else { -1 };
            }
        }
        winding
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        self.winding(p) > 0
    }
}

fn orient2(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

/// Edge test with the ray shifted by `(e, e^2)` for infinitesimal `e`.
fn edge_side(a: &Point3<f64>, b: &Point3<f64>, p: &Point3<f64>) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let s = dx * (p.y - a.y) - dy * (p.x - a.x);
    if s != 0.0 {
        s
    } else if dy != 0.0 {
        -dy
    } else {
        dx
    }
}

fn covers(t: &[Point3<f64>; 3], area: f64, p: &Point3<f64>) -> bool {
    let s0 = edge_side(&t[0], &t[1], p);
    let s1 = edge_side(&t[1], &t[2], p);
    let s2 = edge_side(&t[2], &t[0], p);
    if area > 0.0 {
        s0 > 0.0 && s1 > 0.0 && s2 > 0.0
    } else {
        s0 < 0.0 && s1 < 0.0 && s2 < 0.0
    }
}

fn plane_z(t: &[Point3<f64>; 3], x: f64, y: f64) -> f64 {
    let n = (t[1] - t[0]).cross(&(t[2] - t[0]));
    t[0].z - (n.x * (x - t[0].x) + n.y * (y - t[0].y)) / n.z
}
