//! Closed cutter primitives.

use std::f64::consts::TAU;

use nalgebra::{Point2, Point3};
use relief_types::Mesh;
use tracing::{debug, instrument};

use crate::GeometryError;

/// Axis-aligned box, six outward-wound quads.
pub fn make_box(min: Point3<f64>, max: Point3<f64>) -> Mesh {
    let (lo, hi) = (min.inf(&max), min.sup(&max));
    let v = |x: f64, y: f64, z: f64| Point3::new(x, y, z);
    Mesh {
        vertices: vec![
            v(lo.x, lo.y, lo.z),
            v(hi.x, lo.y, lo.z),
            v(hi.x, hi.y, lo.z),
            v(lo.x, hi.y, lo.z),
            v(lo.x, lo.y, hi.z),
            v(hi.x, lo.y, hi.z),
            v(hi.x, hi.y, hi.z),
            v(lo.x, hi.y, hi.z),
        ],
        faces: vec![
            vec![0, 3, 2, 1],
            vec![4, 5, 6, 7],
            vec![0, 1, 5, 4],
            vec![1, 2, 6, 5],
            vec![2, 3, 7, 6],
            vec![3, 0, 4, 7],
        ],
    }
}

/// Extrude a simple polygon outline vertically between `z0` and `z1`.
///
/// The outline may be given in either orientation and need not be convex;
/// caps are triangulated with earcut.
#[instrument(skip(outline), fields(points = outline.len()))]
pub fn make_prism(outline: &[Point2<f64>], z0: f64, z1: f64) -> Result<Mesh, GeometryError> {
    let mut ring: Vec<Point2<f64>> = outline.to_vec();
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() < 3 {
        return Err(GeometryError::Degenerate {
            reason: format!("prism outline has {} points", ring.len()),
        });
    }
    let area = signed_area(&ring);
    if area.abs() <= f64::EPSILON * bbox_scale(&ring).powi(2) {
        return Err(GeometryError::Degenerate {
            reason: "prism outline has zero area".into(),
        });
    }
    if area < 0.0 {
        ring.reverse();
    }
    let (lo, hi) = if z0 <= z1 { (z0, z1) } else { (z1, z0) };
    let n = ring.len() as u32;
    let mut mesh = Mesh::new();
    for z in [lo, hi] {
        for p in &ring {
            mesh.vertices.push(Point3::new(p.x, p.y, z));
        }
    }
    let flat: Vec<f64> = ring.iter().flat_map(|p| [p.x, p.y]).collect();
    let cap = earcutr::earcut(&flat, &[], 2).map_err(|e| GeometryError::Triangulation {
        reason: format!("{e:?}"),
    })?;
    if cap.is_empty() {
        return Err(GeometryError::Triangulation {
            reason: "earcut produced no cap triangles".into(),
        });
    }
    for t in cap.chunks_exact(3) {
        let (a, b, c) = (t[0] as u32, t[1] as u32, t[2] as u32);
        // earcut winding is not guaranteed; orient by the plan-view sign.
        let ccw = tri_area(&ring[t[0]], &ring[t[1]], &ring[t[2]]) > 0.0;
        let (b, c) = if ccw { (b, c) } else { (c, b) };
        mesh.faces.push(vec![a, c, b]);
        mesh.faces.push(vec![a + n, b + n, c + n]);
    }
    for i in 0..n {
        let j = (i + 1) % n;
        mesh.faces.push(vec![i, j, j + n, i + n]);
    }
    debug!(faces = mesh.face_count(), "prism built");
    Ok(mesh)
}

/// Vertical cylinder with centre-fan caps.
pub fn make_cylinder(center: Point2<f64>, radius: f64, z0: f64, z1: f64, segments: usize) -> Mesh {
    let segments = segments.max(3);
    let (lo, hi) = if z0 <= z1 { (z0, z1) } else { (z1, z0) };
    let n = segments as u32;
    let mut mesh = Mesh::new();
    for z in [lo, hi] {
        for k in 0..segments {
            let a = TAU * k as f64 / segments as f64;
            mesh.vertices.push(Point3::new(
                center.x + radius * a.cos(),
                center.y + radius * a.sin(),
                z,
            ));
        }
    }
    let bottom_center = mesh.push_vertex(Point3::new(center.x, center.y, lo));
    let top_center = mesh.push_vertex(Point3::new(center.x, center.y, hi));
    for i in 0..n {
        let j = (i + 1) % n;
        mesh.faces.push(vec![i, j, j + n, i + n]);
        mesh.faces.push(vec![bottom_center, j, i]);
        mesh.faces.push(vec![top_center, i + n, j + n]);
    }
    mesh
}

pub(crate) fn signed_area(ring: &[Point2<f64>]) -> f64 {
    let n = ring.len();
    0.5 * (0..n)
        .map(|i| {
            let (a, b) = (ring[i], ring[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
}

fn tri_area(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

fn bbox_scale(ring: &[Point2<f64>]) -> f64 {
    let (mut lo, mut hi) = (ring[0], ring[0]);
    for p in ring {
        lo = lo.inf(p);
        hi = hi.sup(p);
    }
    (hi - lo).norm().max(1.0)
}
