//! BoundaryClipper: trims a mesh to a tile rectangle with four half-plane
//! cuts.
//!
//! Each cut runs Sutherland-Hodgman per face. Intersection vertices are
//! cached per input edge so both faces sharing an edge reuse the same new
//! vertex and connectivity survives the cut. Vertices within a small
//! tolerance of the plane are snapped onto it, which makes a second pass
//! with the same rectangle a no-op.

use std::collections::HashMap;

use nalgebra::Point3;
use relief_kernel::topology::{boundary_loops, remove_loose, triangulate_loop};
use relief_types::{Mesh, TileRect};
use tracing::{debug, instrument};

/// One side of the tile. Cuts discard geometry beyond that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    West,
    East,
    South,
    North,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::West, Side::East, Side::South, Side::North];

    fn axis(self) -> usize {
        match self {
            Side::West | Side::East => 0,
            Side::South | Side::North => 1,
        }
    }

    fn bound(self, rect: &TileRect) -> f64 {
        match self {
            Side::West => rect.min_x,
            Side::East => rect.max_x,
            Side::South => rect.min_y,
            Side::North => rect.max_y,
        }
    }

    /// Positive on the kept side.
    fn inside_distance(self, p: &Point3<f64>, bound: f64) -> f64 {
        match self {
            Side::West | Side::South => p[self.axis()] - bound,
            Side::East | Side::North => bound - p[self.axis()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryClipper {
    pub rect: TileRect,
    /// Close the openings each cut leaves in a solid with planar caps.
    pub cap: bool,
}

impl BoundaryClipper {
    /// Clipper for open surfaces: cut edges stay open.
    pub fn new(rect: TileRect) -> Self {
        Self { rect, cap: false }
    }

    /// Clipper for solids: every cut opening is capped on the cut plane.
    pub fn capped(rect: TileRect) -> Self {
        Self { rect, cap: true }
    }

    #[instrument(skip_all, fields(faces = mesh.face_count(), cap = self.cap))]
    pub fn clip(&self, mesh: &Mesh) -> Mesh {
        let mut out = mesh.clone();
        for side in Side::ALL {
            if out.is_empty() {
                break;
            }
            out = self.cut(&out, side);
        }
        let mut out = remove_loose(&out);
        snap_to_rect(&mut out, &self.rect);
        debug!(faces = out.face_count(), vertices = out.vertex_count(), "clip complete");
        out
    }

    pub fn cut(&self, mesh: &Mesh, side: Side) -> Mesh {
        clip_half_plane(mesh, side, side.bound(&self.rect), self.cap)
    }
}

fn snap_eps(mesh: &Mesh, bound: f64) -> f64 {
    1e-12 * mesh.bounds().map_or(1.0, |b| b.diagonal().max(bound.abs()).max(1.0))
}

/// Crossings made by later cuts can land within rounding of an earlier
/// plane. Put them exactly on it and clamp the rest inside.
fn snap_to_rect(mesh: &mut Mesh, rect: &TileRect) {
    let eps: Vec<(Side, f64)> = Side::ALL
        .iter()
        .map(|&side| (side, snap_eps(mesh, side.bound(rect))))
        .collect();
    for v in mesh.vertices.iter_mut() {
        for &(side, eps) in &eps {
            let bound = side.bound(rect);
            if side.inside_distance(v, bound) <= eps {
                v[side.axis()] = bound;
            }
        }
    }
}

/// Keep the part of `mesh` on the inner side of one tile boundary.
pub fn clip_half_plane(mesh: &Mesh, side: Side, bound: f64, cap: bool) -> Mesh {
    let axis = side.axis();
    let eps = snap_eps(mesh, bound);

    let mut vertices = mesh.vertices.clone();
    let mut distance = Vec::with_capacity(vertices.len());
    let mut inside = Vec::with_capacity(vertices.len());
    for v in vertices.iter_mut() {
        let d = side.inside_distance(v, bound);
        if d.abs() <= eps {
            v[axis] = bound;
            distance.push(0.0);
            inside.push(true);
        } else {
            distance.push(d);
            inside.push(d > 0.0);
        }
    }

    let mut crossings: HashMap<(u32, u32), u32> = HashMap::new();
    let mut faces = Vec::with_capacity(mesh.faces.len());
    for face in &mesh.faces {
        let n = face.len();
        let kept = face.iter().filter(|&&i| inside[i as usize]).count();
        if kept == n {
            faces.push(face.clone());
            continue;
        }
        if kept == 0 {
            continue;
        }
        let mut poly: Vec<u32> = Vec::with_capacity(n + 2);
        for k in 0..n {
            let (a, b) = (face[k], face[(k + 1) % n]);
            if inside[a as usize] {
                poly.push(a);
            }
            if inside[a as usize] != inside[b as usize] {
                let key = (a.min(b), a.max(b));
                let idx = match crossings.get(&key) {
                    Some(&idx) => idx,
                    None => {
                        let (lo, hi) = (key.0 as usize, key.1 as usize);
                        let (dl, dh) = (distance[lo], distance[hi]);
                        // An endpoint already on the plane is its own crossing.
                        let idx = if dl == 0.0 {
                            key.0
                        } else if dh == 0.0 {
                            key.1
                        } else {
                            let t = dl / (dl - dh);
                            let mut p = vertices[lo] + (vertices[hi] - vertices[lo]) * t;
                            p[axis] = bound;
                            vertices.push(p);
                            (vertices.len() - 1) as u32
                        };
                        crossings.insert(key, idx);
                        idx
                    }
                };
                poly.push(idx);
            }
        }
        poly.dedup();
        while poly.len() > 1 && poly.first() == poly.last() {
            poly.pop();
        }
        if poly.len() >= 3 {
            faces.push(poly);
        }
    }

    let mut out = Mesh { vertices, faces };
    if cap {
        cap_on_plane(&mut out, axis, bound);
    }
    remove_loose(&out)
}

/// Close boundary loops lying entirely on the cut plane.
fn cap_on_plane(mesh: &mut Mesh, axis: usize, bound: f64) {
    let mut capped = 0usize;
    for ring in boundary_loops(mesh) {
        if !ring.iter().all(|&i| mesh.vertices[i as usize][axis] == bound) {
            continue;
        }
        let reversed: Vec<u32> = ring.iter().rev().copied().collect();
        match triangulate_loop(&mesh.vertices, &reversed) {
            Ok(tris) => {
                mesh.faces.extend(tris.iter().map(|t| t.to_vec()));
                capped += 1;
            }
            Err(e) => debug!(error = %e, "cut opening left uncapped"),
        }
    }
    if capped > 0 {
        debug!(capped, axis, bound, "capped cut openings");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use relief_kernel::primitives::make_box;
    use relief_kernel::topology::audit_edges;

    #[test]
    fn capped_clip_of_a_box_stays_closed() {
        let cube = make_box(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
        let rect = TileRect::new(2.0, 8.0, -5.0, 5.0);
        let out = BoundaryClipper::capped(rect).clip(&cube);
        assert!(audit_edges(&out).is_consistent());
        assert_relative_eq!(out.signed_volume(), 300.0, epsilon = 1e-9);
        let bb = out.bounds().unwrap();
        assert_eq!((bb.min.x, bb.max.x, bb.min.y, bb.max.y), (2.0, 8.0, 0.0, 5.0));
    }

    #[test]
    fn uncapped_clip_leaves_openings() {
        let cube = make_box(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
        let out = BoundaryClipper::new(TileRect::new(2.0, 8.0, 0.0, 10.0)).clip(&cube);
        assert_eq!(audit_edges(&out).boundary_edges, 8);
    }

    #[test]
    fn z_is_interpolated_not_moved() {
        let tri = Mesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(10.0, 0.0, 10.0),
                Point3::new(0.0, 10.0, 0.0),
            ],
            faces: vec![vec![0, 1, 2]],
        };
        let out = BoundaryClipper::new(TileRect::new(0.0, 5.0, 0.0, 10.0)).clip(&tri);
        assert!(out.vertices.iter().all(|v| v.x <= 5.0));
        // Points on the x = 5 cut sit on the original sloped plane z = x.
        for v in out.vertices.iter().filter(|v| v.x == 5.0) {
            assert_relative_eq!(v.z, 5.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn shared_edges_get_one_crossing_vertex() {
        let quad = Mesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(10.0, 0.0, 0.0),
                Point3::new(10.0, 10.0, 0.0),
                Point3::new(0.0, 10.0, 0.0),
            ],
            faces: vec![vec![0, 1, 2], vec![0, 2, 3]],
        };
        let out = BoundaryClipper::new(TileRect::new(0.0, 5.0, 0.0, 10.0)).clip(&quad);
        // (0,0), (5,0), (5,5), (5,10), (0,10)
        assert_eq!(out.vertex_count(), 5);
        assert_eq!(audit_edges(&out).boundary_edges, 5);
    }

    #[test]
    fn geometry_outside_the_tile_disappears() {
        let cube = make_box(Point3::new(20.0, 20.0, 0.0), Point3::new(30.0, 30.0, 1.0));
        let out = BoundaryClipper::capped(TileRect::new(0.0, 10.0, 0.0, 10.0)).clip(&cube);
        assert!(out.is_empty());
        assert_eq!(out.vertex_count(), 0);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let cube = make_box(Point3::new(-3.0, -1.0, 0.0), Point3::new(4.0, 12.0, 2.0));
        let clipper = BoundaryClipper::capped(TileRect::new(0.0, 10.0, 0.0, 10.0));
        let once = clipper.clip(&cube);
        assert_eq!(clipper.clip(&once), once);
    }
}
