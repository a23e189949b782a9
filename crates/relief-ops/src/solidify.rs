//! Solidifier: closed volumes from draped paths and draped surfaces.
//!
//! Paths get a rectangular cross-section swept along them with mitred
//! joints; surfaces are offset up and down and joined by vertical walls
//! along their boundary. Either way the result is audited, any remaining
//! openings are capped, and winding is recomputed from one reference face
//! before the solid leaves this module.

use nalgebra::{Point2, Point3, Vector2};
use relief_kernel::topology::{audit_edges, boundary_loops, cap_boundary_loops, orient_consistently};
use relief_kernel::GeometryError;
use relief_types::Mesh;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::drape::{densify, DrapedPath};
use crate::types::OpError;

/// Rectangular cross-section placed relative to the drape surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub width: f64,
    /// Top face height over the drape.
    pub above: f64,
    /// Bottom face depth under the drape.
    pub below: f64,
}

impl Profile {
    pub fn thickness(&self) -> f64 {
        self.above + self.below
    }

    fn check(&self) -> Result<(), OpError> {
        if !(self.width > 0.0 && self.thickness() > 0.0) {
            return Err(OpError::InvalidParameter {
                reason: format!(
                    "profile needs positive width and thickness, got {} x {}",
                    self.width,
                    self.thickness()
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Solidifier {
    /// Upper bound on the mitre stretch at sharp turns, in half-widths.
    pub max_miter: f64,
}

impl Default for Solidifier {
    fn default() -> Self {
        Self { max_miter: 4.0 }
    }
}

impl Solidifier {
    /// Sweep `profile` along a draped path.
    #[instrument(skip_all, fields(points = path.points.len(), closed = path.closed))]
    pub fn sweep(&self, path: &DrapedPath, profile: &Profile) -> Result<Mesh, OpError> {
        profile.check()?;
        let mut pts: Vec<Point3<f64>> = Vec::with_capacity(path.points.len());
        for p in &path.points {
            if pts.last().map_or(true, |q: &Point3<f64>| plan_distance(q, p) > 1e-9) {
                pts.push(*p);
            }
        }
        let closed = path.closed && pts.len() > 2;
        if closed && plan_distance(&pts[0], &pts[pts.len() - 1]) <= 1e-9 {
            pts.pop();
        }
        if pts.len() < 2 {
            return Err(GeometryError::Degenerate {
                reason: "path has fewer than two distinct points".into(),
            }
            .into());
        }

        let n = pts.len();
        let dirs: Vec<Vector2<f64>> = (0..n)
            .map(|i| {
                let j = if i + 1 < n { i + 1 } else { 0 };
                let d = Vector2::new(pts[j].x - pts[i].x, pts[j].y - pts[i].y);
                d.try_normalize(1e-300).unwrap_or_else(Vector2::x)
            })
            .collect();
        let half = 0.5 * profile.width;
        let mut mesh = Mesh::new();
        for (i, p) in pts.iter().enumerate() {
            let incoming = if i > 0 {
                Some(dirs[i - 1])
            } else if closed {
                Some(dirs[n - 1])
            } else {
                None
            };
            let outgoing = if i + 1 < n || closed { Some(dirs[i]) } else { None };
            let (left, stretch) = match (incoming, outgoing) {
                (Some(a), Some(b)) => {
                    let la = perp(&a);
                    let mid = (la + perp(&b)).try_normalize(1e-12).unwrap_or(la);
                    (mid, 1.0 / mid.dot(&la).max(1.0 / self.max_miter))
                }
                (Some(a), None) => (perp(&a), 1.0),
                (None, Some(b)) => (perp(&b), 1.0),
                (None, None) => (Vector2::y(), 1.0),
            };
            let off = left * half * stretch;
            let (top, bottom) = (p.z + profile.above, p.z - profile.below);
            // Ring order looking along the path: left-top, right-top,
            // right-bottom, left-bottom.
            mesh.vertices.extend([
                Point3::new(p.x + off.x, p.y + off.y, top),
                Point3::new(p.x - off.x, p.y - off.y, top),
                Point3::new(p.x - off.x, p.y - off.y, bottom),
                Point3::new(p.x + off.x, p.y + off.y, bottom),
            ]);
        }
        let segments = if closed { n } else { n - 1 };
        for i in 0..segments {
            let (a, b) = ((4 * i) as u32, (4 * ((i + 1) % n)) as u32);
            for k in 0..4u32 {
                let k1 = (k + 1) % 4;
                mesh.faces.push(vec![a + k, a + k1, b + k1, b + k]);
            }
        }
        if !closed {
            let last = (4 * (n - 1)) as u32;
            mesh.faces.push(vec![3, 2, 1, 0]);
            mesh.faces.push(vec![last, last + 1, last + 2, last + 3]);
        }
        debug!(stations = n, faces = mesh.face_count(), "profile swept");
        ensure_closed(mesh)
    }

    /// Offset an open draped surface `above` up and `below` down and close
    /// it with vertical walls along every boundary loop.
    #[instrument(skip(self, surface), fields(faces = surface.face_count()))]
    pub fn solidify_surface(&self, surface: &Mesh, above: f64, below: f64) -> Result<Mesh, OpError> {
        if surface.is_empty() {
            return Err(GeometryError::Degenerate {
                reason: "surface has no faces".into(),
            }
            .into());
        }
        if !(above + below > 0.0) {
            return Err(OpError::InvalidParameter {
                reason: format!("solid thickness must be positive, got {}", above + below),
            });
        }
        let n = surface.vertices.len() as u32;
        let mut mesh = Mesh::new();
        mesh.vertices
            .extend(surface.vertices.iter().map(|v| Point3::new(v.x, v.y, v.z + above)));
        mesh.vertices
            .extend(surface.vertices.iter().map(|v| Point3::new(v.x, v.y, v.z - below)));
        for face in &surface.faces {
            mesh.faces.push(face.clone());
            mesh.faces.push(face.iter().rev().map(|&i| i + n).collect());
        }
        let loops = boundary_loops(surface);
        for ring in &loops {
            for k in 0..ring.len() {
                let (a, b) = (ring[k], ring[(k + 1) % ring.len()]);
                mesh.faces.push(vec![b, a, a + n, b + n]);
            }
        }
        debug!(walls = loops.len(), "surface offset");
        ensure_closed(mesh)
    }

    /// Triangulate a footprint in plan at z = 0, rings densified to
    /// `spacing`. Faces point up.
    pub fn footprint_surface(
        &self,
        exterior: &[Point2<f64>],
        holes: &[Vec<Point2<f64>>],
        spacing: f64,
    ) -> Result<Mesh, OpError> {
        let mut flat: Vec<f64> = Vec::new();
        let mut hole_starts: Vec<usize> = Vec::new();
        let mut ring_points: Vec<Point2<f64>> = Vec::new();
        let outer = densify_ring(exterior, spacing);
        if outer.len() < 3 {
            return Err(GeometryError::Degenerate {
                reason: format!("footprint ring has {} points", outer.len()),
            }
            .into());
        }
        for (k, ring) in std::iter::once(outer)
            .chain(holes.iter().map(|h| densify_ring(h, spacing)))
            .enumerate()
        {
            if ring.len() < 3 {
                continue;
            }
            if k > 0 {
                hole_starts.push(ring_points.len());
            }
            flat.extend(ring.iter().flat_map(|p| [p.x, p.y]));
            ring_points.extend(ring);
        }
        let indices = earcutr::earcut(&flat, &hole_starts, 2).map_err(|e| GeometryError::Triangulation {
            reason: format!("{e:?}"),
        })?;
        let mut mesh = Mesh::new();
        mesh.vertices
            .extend(ring_points.iter().map(|p| Point3::new(p.x, p.y, 0.0)));
        for t in indices.chunks_exact(3) {
            let (a, b, c) = (ring_points[t[0]], ring_points[t[1]], ring_points[t[2]]);
            let area = (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y);
            if area > 0.0 {
                mesh.faces.push(vec![t[0] as u32, t[1] as u32, t[2] as u32]);
            } else if area < 0.0 {
                mesh.faces.push(vec![t[0] as u32, t[2] as u32, t[1] as u32]);
            }
        }
        if mesh.is_empty() {
            return Err(GeometryError::Triangulation {
                reason: "footprint produced no triangles".into(),
            }
            .into());
        }
        Ok(mesh)
    }
}

/// Close a terrain surface into a base: a copy of the surface `depth`
/// below plus side walls along its boundary.
pub fn extrude_base(surface: &Mesh, depth: f64) -> Result<Mesh, OpError> {
    Solidifier::default().solidify_surface(surface, 0.0, depth)
}

/// Cap any openings, refuse non-manifold edges and make winding
/// consistent and outward.
pub fn ensure_closed(mesh: Mesh) -> Result<Mesh, OpError> {
    let mut mesh = mesh;
    if audit_edges(&mesh).boundary_edges > 0 {
        let (capped, loops) = cap_boundary_loops(&mesh)?;
        debug!(loops, "capped open boundary");
        mesh = capped;
    }
    let audit = audit_edges(&mesh);
    if !audit.is_closed() {
        return Err(OpError::NotManifold {
            boundary_edges: audit.boundary_edges,
            non_manifold_edges: audit.non_manifold_edges,
        });
    }
    Ok(orient_consistently(&mesh))
}

fn densify_ring(ring: &[Point2<f64>], spacing: f64) -> Vec<Point2<f64>> {
    let mut pts: Vec<Point2<f64>> = ring.to_vec();
    pts.dedup();
    while pts.len() > 1 && pts.first() == pts.last() {
        pts.pop();
    }
    if pts.len() < 3 {
        return pts;
    }
    pts.push(pts[0]);
    let mut out = densify(&pts, spacing);
    out.pop();
    out
}

fn perp(d: &Vector2<f64>) -> Vector2<f64> {
    Vector2::new(-d.y, d.x)
}

fn plan_distance(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt()
}
