//! Planar convex-or-not polygons and plane splitting shared by the solvers.

use nalgebra::{Point3, Vector3};
use relief_types::{Aabb, Mesh};

use crate::topology::close_seams;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Plane {
    pub normal: Vector3<f64>,
    pub w: f64,
    /// Set when the normal is exactly a signed coordinate axis.
    pub axis: Option<usize>,
}

impl Plane {
    /// Plane through a loop, normal by Newell's method. `None` if degenerate.
    pub fn from_loop(points: &[Point3<f64>]) -> Option<Plane> {
        let mut n = Vector3::<f64>::zeros();
        let mut centroid = Vector3::<f64>::zeros();
        for k in 0..points.len() {
            let a = &points[k];
            let b = &points[(k + 1) % points.len()];
            n.x += (a.y - b.y) * (a.z + b.z);
            n.y += (a.z - b.z) * (a.x + b.x);
            n.z += (a.x - b.x) * (a.y + b.y);
            centroid += a.coords;
        }
        let len = n.norm();
        if !(len > 0.0 && len.is_finite()) {
            return None;
        }
        let mut normal = n / len;
        let mut axis = None;
        for i in 0..3 {
            let others = (0..3).filter(|&j| j != i).map(|j| normal[j].abs()).fold(0.0, f64::max);
            if others < 1e-12 {
                let mut snapped = Vector3::<f64>::zeros();
                snapped[i] = normal[i].signum();
                normal = snapped;
                axis = Some(i);
                break;
            }
        }
        let w = match axis {
            Some(i) => normal[i] * points[0][i],
            None => normal.dot(&(centroid / points.len() as f64)),
        };
        Some(Plane { normal, w, axis })
    }

    pub fn flipped(&self) -> Plane {
        Plane {
            normal: -self.normal,
            w: -self.w,
            axis: self.axis,
        }
    }

    pub fn distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) - self.w
    }

    fn intersect(&self, a: &Point3<f64>, b: &Point3<f64>) -> Point3<f64> {
        let da = self.distance(a);
        let db = self.distance(b);
        let t = da / (da - db);
        let mut p = a + (b - a) * t;
        if let Some(i) = self.axis {
            p[i] = self.w / self.normal[i];
        }
        p
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Polygon {
    pub vertices: Vec<Point3<f64>>,
    pub plane: Plane,
}

pub(crate) enum Split {
    CoplanarFront,
    CoplanarBack,
    Front,
    Back,
    Spanning(Option<Polygon>, Option<Polygon>),
}

const COPLANAR: u8 = 0;
const FRONT: u8 = 1;
const BACK: u8 = 2;
const SPANNING: u8 = 3;

impl Polygon {
    pub fn new(vertices: Vec<Point3<f64>>) -> Option<Polygon> {
        let plane = Plane::from_loop(&vertices)?;
        Some(Polygon { vertices, plane })
    }

    pub fn flip(&mut self) {
        self.vertices.reverse();
        self.plane = self.plane.flipped();
    }

    pub fn flipped(mut self) -> Polygon {
        self.flip();
        self
    }

    pub fn bounds(&self) -> Aabb {
        let mut bb = Aabb::new(self.vertices[0], self.vertices[0]);
        for v in &self.vertices[1..] {
            bb.include(v);
        }
        bb
    }

    pub fn centroid(&self) -> Point3<f64> {
        let sum = self
            .vertices
            .iter()
            .fold(Vector3::<f64>::zeros(), |acc, v| acc + v.coords);
        Point3::from(sum / self.vertices.len() as f64)
    }

    /// Split against `plane`. Coplanar polygons are reported by facing.
    pub fn split(&self, plane: &Plane, eps: f64) -> Split {
        let mut kind = COPLANAR;
        let types: Vec<u8> = self
            .vertices
            .iter()
            .map(|v| {
                let d = plane.distance(v);
                let t = if d < -eps {
                    BACK
                } else if d > eps {
                    FRONT
                } else {
                    COPLANAR
                };
                kind |= t;
                t
            })
            .collect();
        match kind {
            COPLANAR => {
                if plane.normal.dot(&self.plane.normal) > 0.0 {
                    Split::CoplanarFront
                } else {
                    Split::CoplanarBack
                }
            }
            FRONT => Split::Front,
            BACK => Split::Back,
            _ => {
                let n = self.vertices.len();
                let mut f = Vec::with_capacity(n + 1);
                let mut b = Vec::with_capacity(n + 1);
                for i in 0..n {
                    let j = (i + 1) % n;
                    let (ti, tj) = (types[i], types[j]);
                    let (vi, vj) = (&self.vertices[i], &self.vertices[j]);
                    if ti != BACK {
                        f.push(*vi);
                    }
                    if ti != FRONT {
                        b.push(*vi);
                    }
                    if ti | tj == SPANNING {
                        let v = plane.intersect(vi, vj);
                        f.push(v);
                        b.push(v);
                    }
                }
                let piece = |vs: Vec<Point3<f64>>| {
                    (vs.len() >= 3).then(|| Polygon {
                        vertices: vs,
                        plane: self.plane,
                    })
                };
                Split::Spanning(piece(f), piece(b))
            }
        }
    }
}

pub(crate) fn mesh_polygons(mesh: &Mesh) -> Vec<Polygon> {
    mesh.faces
        .iter()
        .filter_map(|f| Polygon::new(f.iter().map(|&i| mesh.vertices[i as usize]).collect()))
        .collect()
}

/// Assemble a polygon soup into an indexed mesh. Shared corners are
/// welded and the T-junctions left where one side of a seam was split
/// more finely than the other are threaded through.
pub(crate) fn polygons_to_mesh(polygons: &[Polygon], weld_eps: f64) -> Mesh {
    let mut soup = Mesh::new();
    for p in polygons {
        let start = soup.vertices.len() as u32;
        soup.vertices.extend_from_slice(&p.vertices);
        soup.faces
            .push((start..start + p.vertices.len() as u32).collect());
    }
    close_seams(&soup, weld_eps).0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(z: f64) -> Polygon {
        Polygon::new(vec![
            Point3::new(0.0, 0.0, z),
            Point3::new(1.0, 0.0, z),
            Point3::new(1.0, 1.0, z),
            Point3::new(0.0, 1.0, z),
        ])
        .unwrap()
    }

    #[test]
    fn axis_plane_is_snapped() {
        let p = square(2.5);
        assert_eq!(p.plane.axis, Some(2));
        assert_eq!(p.plane.normal, Vector3::z());
        assert_eq!(p.plane.w, 2.5);
    }

    #[test]
    fn spanning_split_lands_exactly_on_axis_plane() {
        let wall = Polygon::new(vec![
            Point3::new(0.0, 0.0, -9.0),
            Point3::new(1.0, 0.0, -9.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, 1.0),
        ])
        .unwrap();
        let cut = square(0.0).plane;
        let Split::Spanning(Some(front), Some(back)) = wall.split(&cut, 1e-9) else {
            panic!("expected a spanning split");
        };
        assert!(front.vertices.iter().all(|v| v.z >= 0.0));
        assert!(back.vertices.iter().all(|v| v.z <= 0.0));
        assert_eq!(front.vertices.iter().filter(|v| v.z == 0.0).count(), 2);
    }

    #[test]
    fn coplanar_split_reports_facing() {
        let a = square(0.0);
        let b = square(0.0).flipped();
        assert!(matches!(a.split(&a.plane, 1e-9), Split::CoplanarFront));
        assert!(matches!(b.split(&a.plane, 1e-9), Split::CoplanarBack));
    }

    #[test]
    fn split_soup_assembles_into_a_closed_box() {
        // Unit cube whose +X face is cut in two along z = 0.5.
        let p = |x, y, z| Point3::new(x, y, z);
        let quads = [
            [p(0., 0., 0.), p(0., 1., 0.), p(1., 1., 0.), p(1., 0., 0.)],
            [p(0., 0., 1.), p(1., 0., 1.), p(1., 1., 1.), p(0., 1., 1.)],
            [p(0., 0., 0.), p(1., 0., 0.), p(1., 0., 1.), p(0., 0., 1.)],
            [p(0., 1., 0.), p(0., 1., 1.), p(1., 1., 1.), p(1., 1., 0.)],
            [p(0., 0., 0.), p(0., 0., 1.), p(0., 1., 1.), p(0., 1., 0.)],
            [p(1., 0., 0.), p(1., 1., 0.), p(1., 1., 0.5), p(1., 0., 0.5)],
            [p(1., 0., 0.5), p(1., 1., 0.5), p(1., 1., 1.), p(1., 0., 1.)],
        ];
        let polygons: Vec<Polygon> = quads.iter().filter_map(|q| Polygon::new(q.to_vec())).collect();
        let mesh = polygons_to_mesh(&polygons, 1e-9);
        let audit = crate::topology::audit_edges(&mesh);
        assert!(audit.is_consistent(), "{audit:?}");
        approx::assert_relative_eq!(mesh.signed_volume(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_loop_has_no_plane() {
        let line = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ];
        assert!(Polygon::new(line).is_none());
    }
}
