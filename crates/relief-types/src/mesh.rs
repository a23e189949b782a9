use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;

/// Polygon mesh with indexed faces.
///
/// Faces are ordered vertex-index loops of at least three entries. A closed
/// solid winds every face counter-clockwise when seen from outside.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Point3<f64>>,
    pub faces: Vec<Vec<u32>>,
}

/// Structural problems detected in a mesh.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MeshError {
    #[error("face {face} references vertex {index} but mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        face: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("face {face} has only {len} vertices")]
    DegenerateFace { face: usize, len: usize },

    #[error("vertex {index} is not finite")]
    NonFinite { index: usize },
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mesh and check every face index.
    pub fn from_parts(vertices: Vec<Point3<f64>>, faces: Vec<Vec<u32>>) -> Result<Self, MeshError> {
        let mesh = Self { vertices, faces };
        mesh.validate()?;
        Ok(mesh)
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        for (i, v) in self.vertices.iter().enumerate() {
            if !(v.x.is_finite() && v.y.is_finite() && v.z.is_finite()) {
                return Err(MeshError::NonFinite { index: i });
            }
        }
        let vertex_count = self.vertices.len();
        for (fi, face) in self.faces.iter().enumerate() {
            if face.len() < 3 {
                return Err(MeshError::DegenerateFace {
                    face: fi,
                    len: face.len(),
                });
            }
            if let Some(&index) = face.iter().find(|&&i| i as usize >= vertex_count) {
                return Err(MeshError::IndexOutOfRange {
                    face: fi,
                    index,
                    vertex_count,
                });
            }
        }
        Ok(())
    }

    /// A mesh with no faces carries no solid geometry, whatever its vertices.
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.vertices.iter())
    }

    /// Append another mesh, offsetting its indices.
    pub fn append(&mut self, other: &Mesh) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.faces.extend(
            other
                .faces
                .iter()
                .map(|f| f.iter().map(|&i| i + base).collect::<Vec<_>>()),
        );
    }

    /// Add a vertex and return its index.
    pub fn push_vertex(&mut self, p: Point3<f64>) -> u32 {
        self.vertices.push(p);
        (self.vertices.len() - 1) as u32
    }

    pub fn translate(&mut self, offset: &Vector3<f64>) {
        for v in &mut self.vertices {
            *v += offset;
        }
    }

    pub fn translated(mut self, offset: &Vector3<f64>) -> Self {
        self.translate(offset);
        self
    }

    /// Scale about the world origin.
    pub fn scale_uniform(&mut self, factor: f64) {
        for v in &mut self.vertices {
            v.coords *= factor;
        }
    }

    /// Reverse the winding of every face.
    pub fn flip(&mut self) {
        for f in &mut self.faces {
            f.reverse();
        }
    }

    /// Fan-triangulate every face. Faces are assumed planar and convex
    /// enough for a fan, which holds for everything the pipeline emits.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.faces.iter().flat_map(|f| {
            (1..f.len().saturating_sub(1)).map(move |k| [f[0], f[k], f[k + 1]])
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.faces.iter().map(|f| f.len().saturating_sub(2)).sum()
    }

    /// Area-weighted normal of a face (Newell's method). Length is twice the area.
    pub fn face_area_normal(&self, face: usize) -> Vector3<f64> {
        let f = &self.faces[face];
        let mut n = Vector3::<f64>::zeros();
        for k in 0..f.len() {
            let a = &self.vertices[f[k] as usize];
            let b = &self.vertices[f[(k + 1) % f.len()] as usize];
            n.x += (a.y - b.y) * (a.z + b.z);
            n.y += (a.z - b.z) * (a.x + b.x);
            n.z += (a.x - b.x) * (a.y + b.y);
        }
        n
    }

    pub fn face_normal(&self, face: usize) -> Vector3<f64> {
        self.face_area_normal(face)
            .try_normalize(1e-300)
            .unwrap_or_else(Vector3::z)
    }

    pub fn face_centroid(&self, face: usize) -> Point3<f64> {
        let f = &self.faces[face];
        let sum = f
            .iter()
            .fold(Vector3::<f64>::zeros(), |acc, &i| acc + self.vertices[i as usize].coords);
        Point3::from(sum / f.len() as f64)
    }

    /// Signed enclosed volume. Positive for a closed, outward-wound solid.
    pub fn signed_volume(&self) -> f64 {
        self.triangles()
            .map(|[a, b, c]| {
                let a = self.vertices[a as usize].coords;
                let b = self.vertices[b as usize].coords;
                let c = self.vertices[c as usize].coords;
                a.dot(&b.cross(&c)) / 6.0
            })
            .sum()
    }
}
