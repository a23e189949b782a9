//! STL export: binary and ASCII.
//!
//! Polygon faces are fan-triangulated; no shared-vertex topology survives.
//! Normals are recomputed per triangle from the winding.

use std::io::Write;

use relief_types::{Mesh, Point3, Vector3};

use crate::errors::FormatError;

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

fn check(mesh: &Mesh) -> Result<usize, FormatError> {
    let vertices = mesh.vertices.len();
    for face in &mesh.faces {
        if let Some(&index) = face.iter().find(|&&i| i as usize >= vertices) {
            return Err(FormatError::IndexOutOfRange { index, vertices });
        }
    }
    let count = mesh.triangle_count();
    if count == 0 {
        return Err(FormatError::EmptyMesh);
    }
    Ok(count)
}

fn facets(mesh: &Mesh) -> impl Iterator<Item = ([f32; 3], [Point3<f64>; 3])> + '_ {
    mesh.triangles().map(|[a, b, c]| {
        let tri = [
            mesh.vertices[a as usize],
            mesh.vertices[b as usize],
            mesh.vertices[c as usize],
        ];
        let n = (tri[1] - tri[0]).cross(&(tri[2] - tri[0]));
        let n = n.try_normalize(1e-12).unwrap_or_else(Vector3::z);
        ([n.x as f32, n.y as f32, n.z as f32], tri)
    })
}

/// Encode `mesh` as binary STL.
///
/// Layout: 80-byte header, u32 little-endian triangle count, then per
/// triangle 3×f32 normal, 3×3×f32 vertices and a zero u16 attribute.
pub fn binary_stl(mesh: &Mesh, name: &str) -> Result<Vec<u8>, FormatError> {
    let count = check(mesh)?;
    let count32 = u32::try_from(count).map_err(|_| FormatError::Io(format!("{count} triangles exceed STL limit")))?;
    let mut buf = Vec::with_capacity(HEADER_LEN + 4 + count * FACET_LEN);

    let header = format!("binary STL: {name}");
    let bytes = header.as_bytes();
    buf.extend_from_slice(&bytes[..bytes.len().min(HEADER_LEN)]);
    buf.resize(HEADER_LEN, 0u8);
    buf.extend_from_slice(&count32.to_le_bytes());

    for (normal, tri) in facets(mesh) {
        for c in normal {
            buf.extend_from_slice(&c.to_le_bytes());
        }
        for p in &tri {
            for c in [p.x, p.y, p.z] {
                buf.extend_from_slice(&(c as f32).to_le_bytes());
            }
        }
        buf.extend_from_slice(&0u16.to_le_bytes());
    }
    Ok(buf)
}

/// Encode `mesh` as ASCII STL.
pub fn ascii_stl(mesh: &Mesh, name: &str) -> Result<String, FormatError> {
    let count = check(mesh)?;
    let mut out = String::with_capacity(count * 256);
    out.push_str(&format!("solid {name}\n"));
    for (n, tri) in facets(mesh) {
        out.push_str(&format!("  facet normal {} {} {}\n", n[0], n[1], n[2]));
        out.push_str("    outer loop\n");
        for p in &tri {
            out.push_str(&format!("      vertex {} {} {}\n", p.x as f32, p.y as f32, p.z as f32));
        }
        out.push_str("    endloop\n");
        out.push_str("  endfacet\n");
    }
    out.push_str(&format!("endsolid {name}\n"));
    Ok(out)
}

/// Write binary STL to `writer`, returning the triangle count.
pub fn write_binary_stl<W: Write>(writer: &mut W, mesh: &Mesh, name: &str) -> Result<usize, FormatError> {
    let bytes = binary_stl(mesh, name)?;
    writer.write_all(&bytes)?;
    Ok((bytes.len() - HEADER_LEN - 4) / FACET_LEN)
}
