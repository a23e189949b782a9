//! Index-mesh topology utilities: edge audit, loose-geometry removal,
//! welding, seam closing, winding repair and boundary capping.

use std::collections::{HashMap, VecDeque};

use nalgebra::{Point3, Vector3};
use relief_types::Mesh;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::GeometryError;

/// Edge-use statistics for a mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeAudit {
    pub edges: usize,
    /// Edges used by exactly one face.
    pub boundary_edges: usize,
    /// Edges used by more than two faces.
    pub non_manifold_edges: usize,
    /// Two-face edges traversed in the same direction by both faces.
    pub inconsistent_edges: usize,
}

impl EdgeAudit {
    /// Two-manifold and closed: every edge shared by exactly two faces.
    pub fn is_closed(&self) -> bool {
        self.boundary_edges == 0 && self.non_manifold_edges == 0
    }

    pub fn is_consistent(&self) -> bool {
        self.is_closed() && self.inconsistent_edges == 0
    }
}

fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn face_edges(face: &[u32]) -> impl Iterator<Item = (u32, u32)> + '_ {
    (0..face.len()).map(move |k| (face[k], face[(k + 1) % face.len()]))
}

/// Count boundary, non-manifold and inconsistently wound edges.
pub fn audit_edges(mesh: &Mesh) -> EdgeAudit {
    // (forward uses, backward uses) keyed by the sorted pair
    let mut uses: HashMap<(u32, u32), (u32, u32)> = HashMap::new();
    for face in &mesh.faces {
        for (a, b) in face_edges(face) {
            if a == b {
                continue;
            }
            let e = uses.entry(edge_key(a, b)).or_default();
            if a < b {
                e.0 += 1;
            } else {
                e.1 += 1;
            }
        }
    }
    let mut audit = EdgeAudit {
        edges: uses.len(),
        ..Default::default()
    };
    for &(fwd, bwd) in uses.values() {
        match fwd + bwd {
            1 => audit.boundary_edges += 1,
            2 if fwd != 1 => audit.inconsistent_edges += 1,
            2 => {}
            _ => audit.non_manifold_edges += 1,
        }
    }
    audit
}

/// Drop vertices referenced by no face, renumbering the rest in order.
pub fn remove_loose(mesh: &Mesh) -> Mesh {
    let mut used = vec![false; mesh.vertices.len()];
    for face in &mesh.faces {
        for &i in face {
            used[i as usize] = true;
        }
    }
    compact(mesh, &used)
}

/// Delete flagged vertices together with every face touching them,
/// then drop whatever became loose.
pub fn remove_vertices(mesh: &Mesh, dead: &[bool]) -> Mesh {
    let faces = mesh
        .faces
        .iter()
        .filter(|f| f.iter().all(|&i| !dead[i as usize]))
        .cloned()
        .collect();
    remove_loose(&Mesh {
        vertices: mesh.vertices.clone(),
        faces,
    })
}

fn compact(mesh: &Mesh, keep: &[bool]) -> Mesh {
    let mut remap = vec![u32::MAX; mesh.vertices.len()];
    let mut vertices = Vec::with_capacity(mesh.vertices.len());
    for (i, v) in mesh.vertices.iter().enumerate() {
        if keep[i] {
            remap[i] = vertices.len() as u32;
            vertices.push(*v);
        }
    }
    let faces = mesh
        .faces
        .iter()
        .filter(|f| f.iter().all(|&i| keep[i as usize]))
        .map(|f| f.iter().map(|&i| remap[i as usize]).collect())
        .collect();
    Mesh { vertices, faces }
}

/// Merge vertices closer than `eps` and drop faces that collapse.
///
/// Uses a hashed grid of cell size `eps`; candidates in the 27 neighbouring
/// cells are compared by true distance.
#[instrument(skip(mesh), fields(vertices = mesh.vertex_count()))]
pub fn weld(mesh: &Mesh, eps: f64) -> Mesh {
    let eps = eps.max(f64::MIN_POSITIVE);
    let cell = |p: &Point3<f64>| {
        (
            (p.x / eps).floor() as i64,
            (p.y / eps).floor() as i64,
            (p.z / eps).floor() as i64,
        )
    };
    let mut grid: HashMap<(i64, i64, i64), Vec<u32>> = HashMap::new();
    let mut remap = Vec::with_capacity(mesh.vertices.len());
    let mut vertices: Vec<Point3<f64>> = Vec::new();
    for v in &mesh.vertices {
        let (cx, cy, cz) = cell(v);
        let mut found = None;
        'search: for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    if let Some(bucket) = grid.get(&(cx + dx, cy + dy, cz + dz)) {
                        for &j in bucket {
                            if (vertices[j as usize] - v).norm() <= eps {
                                found = Some(j);
                                break 'search;
                            }
                        }
                    }
                }
            }
        }
        let index = match found {
            Some(j) => j,
            None => {
                let j = vertices.len() as u32;
                vertices.push(*v);
                grid.entry((cx, cy, cz)).or_default().push(j);
                j
            }
        };
        remap.push(index);
    }
    let merged = mesh.vertices.len() - vertices.len();
    let faces = mesh
        .faces
        .iter()
        .filter_map(|f| {
            let mut out: Vec<u32> = Vec::with_capacity(f.len());
            for &i in f {
                let r = remap[i as usize];
                if out.last() != Some(&r) {
                    out.push(r);
                }
            }
            while out.len() > 1 && out.first() == out.last() {
                out.pop();
            }
            (out.len() >= 3).then_some(out)
        })
        .collect();
    debug!(merged, "weld complete");
    remove_loose(&Mesh { vertices, faces })
}

/// Make winding consistent across each edge-connected component.
///
/// The first face of a component is the reference. Closed components are
/// then flipped as a whole if they enclose negative volume; open ones are
/// flipped if their net normal points down.
#[instrument(skip_all, fields(faces = mesh.face_count()))]
pub fn orient_consistently(mesh: &Mesh) -> Mesh {
    let mut adjacency: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
    for (fi, face) in mesh.faces.iter().enumerate() {
        for (a, b) in face_edges(face) {
            adjacency.entry(edge_key(a, b)).or_default().push(fi);
        }
    }
    let mut out = mesh.clone();
    let mut visited = vec![false; mesh.faces.len()];
    let mut flips = 0usize;
    for seed in 0..mesh.faces.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut component = vec![seed];
        let mut queue = VecDeque::from([seed]);
        while let Some(fi) = queue.pop_front() {
            let face = out.faces[fi].clone();
            for (a, b) in face_edges(&face) {
                let Some(neighbours) = adjacency.get(&edge_key(a, b)) else {
                    continue;
                };
                // Only propagate across manifold edges.
                if neighbours.len() != 2 {
                    continue;
                }
                for &nj in neighbours {
                    if nj == fi || visited[nj] {
                        continue;
                    }
                    let same_direction = face_edges(&out.faces[nj]).any(|(c, d)| c == a && d == b);
                    if same_direction {
                        out.faces[nj].reverse();
                        flips += 1;
                    }
                    visited[nj] = true;
                    component.push(nj);
                    queue.push_back(nj);
                }
            }
        }
        if component_should_flip(&out, &component, &adjacency) {
            for &fi in &component {
                out.faces[fi].reverse();
            }
            flips += component.len();
        }
    }
    debug!(flips, "winding pass complete");
    out
}

fn component_should_flip(
    mesh: &Mesh,
    component: &[usize],
    adjacency: &HashMap<(u32, u32), Vec<usize>>,
) -> bool {
    let closed = component.iter().all(|&fi| {
        face_edges(&mesh.faces[fi]).all(|(a, b)| {
            adjacency
                .get(&edge_key(a, b))
                .is_some_and(|n| n.len() == 2)
        })
    });
    if closed {
        let volume: f64 = component
            .iter()
            .map(|&fi| {
                let f = &mesh.faces[fi];
                let a = mesh.vertices[f[0] as usize].coords;
                (1..f.len() - 1)
                    .map(|k| {
                        let b = mesh.vertices[f[k] as usize].coords;
                        let c = mesh.vertices[f[k + 1] as usize].coords;
                        a.dot(&b.cross(&c)) / 6.0
                    })
                    .sum::<f64>()
            })
            .sum();
        volume < 0.0
    } else {
        let normal: Vector3<f64> = component
            .iter()
            .map(|&fi| mesh.face_area_normal(fi))
            .sum();
        normal.z < 0.0
    }
}

/// Chain boundary edges into directed loops.
///
/// Each loop follows the direction its edges have in their single owning
/// face, so a cap face must traverse it reversed.
pub fn boundary_loops(mesh: &Mesh) -> Vec<Vec<u32>> {
    let mut counts: HashMap<(u32, u32), u32> = HashMap::new();
    for face in &mesh.faces {
        for (a, b) in face_edges(face) {
            *counts.entry(edge_key(a, b)).or_default() += 1;
        }
    }
    let mut next: HashMap<u32, Vec<u32>> = HashMap::new();
    for face in &mesh.faces {
        for (a, b) in face_edges(face) {
            if counts.get(&edge_key(a, b)) == Some(&1) {
                next.entry(a).or_default().push(b);
            }
        }
    }
    let mut starts: Vec<u32> = next.keys().copied().collect();
    starts.sort_unstable();
    let mut loops = Vec::new();
    for start in starts {
        while let Some(first) = next.get_mut(&start).and_then(|v| v.pop()) {
            let mut ring = vec![start];
            let mut cur = first;
            let mut guard = 0usize;
            while cur != start && guard <= counts.len() {
                ring.push(cur);
                match next.get_mut(&cur).and_then(|v| v.pop()) {
                    Some(n) => cur = n,
                    None => break,
                }
                guard += 1;
            }
            if cur == start && ring.len() >= 3 {
                loops.push(ring);
            }
        }
    }
    loops
}

/// Close every boundary loop with a triangulated cap.
///
/// Loops are projected onto the plane orthogonal to their dominant normal
/// axis and triangulated with earcut. Returns the capped mesh and the
/// number of loops closed.
pub fn cap_boundary_loops(mesh: &Mesh) -> Result<(Mesh, usize), GeometryError> {
    let loops = boundary_loops(mesh);
    let mut out = mesh.clone();
    let mut capped = 0;
    for ring in &loops {
        let cap: Vec<u32> = ring.iter().rev().copied().collect();
        for tri in triangulate_loop(&out.vertices, &cap)? {
            out.faces.push(tri.to_vec());
        }
        capped += 1;
    }
    Ok((out, capped))
}

/// Triangulate a (roughly planar) polygon given by vertex indices,
/// keeping its winding.
pub fn triangulate_loop(vertices: &[Point3<f64>], ring: &[u32]) -> Result<Vec<[u32; 3]>, GeometryError> {
    if ring.len() == 3 {
        return Ok(vec![[ring[0], ring[1], ring[2]]]);
    }
    let mut normal = Vector3::<f64>::zeros();
    for k in 0..ring.len() {
        let a = &vertices[ring[k] as usize];
        let b = &vertices[ring[(k + 1) % ring.len()] as usize];
        normal.x += (a.y - b.y) * (a.z + b.z);
        normal.y += (a.z - b.z) * (a.x + b.x);
        normal.z += (a.x - b.x) * (a.y + b.y);
    }
    let axis = normal.iamax();
    let (u, v) = match axis {
        0 => (1, 2),
        1 => (2, 0),
        _ => (0, 1),
    };
    let flat: Vec<f64> = ring
        .iter()
        .flat_map(|&i| {
            let p = &vertices[i as usize];
            [p[u], p[v]]
        })
        .collect();
    let indices = earcutr::earcut(&flat, &[], 2).map_err(|e| GeometryError::Triangulation {
        reason: format!("{e:?}"),
    })?;
    let mut tris: Vec<[u32; 3]> = indices
        .chunks_exact(3)
        .map(|t| [ring[t[0]], ring[t[1]], ring[t[2]]])
        .collect();
    // earcut emits a fixed orientation in the projected plane; restore ours.
    let projected_sign = normal[axis].signum();
    let sample = tris.first().map(|t| {
        let (a, b, c) = (&vertices[t[0] as usize], &vertices[t[1] as usize], &vertices[t[2] as usize]);
        (b[u] - a[u]) * (c[v] - a[v]) - (c[u] - a[u]) * (b[v] - a[v])
    });
    if sample.is_some_and(|s| s.signum() != projected_sign) {
        for t in &mut tris {
            t.swap(1, 2);
        }
    }
    if tris.is_empty() {
        return Err(GeometryError::Triangulation {
            reason: format!("earcut produced no triangles for a {}-vertex loop", ring.len()),
        });
    }
    Ok(tris)
}

/// Drop faces whose height above their longest edge is within `eps`.
///
/// Such slivers only add extra uses to the edges they lie along; removing
/// them turns those edges into T-junctions that [`split_t_junctions`]
/// closes.
pub fn remove_slivers(mesh: &Mesh, eps: f64) -> (Mesh, usize) {
    let mut out = Mesh {
        vertices: mesh.vertices.clone(),
        faces: Vec::with_capacity(mesh.faces.len()),
    };
    let mut dropped = 0;
    for (fi, face) in mesh.faces.iter().enumerate() {
        let longest = face_edges(face)
            .map(|(a, b)| (mesh.vertices[a as usize] - mesh.vertices[b as usize]).norm())
            .fold(0.0, f64::max);
        // |area normal| is twice the area, so this is the face height.
        let height = mesh.face_area_normal(fi).norm() / longest.max(f64::MIN_POSITIVE);
        if height <= eps {
            dropped += 1;
        } else {
            out.faces.push(face.clone());
        }
    }
    (out, dropped)
}

/// Remove repeated faces. Two copies with the same winding collapse to
/// one; a face and its reverse cancel out.
pub fn remove_duplicate_faces(mesh: &Mesh) -> (Mesh, usize) {
    // Rotate each loop to start at its smallest index.
    let canonical = |f: &[u32]| -> Vec<u32> {
        let k = f
            .iter()
            .enumerate()
            .min_by_key(|&(_, i)| *i)
            .map_or(0, |(k, _)| k);
        f[k..].iter().chain(&f[..k]).copied().collect()
    };
    let reversed = |f: &[u32]| -> Vec<u32> {
        let mut r = f.to_vec();
        r.reverse();
        canonical(&r)
    };
    let mut seen: HashMap<Vec<u32>, usize> = HashMap::new();
    let mut keep = vec![true; mesh.faces.len()];
    for (fi, face) in mesh.faces.iter().enumerate() {
        let key = canonical(face);
        if seen.contains_key(&key) {
            keep[fi] = false;
            continue;
        }
        if let Some(&twin) = seen.get(&reversed(face)) {
            if keep[twin] {
                keep[twin] = false;
                keep[fi] = false;
                continue;
            }
        }
        seen.insert(key, fi);
    }
    let removed = keep.iter().filter(|k| !**k).count();
    let faces = mesh
        .faces
        .iter()
        .zip(&keep)
        .filter(|(_, k)| **k)
        .map(|(f, _)| f.clone())
        .collect();
    (
        Mesh {
            vertices: mesh.vertices.clone(),
            faces,
        },
        removed,
    )
}

/// Insert vertices lying inside boundary edges into those edges.
///
/// A face whose edge runs past a neighbour's corner leaves that edge and
/// the neighbour's two shorter edges each used once. Threading the corner
/// into the long edge makes all three shared. Faces that gain vertices are
/// fanned about their centroid so every output face is a proper triangle or
/// an untouched input face. Returns the mesh and the vertices inserted.
#[instrument(skip(mesh), fields(faces = mesh.face_count()))]
pub fn split_t_junctions(mesh: &Mesh, eps: f64) -> (Mesh, usize) {
    let mut counts: HashMap<(u32, u32), u32> = HashMap::new();
    for face in &mesh.faces {
        for (a, b) in face_edges(face) {
            *counts.entry(edge_key(a, b)).or_default() += 1;
        }
    }
    let boundary: Vec<(usize, usize, u32, u32)> = mesh
        .faces
        .iter()
        .enumerate()
        .flat_map(|(fi, face)| face_edges(face).enumerate().map(move |(k, (a, b))| (fi, k, a, b)))
        .filter(|&(_, _, a, b)| counts.get(&edge_key(a, b)) == Some(&1))
        .collect();
    if boundary.is_empty() {
        return (mesh.clone(), 0);
    }

    let v = &mesh.vertices;
    let mut candidates: Vec<u32> = boundary.iter().flat_map(|&(_, _, a, b)| [a, b]).collect();
    candidates.sort_unstable_by(|&i, &j| v[i as usize].x.total_cmp(&v[j as usize].x).then(i.cmp(&j)));
    candidates.dedup();
    let xs: Vec<f64> = candidates.iter().map(|&i| v[i as usize].x).collect();

    let mut inserts: HashMap<(usize, usize), Vec<u32>> = HashMap::new();
    for &(fi, k, a, b) in &boundary {
        let (pa, pb) = (v[a as usize], v[b as usize]);
        let d = pb - pa;
        let len = d.norm();
        if len <= 2.0 * eps {
            continue;
        }
        let lo = pa.x.min(pb.x) - eps;
        let hi = pa.x.max(pb.x) + eps;
        let mut on: Vec<(f64, u32)> = Vec::new();
        for idx in xs.partition_point(|&x| x < lo)..candidates.len() {
            if xs[idx] > hi {
                break;
            }
            let c = candidates[idx];
            if c == a || c == b {
                continue;
            }
            let p = v[c as usize];
            let t = (p - pa).dot(&d) / (len * len);
            let along = t * len;
            if along <= eps || along >= len - eps {
                continue;
            }
            if (p - (pa + d * t)).norm() <= eps {
                on.push((t, c));
            }
        }
        if !on.is_empty() {
            on.sort_by(|x, y| x.0.total_cmp(&y.0));
            on.dedup_by_key(|x| x.1);
            inserts.insert((fi, k), on.into_iter().map(|(_, c)| c).collect());
        }
    }
    if inserts.is_empty() {
        return (mesh.clone(), 0);
    }

    let mut out = Mesh {
        vertices: mesh.vertices.clone(),
        faces: Vec::with_capacity(mesh.faces.len() + inserts.len() * 2),
    };
    let mut inserted = 0;
    for (fi, face) in mesh.faces.iter().enumerate() {
        let mut ring = Vec::with_capacity(face.len());
        for (k, &i) in face.iter().enumerate() {
            ring.push(i);
            if let Some(extra) = inserts.get(&(fi, k)) {
                ring.extend_from_slice(extra);
                inserted += extra.len();
            }
        }
        if ring.len() == face.len() {
            out.faces.push(ring);
            continue;
        }
        let c = out.push_vertex(mesh.face_centroid(fi));
        for k in 0..ring.len() {
            out.faces.push(vec![c, ring[k], ring[(k + 1) % ring.len()]]);
        }
    }
    debug!(inserted, edges = inserts.len(), "t-junctions split");
    (out, inserted)
}

/// What [`close_seams`] and [`repair_solid`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub vertices_merged: usize,
    pub slivers_removed: usize,
    pub duplicates_removed: usize,
    pub junctions_split: usize,
    pub holes_filled: usize,
    /// Boundary loops that could not be triangulated.
    pub holes_left: usize,
    /// Edge audit of the returned mesh.
    pub audit: EdgeAudit,
}

impl RepairReport {
    fn absorb(&mut self, other: &RepairReport) {
        self.vertices_merged += other.vertices_merged;
        self.slivers_removed += other.slivers_removed;
        self.duplicates_removed += other.duplicates_removed;
        self.junctions_split += other.junctions_split;
    }
}

const SEAM_PASSES: usize = 4;

/// Weld a polygon soup and close the seams between its pieces: merge
/// coincident corners, drop slivers and duplicate faces, then split
/// T-junctions until no more are found.
pub fn close_seams(mesh: &Mesh, eps: f64) -> (Mesh, RepairReport) {
    let mut report = RepairReport::default();
    let mut current = mesh.clone();
    for _ in 0..SEAM_PASSES {
        let mut pass = RepairReport::default();
        let before = current.vertex_count();
        let welded = weld(&current, eps);
        pass.vertices_merged = before.saturating_sub(welded.vertex_count());
        let (thin, slivers) = remove_slivers(&welded, eps);
        pass.slivers_removed = slivers;
        let (unique, duplicates) = remove_duplicate_faces(&thin);
        pass.duplicates_removed = duplicates;
        let (split, junctions) = split_t_junctions(&remove_loose(&unique), eps);
        pass.junctions_split = junctions;
        report.absorb(&pass);
        current = split;
        if junctions == 0 && slivers == 0 && duplicates == 0 {
            break;
        }
    }
    report.audit = audit_edges(&current);
    (current, report)
}

/// Make a finished solid watertight for export.
///
/// Runs [`close_seams`], then caps every boundary loop that is left.
/// Loops that cannot be triangulated are counted in `holes_left` rather
/// than failing the repair.
#[instrument(skip_all, fields(faces = mesh.face_count()))]
pub fn repair_solid(mesh: &Mesh, eps: f64) -> (Mesh, RepairReport) {
    let (mut out, mut report) = close_seams(mesh, eps);
    if report.audit.boundary_edges > 0 {
        for ring in boundary_loops(&out) {
            let cap: Vec<u32> = ring.iter().rev().copied().collect();
            match triangulate_loop(&out.vertices, &cap) {
                Ok(tris) => {
                    out.faces.extend(tris.iter().map(|t| t.to_vec()));
                    report.holes_filled += 1;
                }
                Err(e) => {
                    debug!(len = ring.len(), error = %e, "hole left open");
                    report.holes_left += 1;
                }
            }
        }
        report.audit = audit_edges(&out);
    }
    if !report.audit.is_closed() {
        warn!(
            boundary = report.audit.boundary_edges,
            non_manifold = report.audit.non_manifold_edges,
            "solid is still open after repair"
        );
    }
    debug!(?report, "repair complete");
    (out, report)
}
