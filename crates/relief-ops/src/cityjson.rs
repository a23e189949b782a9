//! CityJSON building import and vertical alignment to the terrain.
//!
//! Decoding keeps only `Building*` city objects at one level of detail and
//! turns the exterior ring of every surface into a face. Alignment then
//! shifts the whole dataset by the median terrain-minus-building difference
//! sampled under its lowest vertices.

use std::collections::{HashMap, HashSet};

use nalgebra::{Point2, Point3, Vector3};
use relief_kernel::topology::{orient_consistently, weld};
use relief_kernel::HeightSurface;
use relief_types::{CoordinateOffset, CoordinateTransform, Mesh, TileRect};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::clip::BoundaryClipper;
use crate::types::{Diagnostics, OpError};

/// Weld distance for decoded building vertices, in dataset units.
const WELD_EPS: f64 = 0.01;
/// Vertices tested per building when deciding whether it touches the tile.
const TILE_PROBE: usize = 10;

/// Which geometry of each city object to import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LodChoice {
    #[default]
    Highest,
    /// A lod equal to or starting with this string, else the first geometry.
    Exact(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    pub id: String,
    /// Exterior rings as indices into the document vertices.
    pub faces: Vec<Vec<u32>>,
}

/// Decoded buildings sharing one vertex list.
#[derive(Debug, Clone, PartialEq)]
pub struct CityJsonDocument {
    pub transform: CoordinateTransform,
    pub vertices: Vec<Point3<f64>>,
    pub buildings: Vec<Building>,
}

impl CityJsonDocument {
    pub fn from_json(text: &str, lod: &LodChoice) -> Result<Self, OpError> {
        let value: Value = serde_json::from_str(text).map_err(|e| OpError::CityJson {
            reason: e.to_string(),
        })?;
        Self::from_value(&value, lod)
    }

    pub fn from_value(value: &Value, lod: &LodChoice) -> Result<Self, OpError> {
        let transform = match value.get("transform") {
            Some(t) => CoordinateTransform {
                scale: triple(t.get("scale")).unwrap_or([1.0; 3]),
                translate: triple(t.get("translate")).unwrap_or([0.0; 3]),
            },
            None => CoordinateTransform::default(),
        };
        let raw = value
            .get("vertices")
            .and_then(Value::as_array)
            .ok_or_else(|| OpError::CityJson {
                reason: "missing vertices array".into(),
            })?;
        let vertices = raw
            .iter()
            .enumerate()
            .map(|(i, v)| {
                triple(Some(v))
                    .map(|r| transform.apply(r))
                    .ok_or_else(|| OpError::CityJson {
                        reason: format!("vertex {i} is not three numbers"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let objects = value
            .get("CityObjects")
            .and_then(Value::as_object)
            .ok_or_else(|| OpError::CityJson {
                reason: "missing CityObjects".into(),
            })?;

        let mut buildings = Vec::new();
        for (id, object) in objects {
            let is_building = object
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.starts_with("Building"));
            if !is_building {
                continue;
            }
            let Some(geometries) = object.get("geometry").and_then(Value::as_array) else {
                continue;
            };
            let Some(geometry) = pick_lod(geometries, lod) else {
                continue;
            };
            let mut faces = Vec::new();
            geometry_faces(geometry, &mut faces);
            faces.retain(|f| f.iter().all(|&i| (i as usize) < vertices.len()));
            if !faces.is_empty() {
                buildings.push(Building { id: id.clone(), faces });
            }
        }
        debug!(
            buildings = buildings.len(),
            vertices = vertices.len(),
            "CityJSON decoded"
        );
        Ok(Self {
            transform,
            vertices,
            buildings,
        })
    }

    fn placed_vertices(&self, offset: &CoordinateOffset) -> Vec<Point3<f64>> {
        self.vertices
            .iter()
            .map(|v| {
                let p = offset.to_placed(&Point2::new(v.x, v.y));
                Point3::new(p.x, p.y, v.z)
            })
            .collect()
    }

    /// Buildings with at least one of their first vertices inside `tile`.
    pub fn select(&self, offset: &CoordinateOffset, tile: &TileRect) -> Vec<&Building> {
        let placed = self.placed_vertices(offset);
        self.buildings
            .iter()
            .filter(|b| touches_tile(b, &placed, tile))
            .collect()
    }

    /// Buildings touching `tile` as one welded mesh in the placed frame.
    pub fn building_mesh(&self, offset: &CoordinateOffset, tile: &TileRect) -> Mesh {
        let placed = self.placed_vertices(offset);
        let selected = self.select(offset, tile);
        let mut mesh = Mesh::new();
        for building in &selected {
            let mut local: HashMap<u32, u32> = HashMap::new();
            for face in &building.faces {
                let mapped = face
                    .iter()
                    .map(|&i| {
                        *local.entry(i).or_insert_with(|| mesh.push_vertex(placed[i as usize]))
                    })
                    .collect();
                mesh.faces.push(mapped);
            }
        }
        info!(
            kept = selected.len(),
            total = self.buildings.len(),
            "buildings selected for tile"
        );
        if mesh.is_empty() {
            return mesh;
        }
        orient_consistently(&weld(&mesh, WELD_EPS))
    }
}

fn triple(value: Option<&Value>) -> Option<[f64; 3]> {
    let a = value?.as_array()?;
    if a.len() < 3 {
        return None;
    }
    Some([a[0].as_f64()?, a[1].as_f64()?, a[2].as_f64()?])
}

fn lod_string(geometry: &Value) -> Option<String> {
    match geometry.get("lod")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn pick_lod<'v>(geometries: &'v [Value], lod: &LodChoice) -> Option<&'v Value> {
    match lod {
        LodChoice::Highest => {
            let mut best: Option<(&Value, f64)> = None;
            for g in geometries {
                let level = lod_string(g).and_then(|s| s.parse::<f64>().ok()).unwrap_or(0.0);
                if best.map_or(true, |(_, b)| level > b) {
                    best = Some((g, level));
                }
            }
            best.map(|(g, _)| g)
        }
        LodChoice::Exact(want) => geometries
            .iter()
            .find(|g| lod_string(g).is_some_and(|s| s == *want || s.starts_with(want.as_str())))
            .or_else(|| geometries.first()),
    }
}

fn as_ring(value: &Value) -> Option<Vec<u32>> {
    let items = value.as_array()?;
    items
        .iter()
        .map(|v| v.as_u64().and_then(|i| u32::try_from(i).ok()))
        .collect()
}

fn push_ring(ring: Vec<u32>, faces: &mut Vec<Vec<u32>>) {
    let mut ring = ring;
    ring.dedup();
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() >= 3 {
        faces.push(ring);
    }
}

/// Exterior ring of each surface in a list of surfaces.
fn surface_list(surfaces: &Value, faces: &mut Vec<Vec<u32>>) {
    for surface in surfaces.as_array().into_iter().flatten() {
        if let Some(ring) = surface.get(0).and_then(as_ring) {
            push_ring(ring, faces);
        }
    }
}

fn geometry_faces(geometry: &Value, faces: &mut Vec<Vec<u32>>) {
    let Some(boundaries) = geometry.get("boundaries") else {
        return;
    };
    match geometry.get("type").and_then(Value::as_str).unwrap_or("") {
        "MultiSurface" | "CompositeSurface" => surface_list(boundaries, faces),
        "Solid" => {
            for shell in boundaries.as_array().into_iter().flatten() {
                surface_list(shell, faces);
            }
        }
        "MultiSolid" | "CompositeSolid" => {
            for solid in boundaries.as_array().into_iter().flatten() {
                for shell in solid.as_array().into_iter().flatten() {
                    surface_list(shell, faces);
                }
            }
        }
        _ => nested_faces(boundaries, faces),
    }
}

fn nested_faces(value: &Value, faces: &mut Vec<Vec<u32>>) {
    if let Some(ring) = as_ring(value) {
        push_ring(ring, faces);
        return;
    }
    let Some(items) = value.as_array() else {
        return;
    };
    if let Some(ring) = items.first().and_then(as_ring) {
        push_ring(ring, faces);
        return;
    }
    for item in items {
        nested_faces(item, faces);
    }
}

fn touches_tile(building: &Building, placed: &[Point3<f64>], tile: &TileRect) -> bool {
    let mut seen = HashSet::new();
    building
        .faces
        .iter()
        .flatten()
        .filter(|&&i| seen.insert(i))
        .take(TILE_PROBE)
        .any(|&i| {
            let v = placed[i as usize];
            tile.contains(&Point2::new(v.x, v.y))
        })
}

/// Outcome of one alignment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentReport {
    pub samples: usize,
    pub hits: usize,
    /// Median terrain-minus-building difference; `None` without hits.
    pub offset: Option<f64>,
    /// The offset exceeded the deadband and was applied.
    pub applied: bool,
    /// Building and terrain Z ranges are far apart before alignment.
    pub range_mismatch: bool,
    /// The applied offset is larger than the mismatch threshold.
    pub large_offset: bool,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CityJsonAligner {
    /// Offsets with a smaller magnitude are ignored.
    pub deadband: f64,
    pub mismatch_threshold: f64,
    /// Rays start this far above the terrain maximum.
    pub lift_margin: f64,
    /// How far ground-contact vertices are pushed into the terrain.
    pub penetration_depth: f64,
    /// Vertices at most this far above the terrain count as ground contact.
    pub contact_tolerance: f64,
}

impl Default for CityJsonAligner {
    fn default() -> Self {
        Self {
            deadband: 0.5,
            mismatch_threshold: 100.0,
            lift_margin: 1000.0,
            penetration_depth: 10.0,
            contact_tolerance: 2.0,
        }
    }
}

impl CityJsonAligner {
    fn terrain_below(&self, surface: &HeightSurface, p: &Point3<f64>) -> Option<f64> {
        let z0 = surface.bounds().max.z + self.lift_margin;
        surface.cast_down_from(p.x, p.y, z0).map(|h| h.z())
    }

    /// Sample the lowest decile of vertices and estimate the vertical offset.
    #[instrument(skip_all, fields(vertices = mesh.vertex_count()))]
    pub fn estimate(&self, mesh: &Mesh, surface: &HeightSurface) -> AlignmentReport {
        let mut report = AlignmentReport::default();
        let Some(bounds) = mesh.bounds() else {
            report.diagnostics.warn("building mesh is empty");
            return report;
        };
        let terrain = surface.bounds();
        if bounds.min.z > terrain.max.z + self.mismatch_threshold
            || bounds.max.z < terrain.min.z - self.mismatch_threshold
        {
            warn!(
                building_min = bounds.min.z,
                building_max = bounds.max.z,
                terrain_min = terrain.min.z,
                terrain_max = terrain.max.z,
                "building and terrain elevation ranges do not overlap, suspected datum mismatch"
            );
            report.range_mismatch = true;
            report.diagnostics.warn(format!(
                "building Z range [{:.2}, {:.2}] is far from terrain Z range [{:.2}, {:.2}]",
                bounds.min.z, bounds.max.z, terrain.min.z, terrain.max.z
            ));
        }

        let n = mesh.vertices.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| mesh.vertices[a].z.total_cmp(&mesh.vertices[b].z));
        report.samples = (n / 10).max(10).min(n);

        let mut deltas: Vec<f64> = order[..report.samples]
            .iter()
            .filter_map(|&i| {
                let v = &mesh.vertices[i];
                self.terrain_below(surface, v).map(|t| t - v.z)
            })
            .collect();
        report.hits = deltas.len();
        if deltas.is_empty() {
            warn!(samples = report.samples, "no terrain under building samples, alignment skipped");
            report
                .diagnostics
                .warn("alignment skipped: no ray hits under the sampled building vertices");
            return report;
        }
        let offset = median(&mut deltas);
        report.offset = Some(offset);
        report.applied = offset.abs() > self.deadband;
        report.large_offset = report.applied && offset.abs() > self.mismatch_threshold;
        if report.large_offset {
            warn!(offset, "large building alignment offset");
            report
                .diagnostics
                .warn(format!("applied a large vertical offset of {offset:.2}"));
        }
        debug!(hits = report.hits, offset, applied = report.applied, "alignment estimated");
        report
    }

    /// Shift the whole mesh by the estimated offset.
    pub fn align(&self, mesh: &Mesh, surface: &HeightSurface) -> (Mesh, AlignmentReport) {
        let report = self.estimate(mesh, surface);
        let mut out = mesh.clone();
        if let (true, Some(offset)) = (report.applied, report.offset) {
            out.translate(&Vector3::new(0.0, 0.0, offset));
            info!(offset, "buildings aligned to terrain");
        }
        (out, report)
    }

    /// Lower vertices touching the terrain so the buildings penetrate it.
    pub fn extend_down(&self, mesh: &Mesh, surface: &HeightSurface) -> Mesh {
        let mut out = mesh.clone();
        let mut lowered = 0usize;
        for v in out.vertices.iter_mut() {
            if let Some(t) = self.terrain_below(surface, v) {
                if v.z - t <= self.contact_tolerance {
                    v.z -= self.penetration_depth;
                    lowered += 1;
                }
            }
        }
        debug!(lowered, depth = self.penetration_depth, "ground contact extended");
        out
    }

    /// Align, clip to the tile and extend into the terrain.
    pub fn process(&self, mesh: &Mesh, surface: &HeightSurface, tile: &TileRect) -> (Mesh, AlignmentReport) {
        let (aligned, report) = self.align(mesh, surface);
        let clipped = BoundaryClipper::capped(*tile).clip(&aligned);
        (self.extend_down(&clipped, surface), report)
    }
}

/// Middle sample after sorting; the upper of the two for even counts, so
/// the offset is always one measured delta.
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    values[values.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use relief_kernel::primitives::make_cylinder;
    use relief_kernel::HeightGrid;
    use serde_json::json;

    fn flat(z: f64) -> HeightSurface {
        let grid = HeightGrid::from_fn(Point2::origin(), 10.0, 11, 11, |_, _| z).unwrap();
        HeightSurface::from_grid(&grid).unwrap()
    }

    #[test]
    fn constant_delta_gives_exact_offset() {
        let building = make_cylinder(Point2::new(50.0, 50.0), 5.0, 88.0, 98.0, 16);
        let (out, report) = CityJsonAligner::default().align(&building, &flat(100.0));
        assert_eq!(report.offset, Some(12.0));
        assert!(report.applied);
        for (a, b) in building.vertices.iter().zip(&out.vertices) {
            assert_eq!(b.z - a.z, 12.0);
        }
    }

    #[test]
    fn small_offsets_are_ignored() {
        let building = make_cylinder(Point2::new(50.0, 50.0), 5.0, 99.8, 110.0, 16);
        let (out, report) = CityJsonAligner::default().align(&building, &flat(100.0));
        assert!(!report.applied);
        assert_eq!(out, building);
    }

    #[test]
    fn no_hits_skips_alignment_with_a_diagnostic() {
        let building = make_cylinder(Point2::new(500.0, 500.0), 5.0, 0.0, 10.0, 16);
        let (out, report) = CityJsonAligner::default().align(&building, &flat(100.0));
        assert_eq!(report.offset, None);
        assert_eq!(report.hits, 0);
        assert!(!report.diagnostics.is_empty());
        assert_eq!(out, building);
    }

    #[test]
    fn far_ranges_are_flagged_not_corrected() {
        let building = make_cylinder(Point2::new(50.0, 50.0), 5.0, 1000.0, 1010.0, 16);
        let report = CityJsonAligner::default().estimate(&building, &flat(100.0));
        assert!(report.range_mismatch);
        assert!(report.large_offset);
        assert_relative_eq!(report.offset.unwrap(), -900.0);
    }

    #[test]
    fn median_takes_the_upper_middle_sample() {
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 3.0);
        assert_eq!(median(&mut [5.0, 1.0, 100.0]), 5.0);
    }

    #[test]
    fn extension_lowers_only_the_footing() {
        let building = make_cylinder(Point2::new(50.0, 50.0), 5.0, 100.0, 110.0, 16);
        let out = CityJsonAligner::default().extend_down(&building, &flat(100.0));
        let bb = out.bounds().unwrap();
        assert_eq!(bb.min.z, 90.0);
        assert_eq!(bb.max.z, 110.0);
    }

    fn sample_document() -> Value {
        json!({
            "type": "CityJSON",
            "transform": { "scale": [0.01, 0.01, 0.01], "translate": [1000.0, 2000.0, 0.0] },
            "vertices": [
                [0, 0, 0], [1000, 0, 0], [1000, 1000, 0], [0, 1000, 0],
                [0, 0, 1000], [1000, 0, 1000], [1000, 1000, 1000], [0, 1000, 1000],
                [90000, 90000, 0], [91000, 90000, 0], [91000, 91000, 0]
            ],
            "CityObjects": {
                "b1": {
                    "type": "Building",
                    "geometry": [
                        { "type": "MultiSurface", "lod": "1", "boundaries": [[[0, 1, 2, 3]]] },
                        {
                            "type": "Solid",
                            "lod": "2.2",
                            "boundaries": [[
                                [[0, 3, 2, 1]], [[4, 5, 6, 7]], [[0, 1, 5, 4]],
                                [[1, 2, 6, 5]], [[2, 3, 7, 6]], [[3, 0, 4, 7]]
                            ]]
                        }
                    ]
                },
                "far": {
                    "type": "BuildingPart",
                    "geometry": [{ "type": "MultiSurface", "lod": 1, "boundaries": [[[8, 9, 10]]] }]
                },
                "tree": {
                    "type": "SolitaryVegetationObject",
                    "geometry": [{ "type": "MultiSurface", "lod": 1, "boundaries": [[[0, 1, 2]]] }]
                }
            }
        })
    }

    #[test]
    fn decodes_buildings_at_the_chosen_lod() {
        let doc = CityJsonDocument::from_value(&sample_document(), &LodChoice::Highest).unwrap();
        assert_eq!(doc.buildings.len(), 2);
        let b1 = doc.buildings.iter().find(|b| b.id == "b1").unwrap();
        assert_eq!(b1.faces.len(), 6);
        assert_eq!(doc.vertices[6], Point3::new(1010.0, 2010.0, 10.0));

        let doc = CityJsonDocument::from_value(&sample_document(), &LodChoice::Exact("1".into())).unwrap();
        let b1 = doc.buildings.iter().find(|b| b.id == "b1").unwrap();
        assert_eq!(b1.faces.len(), 1);
    }

    #[test]
    fn building_mesh_keeps_only_tile_buildings() {
        let doc = CityJsonDocument::from_value(&sample_document(), &LodChoice::Highest).unwrap();
        let offset = CoordinateOffset::between(Point2::new(1000.0, 2000.0), Point2::new(0.0, 0.0));
        let mesh = doc.building_mesh(&offset, &TileRect::new(-5.0, 100.0, -5.0, 100.0));
        assert_eq!(mesh.vertex_count(), 8);
        assert_relative_eq!(mesh.signed_volume(), 1000.0, epsilon = 1e-6);
    }

    #[test]
    fn missing_vertices_is_an_error() {
        let err = CityJsonDocument::from_value(&json!({ "CityObjects": {} }), &LodChoice::Highest);
        assert!(matches!(err, Err(OpError::CityJson { .. })));
    }
}
