//! Plain-text tile reports for test diagnostics.

use std::fmt;

use relief_pipeline::{CategoryCounts, TileOutput};
use relief_ops::CutTally;

use crate::oracle::{check_output, OracleVerdict};

/// Summary of one solid.
pub struct SolidSummary {
    pub category: &'static str,
    pub triangles: usize,
    pub vertices: usize,
    pub bounds: Option<([f64; 3], [f64; 3])>,
}

/// A complete tile report.
pub struct TileReport {
    pub name: String,
    pub solids: Vec<SolidSummary>,
    pub counts: Vec<(&'static str, CategoryCounts)>,
    pub cuts: Vec<(&'static str, CutTally)>,
    pub warnings: Vec<String>,
    pub oracle_results: Vec<OracleVerdict>,
}

impl TileReport {
    pub fn new(output: &TileOutput) -> Self {
        let s = &output.summary;
        Self {
            name: output.name.clone(),
            solids: output
                .solids()
                .into_iter()
                .map(|(category, mesh)| SolidSummary {
                    category,
                    triangles: mesh.triangle_count(),
                    vertices: mesh.vertex_count(),
                    bounds: mesh
                        .bounds()
                        .map(|b| ([b.min.x, b.min.y, b.min.z], [b.max.x, b.max.y, b.max.z])),
                })
                .collect(),
            counts: vec![
                ("buildings", s.buildings),
                ("roads", s.roads),
                ("trails", s.trails),
                ("labels", s.labels),
            ],
            cuts: vec![
                ("flat_bottom", s.cuts.flat_bottom),
                ("deboss", s.cuts.deboss),
                ("notches", s.cuts.notches),
                ("mounting_holes", s.cuts.mounting_holes),
            ],
            warnings: s.warnings.clone(),
            oracle_results: check_output(output),
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = format!("=== Tile Report: {} ===\n\n", self.name);

        out.push_str(&format!("Solids ({}):\n", self.solids.len()));
        for solid in &self.solids {
            out.push_str(&format!(
                "  {}: {} triangles, {} vertices\n",
                solid.category, solid.triangles, solid.vertices
            ));
            if let Some((min, max)) = solid.bounds {
                out.push_str(&format!(
                    "      ({:.1}, {:.1}, {:.1}) -> ({:.1}, {:.1}, {:.1})\n",
                    min[0], min[1], min[2], max[0], max[1], max[2],
                ));
            }
        }

        out.push_str("\nFeatures:\n");
        for (name, c) in &self.counts {
            if c.attempted > 0 {
                out.push_str(&format!(
                    "  {name}: {} attempted, {} produced, {} dropped\n",
                    c.attempted, c.produced, c.dropped
                ));
            }
        }

        out.push_str("\nCuts:\n");
        for (name, t) in &self.cuts {
            if t.attempts > 0 {
                out.push_str(&format!(
                    "  {name}: {} attempts, {} exact, {} fallback, {} failed, {} disjoint\n",
                    t.attempts, t.exact, t.fallback, t.failures, t.disjoint
                ));
            }
        }

        if !self.oracle_results.is_empty() {
            out.push_str(&format!("\nOracle Results ({} checks):\n", self.oracle_results.len()));
            for v in &self.oracle_results {
                let status = if v.passed { "PASS" } else { "FAIL" };
                out.push_str(&format!("  [{status}] {}: {}\n", v.oracle_name, v.detail));
            }
        }

        if self.warnings.is_empty() {
            out.push_str("\nWarnings: none\n");
        } else {
            out.push_str(&format!("\nWarnings ({}):\n", self.warnings.len()));
            for w in &self.warnings {
                out.push_str(&format!("  {w}\n"));
            }
        }
        out
    }
}

impl fmt::Display for TileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}
