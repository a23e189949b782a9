//! Verification oracles: pure functions returning pass/fail verdicts.
//!
//! Each oracle returns an `OracleVerdict` with diagnostic detail, not panics,
//! so a scenario can collect every failure in one pass.

use relief_kernel::topology::audit_edges;
use relief_pipeline::TileOutput;
use relief_types::{Mesh, TileRect};

/// The result of a single oracle check.
#[derive(Debug, Clone)]
pub struct OracleVerdict {
    pub oracle_name: String,
    pub passed: bool,
    pub detail: String,
    pub value: Option<f64>,
}

impl OracleVerdict {
    fn pass(name: &str, detail: String) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: true,
            detail,
            value: None,
        }
    }

    fn fail(name: &str, detail: String) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: false,
            detail,
            value: None,
        }
    }

    fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }
}

// ── Mesh Oracles ────────────────────────────────────────────────────────────

/// Every edge shared by exactly two faces with opposite directions.
pub fn check_closed(mesh: &Mesh) -> OracleVerdict {
    let audit = audit_edges(mesh);
    if audit.is_closed() && audit.is_consistent() {
        OracleVerdict::pass("closed", format!("{} edges, all manifold", audit.edges))
    } else {
        OracleVerdict::fail(
            "closed",
            format!(
                "boundary={} non_manifold={} inconsistent={}",
                audit.boundary_edges, audit.non_manifold_edges, audit.inconsistent_edges
            ),
        )
    }
}

/// Outward winding: signed volume strictly positive.
pub fn check_positive_volume(mesh: &Mesh) -> OracleVerdict {
    let v = mesh.signed_volume();
    if v > 0.0 {
        OracleVerdict::pass("positive_volume", format!("volume {v:.3}")).with_value(v)
    } else {
        OracleVerdict::fail("positive_volume", format!("volume {v:.3}")).with_value(v)
    }
}

/// All vertices inside `rect` (with `tol` slack) in plan.
pub fn check_within(mesh: &Mesh, rect: &TileRect, tol: f64) -> OracleVerdict {
    let outside = mesh
        .vertices
        .iter()
        .filter(|v| {
            v.x < rect.min_x - tol || v.x > rect.max_x + tol || v.y < rect.min_y - tol || v.y > rect.max_y + tol
        })
        .count();
    if outside == 0 {
        OracleVerdict::pass("within_tile", format!("{} vertices inside", mesh.vertex_count()))
    } else {
        OracleVerdict::fail("within_tile", format!("{outside} vertices outside")).with_value(outside as f64)
    }
}

/// Z values inside `[lo, hi]`.
pub fn check_z_range(mesh: &Mesh, lo: f64, hi: f64, tol: f64) -> OracleVerdict {
    match mesh.bounds() {
        None => OracleVerdict::fail("z_range", "empty mesh".into()),
        Some(bb) if bb.min.z >= lo - tol && bb.max.z <= hi + tol => {
            OracleVerdict::pass("z_range", format!("[{:.3}, {:.3}]", bb.min.z, bb.max.z))
        }
        Some(bb) => OracleVerdict::fail(
            "z_range",
            format!("[{:.3}, {:.3}] outside [{lo:.3}, {hi:.3}]", bb.min.z, bb.max.z),
        ),
    }
}

// ── Output Oracles ──────────────────────────────────────────────────────────

/// Every solid of a tile lies inside the terrain's plan footprint.
pub fn check_registered(output: &TileOutput, tol: f64) -> Vec<OracleVerdict> {
    let Some(bb) = output.terrain.bounds() else {
        return vec![OracleVerdict::fail("registered", "terrain is empty".into())];
    };
    let rect = bb.tile();
    output
        .solids()
        .into_iter()
        .map(|(category, mesh)| {
            let mut verdict = check_within(mesh, &rect, tol);
            verdict.oracle_name = format!("registered:{category}");
            verdict
        })
        .collect()
}

/// Every cutter group that made an attempt was served by the exact solver.
pub fn check_exact_tier(output: &TileOutput) -> Vec<OracleVerdict> {
    let cuts = &output.summary.cuts;
    [
        ("flat_bottom", &cuts.flat_bottom),
        ("deboss", &cuts.deboss),
        ("notches", &cuts.notches),
        ("mounting_holes", &cuts.mounting_holes),
    ]
    .into_iter()
    .filter(|(_, tally)| tally.attempts > 0)
    .map(|(group, tally)| {
        let name = format!("exact:{group}");
        let served = tally.attempts - tally.disjoint;
        let detail = format!(
            "{} of {served} exact, {} fallback, {} failed",
            tally.exact, tally.fallback, tally.failures
        );
        let verdict = if tally.exact == served {
            OracleVerdict::pass(&name, detail)
        } else {
            OracleVerdict::fail(&name, detail)
        };
        verdict.with_value(tally.exact as f64)
    })
    .collect()
}

/// Standard checks for a finished tile: every solid closed, terrain with
/// positive volume, every solid registered to the terrain.
pub fn check_output(output: &TileOutput) -> Vec<OracleVerdict> {
    let mut verdicts = vec![check_positive_volume(&output.terrain)];
    for (category, mesh) in output.solids() {
        let mut verdict = check_closed(mesh);
        verdict.oracle_name = format!("closed:{category}");
        verdicts.push(verdict);
    }
    verdicts.extend(check_registered(output, 1e-6));
    verdicts
}
