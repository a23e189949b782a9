//! Assertion helpers with diagnostic output.
//!
//! Failures carry the context string plus expected vs actual values.

use relief_pipeline::TileOutput;
use relief_types::Mesh;

use crate::helpers::HarnessError;
use crate::oracle::{check_exact_tier, check_output, OracleVerdict};

fn fail(ctx: &str, detail: String) -> HarnessError {
    HarnessError::AssertionFailed {
        detail: format!("[{ctx}] {detail}"),
    }
}

/// Assert the mesh bounding box matches expected corners within tolerance.
pub fn assert_bounding_box(
    mesh: &Mesh,
    expected_min: [f64; 3],
    expected_max: [f64; 3],
    tol: f64,
    ctx: &str,
) -> Result<(), HarnessError> {
    let bb = mesh.bounds().ok_or_else(|| fail(ctx, "mesh is empty".into()))?;
    let actual_min = [bb.min.x, bb.min.y, bb.min.z];
    let actual_max = [bb.max.x, bb.max.y, bb.max.z];
    for i in 0..3 {
        if (actual_min[i] - expected_min[i]).abs() > tol {
            return Err(fail(
                ctx,
                format!("bounding box min[{i}]: expected {:.3}, got {:.3} (tol={tol})", expected_min[i], actual_min[i]),
            ));
        }
        if (actual_max[i] - expected_max[i]).abs() > tol {
            return Err(fail(
                ctx,
                format!("bounding box max[{i}]: expected {:.3}, got {:.3} (tol={tol})", expected_max[i], actual_max[i]),
            ));
        }
    }
    Ok(())
}

/// Assert the Z extent only.
pub fn assert_z_extent(mesh: &Mesh, min_z: f64, max_z: f64, tol: f64, ctx: &str) -> Result<(), HarnessError> {
    let bb = mesh.bounds().ok_or_else(|| fail(ctx, "mesh is empty".into()))?;
    if (bb.min.z - min_z).abs() > tol || (bb.max.z - max_z).abs() > tol {
        return Err(fail(
            ctx,
            format!("z extent: expected [{min_z:.3}, {max_z:.3}], got [{:.3}, {:.3}]", bb.min.z, bb.max.z),
        ));
    }
    Ok(())
}

/// Assert volume within a relative tolerance.
pub fn assert_volume(mesh: &Mesh, expected: f64, rel_tol: f64, ctx: &str) -> Result<(), HarnessError> {
    let v = mesh.signed_volume();
    if (v - expected).abs() > rel_tol * expected.abs().max(1e-12) {
        return Err(fail(ctx, format!("volume: expected {expected:.3}, got {v:.3}")));
    }
    Ok(())
}

/// Assert every verdict passed; the error lists all failures.
pub fn assert_all_pass(verdicts: &[OracleVerdict], ctx: &str) -> Result<(), HarnessError> {
    let failed: Vec<String> = verdicts
        .iter()
        .filter(|v| !v.passed)
        .map(|v| format!("{}: {}", v.oracle_name, v.detail))
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::OracleFailure {
            oracle: ctx.to_string(),
            detail: failed.join("; "),
        })
    }
}

/// Run the standard output oracles and assert they pass.
pub fn assert_output_valid(output: &TileOutput) -> Result<(), HarnessError> {
    assert_all_pass(&check_output(output), &output.name)
}

/// Assert no cutter in any group failed on both solvers.
pub fn assert_no_cut_failures(output: &TileOutput) -> Result<(), HarnessError> {
    let total = output.summary.cuts.total();
    if total.failures > 0 {
        return Err(fail(
            &output.name,
            format!("{} of {} cutters failed", total.failures, total.attempts),
        ));
    }
    Ok(())
}

/// Assert every cutter group was handled by the exact solver.
pub fn assert_exact_cuts(output: &TileOutput) -> Result<(), HarnessError> {
    assert_all_pass(&check_exact_tier(output), &output.name)
}
