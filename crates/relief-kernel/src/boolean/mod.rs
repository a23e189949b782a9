//! Boolean solvers behind a common trait.
//!
//! `ExactSolver` builds BSP trees and validates the result; `FastSolver`
//! classifies diced faces by ray parity and accepts open operands;
//! `ScriptedSolver` is the test double.

mod bsp;
mod classify;
mod fast;
mod polygon;
mod scripted;

use relief_types::{Aabb, Mesh};
use thiserror::Error;

pub use bsp::{BspLimits, ExactSolver};
pub use fast::FastSolver;
pub use scripted::{Journal, Scripted, ScriptedSolver, SolverCall};

/// Structured failure information for boolean operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BooleanFailure {
    #[error("operand has no faces")]
    EmptyOperand,

    #[error("operand has non-finite coordinates")]
    NonFiniteInput,

    #[error("cutter is not closed ({boundary_edges} boundary, {non_manifold_edges} non-manifold edges)")]
    NonManifoldInput {
        boundary_edges: usize,
        non_manifold_edges: usize,
    },

    #[error("partition grew past {polygons} polygons")]
    SplitExplosion { polygons: usize },

    #[error("degenerate result")]
    DegenerateResult,

    #[error("result volume {after} is inconsistent with input volume {before}")]
    VolumeMismatch { before: f64, after: f64 },

    #[error("scripted failure from {solver}")]
    Scripted { solver: String },
}

/// A boolean backend. `subtract` takes exactly one cutter per call.
pub trait BooleanSolver {
    fn name(&self) -> &str;

    /// Remove `cutter`'s volume from `target`.
    fn subtract(&self, target: &Mesh, cutter: &Mesh) -> Result<Mesh, BooleanFailure>;

    /// Merge two solids.
    fn union(&self, a: &Mesh, b: &Mesh) -> Result<Mesh, BooleanFailure>;
}

impl<T: BooleanSolver + ?Sized> BooleanSolver for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn subtract(&self, target: &Mesh, cutter: &Mesh) -> Result<Mesh, BooleanFailure> {
        (**self).subtract(target, cutter)
    }

    fn union(&self, a: &Mesh, b: &Mesh) -> Result<Mesh, BooleanFailure> {
        (**self).union(a, b)
    }
}

fn check_operands(a: &Mesh, b: &Mesh) -> Result<(), BooleanFailure> {
    if a.is_empty() || b.is_empty() {
        return Err(BooleanFailure::EmptyOperand);
    }
    let finite = |m: &Mesh| {
        m.vertices
            .iter()
            .all(|v| v.x.is_finite() && v.y.is_finite() && v.z.is_finite())
    };
    if !finite(a) || !finite(b) {
        return Err(BooleanFailure::NonFiniteInput);
    }
    Ok(())
}

fn operand_bounds(a: &Mesh, b: &Mesh) -> Result<(Aabb, Aabb), BooleanFailure> {
    let ba = a.bounds().ok_or(BooleanFailure::EmptyOperand)?;
    let bb = b.bounds().ok_or(BooleanFailure::EmptyOperand)?;
    Ok((ba, bb))
}
