//! CSGEngine: one-cutter-at-a-time subtraction with solver fallback.
//!
//! Every subtraction tries the primary (exact) solver first and retries
//! once with the fallback solver. When both fail the target is returned
//! untouched and the failure is counted; it never aborts the run.

use relief_kernel::{BooleanFailure, BooleanSolver, ExactSolver, FastSolver};
use relief_types::Mesh;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// What happened to one cutter.
#[derive(Debug, Clone, PartialEq)]
pub enum SubtractOutcome {
    /// Bounding boxes do not overlap; no solver was called.
    Disjoint,
    Exact(Mesh),
    Fallback { mesh: Mesh, primary: BooleanFailure },
    Failed {
        primary: BooleanFailure,
        fallback: BooleanFailure,
    },
}

impl SubtractOutcome {
    /// The new target, or `target` itself when nothing was cut.
    pub fn into_mesh(self, target: Mesh) -> Mesh {
        match self {
            SubtractOutcome::Exact(mesh) | SubtractOutcome::Fallback { mesh, .. } => mesh,
            SubtractOutcome::Disjoint | SubtractOutcome::Failed { .. } => target,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SubtractOutcome::Failed { .. })
    }
}

/// Per-group subtraction counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutTally {
    pub attempts: usize,
    pub exact: usize,
    pub fallback: usize,
    pub failures: usize,
    pub disjoint: usize,
}

impl CutTally {
    pub fn record(&mut self, outcome: &SubtractOutcome) {
        self.attempts += 1;
        match outcome {
            SubtractOutcome::Disjoint => self.disjoint += 1,
            SubtractOutcome::Exact(_) => self.exact += 1,
            SubtractOutcome::Fallback { .. } => self.fallback += 1,
            SubtractOutcome::Failed { .. } => self.failures += 1,
        }
    }

    pub fn merge(&mut self, other: &CutTally) {
        self.attempts += other.attempts;
        self.exact += other.exact;
        self.fallback += other.fallback;
        self.failures += other.failures;
        self.disjoint += other.disjoint;
    }

    pub fn succeeded(&self) -> usize {
        self.exact + self.fallback
    }
}

pub struct CsgEngine {
    primary: Box<dyn BooleanSolver>,
    fallback: Box<dyn BooleanSolver>,
}

impl Default for CsgEngine {
    fn default() -> Self {
        Self::new(Box::new(ExactSolver::default()), Box::new(FastSolver::default()))
    }
}

impl std::fmt::Debug for CsgEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsgEngine")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.name())
            .finish()
    }
}

impl CsgEngine {
    pub fn new(primary: Box<dyn BooleanSolver>, fallback: Box<dyn BooleanSolver>) -> Self {
        Self { primary, fallback }
    }

    /// Subtract one cutter. The target is never modified in place.
    pub fn subtract(&self, target: &Mesh, cutter: &Mesh) -> SubtractOutcome {
        if let (Some(tb), Some(cb)) = (target.bounds(), cutter.bounds()) {
            if !tb.intersects(&cb) {
                debug!("cutter misses target bounds");
                return SubtractOutcome::Disjoint;
            }
        }
        let primary = match self.primary.subtract(target, cutter) {
            Ok(mesh) => return SubtractOutcome::Exact(mesh),
            Err(e) => e,
        };
        warn!(solver = self.primary.name(), error = %primary, "primary solver failed, retrying with fallback");
        match self.fallback.subtract(target, cutter) {
            Ok(mesh) => SubtractOutcome::Fallback { mesh, primary },
            Err(fallback) => {
                warn!(solver = self.fallback.name(), error = %fallback, "fallback solver failed, cutter skipped");
                SubtractOutcome::Failed { primary, fallback }
            }
        }
    }

    /// Subtract each cutter in turn. Cutters are pulled from the iterator
    /// only after the previous subtraction has finished, so a lazily built
    /// sequence never has two cutters alive at once.
    #[instrument(skip_all, fields(group = group))]
    pub fn apply_cutters<I>(&self, target: Mesh, cutters: I, group: &str) -> (Mesh, CutTally)
    where
        I: IntoIterator<Item = Mesh>,
    {
        let mut tally = CutTally::default();
        let mut current = target;
        for cutter in cutters {
            let outcome = self.subtract(&current, &cutter);
            tally.record(&outcome);
            current = outcome.into_mesh(current);
        }
        debug!(
            attempts = tally.attempts,
            failures = tally.failures,
            "cutter group done"
        );
        (current, tally)
    }

    /// Union with the same exact-then-fallback policy.
    pub fn union(&self, a: &Mesh, b: &Mesh) -> Result<Mesh, BooleanFailure> {
        match self.primary.union(a, b) {
            Ok(mesh) => Ok(mesh),
            Err(e) => {
                debug!(error = %e, "primary union failed, retrying with fallback");
                self.fallback.union(a, b)
            }
        }
    }

    /// Fold several solids into one. Fails if any pairwise union fails.
    pub fn union_all(&self, parts: &[Mesh]) -> Result<Mesh, BooleanFailure> {
        let mut iter = parts.iter();
        let mut acc = iter.next().cloned().ok_or(BooleanFailure::EmptyOperand)?;
        for part in iter {
            acc = self.union(&acc, part)?;
        }
        Ok(acc)
    }
}
