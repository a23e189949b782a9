//! ScriptedSolver: deterministic boolean test double.
//!
//! Pops one scripted outcome per call and records every call in a shared
//! journal, so callers can assert on operation order without real geometry.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use relief_types::{Aabb, Mesh};

use super::{BooleanFailure, BooleanSolver};

/// What a scripted call does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    /// Return the target unchanged.
    Pass,
    /// Return the target with the cutter's vertices dropped in as a marker face.
    Mark,
    /// Fail with `BooleanFailure::Scripted`.
    Fail,
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverCall {
    pub solver: String,
    pub op: &'static str,
    pub cutter_bounds: Option<Aabb>,
}

pub type Journal = Rc<RefCell<Vec<SolverCall>>>;

#[derive(Debug)]
pub struct ScriptedSolver {
    name: String,
    script: RefCell<VecDeque<Scripted>>,
    fallback: Scripted,
    journal: Journal,
}

impl ScriptedSolver {
    /// A solver that answers `default` once the script runs out.
    pub fn new(name: impl Into<String>, default: Scripted) -> Self {
        Self {
            name: name.into(),
            script: RefCell::new(VecDeque::new()),
            fallback: default,
            journal: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn with_script(self, steps: impl IntoIterator<Item = Scripted>) -> Self {
        self.script.borrow_mut().extend(steps);
        self
    }

    /// Share one journal between several solvers.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn journal(&self) -> Journal {
        Rc::clone(&self.journal)
    }

    pub fn calls(&self) -> usize {
        self.journal
            .borrow()
            .iter()
            .filter(|c| c.solver == self.name)
            .count()
    }

    fn run(&self, op: &'static str, target: &Mesh, cutter: &Mesh) -> Result<Mesh, BooleanFailure> {
        self.journal.borrow_mut().push(SolverCall {
            solver: self.name.clone(),
            op,
            cutter_bounds: cutter.bounds(),
        });
        let step = self.script.borrow_mut().pop_front().unwrap_or(self.fallback);
        match step {
            Scripted::Pass => Ok(target.clone()),
            Scripted::Mark => {
                let mut out = target.clone();
                if cutter.vertex_count() >= 3 {
                    let base = out.vertex_count() as u32;
                    out.vertices.extend_from_slice(&cutter.vertices[..3]);
                    out.faces.push(vec![base, base + 1, base + 2]);
                }
                Ok(out)
            }
            Scripted::Fail => Err(BooleanFailure::Scripted {
                solver: self.name.clone(),
            }),
        }
    }
}

impl BooleanSolver for ScriptedSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn subtract(&self, target: &Mesh, cutter: &Mesh) -> Result<Mesh, BooleanFailure> {
        self.run("subtract", target, cutter)
    }

    fn union(&self, a: &Mesh, b: &Mesh) -> Result<Mesh, BooleanFailure> {
        self.run("union", a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::make_box;
    use nalgebra::Point3;

    #[test]
    fn script_then_default() {
        let s = ScriptedSolver::new("mock", Scripted::Pass).with_script([Scripted::Fail]);
        let m = make_box(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        assert!(s.subtract(&m, &m).is_err());
        assert_eq!(s.subtract(&m, &m).unwrap(), m);
        assert_eq!(s.calls(), 2);
    }

    #[test]
    fn shared_journal_orders_calls() {
        let a = ScriptedSolver::new("a", Scripted::Fail);
        let b = ScriptedSolver::new("b", Scripted::Pass).with_journal(a.journal());
        let m = make_box(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let _ = a.subtract(&m, &m);
        let _ = b.subtract(&m, &m);
        let names: Vec<_> = a.journal().borrow().iter().map(|c| c.solver.clone()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn mark_appends_a_face() {
        let s = ScriptedSolver::new("mock", Scripted::Mark);
        let m = make_box(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(s.subtract(&m, &m).unwrap().face_count(), 7);
    }
}
