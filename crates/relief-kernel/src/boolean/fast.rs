//! Permissive fallback solver.
//!
//! Faces of each operand are diced only by the planes of nearby faces of the
//! other operand, then every piece is kept or dropped by testing a point just
//! off its surface against the other solid. No tree is built and neither
//! operand has to be watertight, at the price of exactness on non-convex
//! overlaps.

use relief_types::{Aabb, Mesh};
use tracing::{debug, instrument};

use super::classify::SolidClassifier;
use super::polygon::{mesh_polygons, polygons_to_mesh, Polygon, Split};
use super::{BooleanFailure, BooleanSolver};
use crate::Tolerance;

#[derive(Debug, Clone, Default)]
pub struct FastSolver {
    pub tolerance: Tolerance,
}

impl FastSolver {
    pub fn new(tolerance: Tolerance) -> Self {
        Self { tolerance }
    }
}

/// Which side of the other solid a piece must sample to survive.
#[derive(Debug, Clone, Copy)]
struct Keep {
    /// Probe just outside the piece (along its normal) must be inside.
    front_inside: Option<bool>,
    /// Probe just behind the piece must be inside.
    back_inside: Option<bool>,
    flip: bool,
}

struct Operand {
    polygons: Vec<Polygon>,
    bounds: Aabb,
    classifier: SolidClassifier,
}

impl Operand {
    fn new(mesh: &Mesh, bounds: Aabb) -> Self {
        Self {
            polygons: mesh_polygons(mesh),
            bounds,
            classifier: SolidClassifier::new(mesh),
        }
    }
}

/// Dice `subject` polygons by `other`'s nearby planes and filter the pieces.
fn select(subject: &Operand, other: &Operand, keep: Keep, eps: f64, nudge: f64) -> Vec<Polygon> {
    let reach = other.bounds.expanded(eps);
    let mut out = Vec::new();
    for poly in &subject.polygons {
        let bounds = poly.bounds();
        if !bounds.intersects(&reach) {
            // Far from the other solid: every sample point is outside it.
            if keep.front_inside != Some(true) && keep.back_inside != Some(true) {
                let mut p = poly.clone();
                if keep.flip {
                    p.flip();
                }
                out.push(p);
            }
            continue;
        }
        let mut pieces = vec![poly.clone()];
        for cutter in other.polygons.iter().filter(|c| c.bounds().intersects(&bounds.expanded(eps))) {
            let mut next = Vec::with_capacity(pieces.len() + 1);
            for piece in pieces {
                match piece.split(&cutter.plane, eps) {
                    Split::Spanning(f, b) => {
                        next.extend(f);
                        next.extend(b);
                    }
                    _ => next.push(piece),
                }
            }
            pieces = next;
        }
        for mut piece in pieces {
            let c = piece.centroid();
            let n = piece.plane.normal;
            let ok_front = keep
                .front_inside
                .map_or(true, |want| other.classifier.contains(&(c + n * nudge)) == want);
            let ok_back = keep
                .back_inside
                .map_or(true, |want| other.classifier.contains(&(c - n * nudge)) == want);
            if ok_front && ok_back {
                if keep.flip {
                    piece.flip();
                }
                out.push(piece);
            }
        }
    }
    out
}

impl BooleanSolver for FastSolver {
    fn name(&self) -> &str {
        "fast"
    }

    #[instrument(skip_all, fields(target_faces = target.face_count(), cutter_faces = cutter.face_count()))]
    fn subtract(&self, target: &Mesh, cutter: &Mesh) -> Result<Mesh, BooleanFailure> {
        super::check_operands(target, cutter)?;
        let (ta, cb) = super::operand_bounds(target, cutter)?;
        if !ta.intersects(&cb) {
            return Ok(target.clone());
        }
        let diag = ta.union(&cb).diagonal();
        let eps = self.tolerance.plane_eps(diag);
        let nudge = (1e-7 * diag).max(10.0 * eps);
        let a = Operand::new(target, ta);
        let b = Operand::new(cutter, cb);

        // Target faces survive where the material behind them is not cut.
        let mut polygons = select(
            &a,
            &b,
            Keep {
                front_inside: None,
                back_inside: Some(false),
                flip: false,
            },
            eps,
            nudge,
        );
        // Cutter faces buried in the target become walls of the cavity.
        let walls = select(
            &b,
            &a,
            Keep {
                front_inside: Some(true),
                back_inside: Some(true),
                flip: true,
            },
            eps,
            nudge,
        );
        debug!(kept = polygons.len(), walls = walls.len(), "fast subtract classified");
        polygons.extend(walls);
        Ok(polygons_to_mesh(&polygons, self.tolerance.weld_eps(diag)))
    }

    #[instrument(skip_all, fields(a_faces = a.face_count(), b_faces = b.face_count()))]
    fn union(&self, a: &Mesh, b: &Mesh) -> Result<Mesh, BooleanFailure> {
        super::check_operands(a, b)?;
        let (ba, bb) = super::operand_bounds(a, b)?;
        if !ba.intersects(&bb) {
            let mut out = a.clone();
            out.append(b);
            return Ok(out);
        }
        let diag = ba.union(&bb).diagonal();
        let eps = self.tolerance.plane_eps(diag);
        let nudge = (1e-7 * diag).max(10.0 * eps);
        let oa = Operand::new(a, ba);
        let ob = Operand::new(b, bb);
        let mut polygons = select(
            &oa,
            &ob,
            Keep {
                front_inside: Some(false),
                back_inside: None,
                flip: false,
            },
            eps,
            nudge,
        );
        polygons.extend(select(
            &ob,
            &oa,
            Keep {
                front_inside: Some(false),
                back_inside: Some(false),
                flip: false,
            },
            eps,
            nudge,
        ));
        Ok(polygons_to_mesh(&polygons, self.tolerance.weld_eps(diag)))
    }
}
