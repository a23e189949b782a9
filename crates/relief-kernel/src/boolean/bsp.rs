//! Exact polygon-level boolean solver on binary space partitioning trees.
//!
//! Trees live in an arena and every traversal uses an explicit stack, so
//! dense terrain never recurses deeply. Only the target polygons whose
//! bounds touch the cutter enter the tree; the rest pass through untouched.

use relief_types::{Aabb, Mesh};
use tracing::{debug, instrument, warn};

use super::classify::SolidClassifier;
use super::polygon::{mesh_polygons, polygons_to_mesh, Plane, Polygon, Split};
use super::{BooleanFailure, BooleanSolver};
use crate::topology::audit_edges;
use crate::Tolerance;

/// Size guards for a single tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BspLimits {
    pub max_depth: usize,
    /// Polygons stored in one tree may not exceed `growth * input + slack`.
    pub growth: usize,
    pub slack: usize,
}

impl Default for BspLimits {
    fn default() -> Self {
        Self {
            max_depth: 2048,
            growth: 24,
            slack: 20_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    plane: Option<Plane>,
    front: Option<usize>,
    back: Option<usize>,
    polygons: Vec<Polygon>,
}

#[derive(Debug, Clone)]
struct Bsp {
    nodes: Vec<Node>,
    eps: f64,
    stored: usize,
    budget: usize,
    max_depth: usize,
}

impl Bsp {
    fn new(polygons: Vec<Polygon>, eps: f64, limits: &BspLimits) -> Result<Self, BooleanFailure> {
        let mut tree = Bsp {
            nodes: vec![Node::default()],
            eps,
            stored: 0,
            budget: polygons.len() * limits.growth + limits.slack,
            max_depth: limits.max_depth,
        };
        tree.build(polygons)?;
        Ok(tree)
    }

    fn build(&mut self, polygons: Vec<Polygon>) -> Result<(), BooleanFailure> {
        let mut stack = vec![(0usize, polygons, 0usize)];
        while let Some((ni, polys, depth)) = stack.pop() {
            if polys.is_empty() {
                continue;
            }
            if depth > self.max_depth {
                return Err(BooleanFailure::SplitExplosion {
                    polygons: self.stored,
                });
            }
            let plane = *self.nodes[ni].plane.get_or_insert(polys[0].plane);
            let mut front = Vec::new();
            let mut back = Vec::new();
            for p in polys {
                match p.split(&plane, self.eps) {
                    Split::CoplanarFront | Split::CoplanarBack => {
                        self.nodes[ni].polygons.push(p);
                        self.stored += 1;
                    }
                    Split::Front => front.push(p),
                    Split::Back => back.push(p),
                    Split::Spanning(f, b) => {
                        front.extend(f);
                        back.extend(b);
                    }
                }
            }
            if self.stored + front.len() + back.len() > self.budget {
                return Err(BooleanFailure::SplitExplosion {
                    polygons: self.stored + front.len() + back.len(),
                });
            }
            if !front.is_empty() {
                let child = self.child(ni, true);
                stack.push((child, front, depth + 1));
            }
            if !back.is_empty() {
                let child = self.child(ni, false);
                stack.push((child, back, depth + 1));
            }
        }
        Ok(())
    }

    fn child(&mut self, ni: usize, front: bool) -> usize {
        let slot = if front {
            self.nodes[ni].front
        } else {
            self.nodes[ni].back
        };
        if let Some(c) = slot {
            return c;
        }
        self.nodes.push(Node::default());
        let c = self.nodes.len() - 1;
        if front {
            self.nodes[ni].front = Some(c);
        } else {
            self.nodes[ni].back = Some(c);
        }
        c
    }

    /// Turn solid space into empty space and vice versa.
    fn invert(&mut self) {
        for node in &mut self.nodes {
            for p in &mut node.polygons {
                p.flip();
            }
            node.plane = node.plane.map(|p| p.flipped());
            std::mem::swap(&mut node.front, &mut node.back);
        }
    }

    /// Remove the parts of `polygons` that lie inside this tree's solid.
    fn clip_polygons(&self, polygons: Vec<Polygon>) -> Vec<Polygon> {
        let mut kept = Vec::new();
        let mut stack = vec![(0usize, polygons)];
        while let Some((ni, polys)) = stack.pop() {
            let node = &self.nodes[ni];
            let Some(plane) = node.plane else {
                kept.extend(polys);
                continue;
            };
            let mut front = Vec::new();
            let mut back = Vec::new();
            for p in polys {
                match p.split(&plane, self.eps) {
                    Split::CoplanarFront | Split::Front => front.push(p),
                    Split::CoplanarBack | Split::Back => back.push(p),
                    Split::Spanning(f, b) => {
                        front.extend(f);
                        back.extend(b);
                    }
                }
            }
            match node.front {
                Some(f) => stack.push((f, front)),
                None => kept.extend(front),
            }
            if let Some(b) = node.back {
                stack.push((b, back));
            }
        }
        kept
    }

    fn clip_to(&mut self, other: &Bsp) {
        for ni in 0..self.nodes.len() {
            let polys = std::mem::take(&mut self.nodes[ni].polygons);
            self.nodes[ni].polygons = other.clip_polygons(polys);
        }
    }

    fn all_polygons(&self) -> Vec<Polygon> {
        self.nodes
            .iter()
            .flat_map(|n| n.polygons.iter().cloned())
            .collect()
    }
}

/// Robust solver: exact BSP classification with a volume sanity check.
///
/// Requires a closed cutter. Rejects results whose enclosed volume is not
/// compatible with the operands.
#[derive(Debug, Clone, Default)]
pub struct ExactSolver {
    pub tolerance: Tolerance,
    pub limits: BspLimits,
}

impl ExactSolver {
    pub fn new(tolerance: Tolerance) -> Self {
        Self {
            tolerance,
            limits: BspLimits::default(),
        }
    }

    fn prepare(&self, a: &Mesh, b: &Mesh) -> Result<(Aabb, Aabb, f64), BooleanFailure> {
        super::check_operands(a, b)?;
        let audit = audit_edges(b);
        if !audit.is_closed() {
            return Err(BooleanFailure::NonManifoldInput {
                boundary_edges: audit.boundary_edges,
                non_manifold_edges: audit.non_manifold_edges,
            });
        }
        let (ba, bb) = super::operand_bounds(a, b)?;
        Ok((ba, bb, ba.union(&bb).diagonal()))
    }

    /// Split target polygons into those near the cutter and the rest.
    fn partition(&self, target: &Mesh, near: &Aabb) -> (Vec<Polygon>, Vec<Polygon>) {
        mesh_polygons(target)
            .into_iter()
            .partition(|p| p.bounds().intersects(near))
    }
}

impl BooleanSolver for ExactSolver {
    fn name(&self) -> &str {
        "exact"
    }

    #[instrument(skip_all, fields(target_faces = target.face_count(), cutter_faces = cutter.face_count()))]
    fn subtract(&self, target: &Mesh, cutter: &Mesh) -> Result<Mesh, BooleanFailure> {
        let (ta, cb, diag) = self.prepare(target, cutter)?;
        if !ta.intersects(&cb) {
            return Ok(target.clone());
        }
        let eps = self.tolerance.plane_eps(diag);
        let (near, far) = self.partition(target, &cb.expanded(eps));
        debug!(near = near.len(), far = far.len(), "bsp subtract");
        if near.is_empty() {
            // No target face reaches the cutter, so it is wholly inside or outside.
            if !SolidClassifier::new(target).contains(&cb.center()) {
                return Ok(target.clone());
            }
            let mut out = target.clone();
            let mut void = cutter.clone();
            void.flip();
            out.append(&void);
            return Ok(out);
        }

        let mut a = Bsp::new(near, eps, &self.limits)?;
        let mut b = Bsp::new(mesh_polygons(cutter), eps, &self.limits)?;
        a.invert();
        a.clip_to(&b);
        b.clip_to(&a);
        b.invert();
        b.clip_to(&a);
        b.invert();
        a.build(b.all_polygons())?;
        a.invert();

        let mut polygons = far;
        polygons.extend(a.all_polygons());
        let result = polygons_to_mesh(&polygons, self.tolerance.weld_eps(diag));
        check_difference_volume(target, cutter, &result)?;
        Ok(result)
    }

    #[instrument(skip_all, fields(a_faces = a.face_count(), b_faces = b.face_count()))]
    fn union(&self, a: &Mesh, b: &Mesh) -> Result<Mesh, BooleanFailure> {
        let (ba, bb, diag) = self.prepare(a, b)?;
        let eps = self.tolerance.plane_eps(diag);
        if !ba.intersects(&bb) {
            let mut out = a.clone();
            out.append(b);
            return Ok(out);
        }
        let mut ta = Bsp::new(mesh_polygons(a), eps, &self.limits)?;
        let mut tb = Bsp::new(mesh_polygons(b), eps, &self.limits)?;
        ta.clip_to(&tb);
        tb.clip_to(&ta);
        tb.invert();
        tb.clip_to(&ta);
        tb.invert();
        ta.build(tb.all_polygons())?;
        let result = polygons_to_mesh(&ta.all_polygons(), self.tolerance.weld_eps(diag));
        let (va, vb, vr) = (a.signed_volume(), b.signed_volume(), result.signed_volume());
        let slack = 1e-6 * (va.abs() + vb.abs()) + 1e-12;
        if vr + slack < va.max(vb) || vr > va + vb + slack {
            warn!(va, vb, vr, "union volume out of range");
            return Err(BooleanFailure::VolumeMismatch {
                before: va + vb,
                after: vr,
            });
        }
        Ok(result)
    }
}

/// `target - cutter` can only lose material, and at most the cutter's volume.
fn check_difference_volume(target: &Mesh, cutter: &Mesh, result: &Mesh) -> Result<(), BooleanFailure> {
    let before = target.signed_volume();
    let removable = cutter.signed_volume().abs();
    let after = result.signed_volume();
    let slack = 1e-6 * (before.abs() + removable.min(before.abs())) + 1e-12;
    let lower = (before - removable).max(0.0) - slack;
    if after > before + slack || after < lower {
        warn!(before, after, removable, "difference volume out of range");
        return Err(BooleanFailure::VolumeMismatch { before, after });
    }
    Ok(())
}
