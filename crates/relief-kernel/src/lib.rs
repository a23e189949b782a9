pub mod boolean;
mod index;
pub mod primitives;
pub mod surface;
pub mod topology;

pub use boolean::{
    BooleanFailure, BooleanSolver, BspLimits, ExactSolver, FastSolver, Journal, Scripted,
    ScriptedSolver, SolverCall,
};
pub use surface::{HeightGrid, HeightSurface, SurfaceError, SurfaceHit};
pub use topology::{EdgeAudit, RepairReport};

/// Geometry construction failures outside the boolean solvers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("triangulation failed: {reason}")]
    Triangulation { reason: String },

    #[error("degenerate input: {reason}")]
    Degenerate { reason: String },
}

/// Tolerances for geometric comparisons, relative to model size.
///
/// Terrain coordinates range from metres to hundreds of kilometres, so
/// absolute epsilons are derived per operation from the bounding diagonal.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Tolerance {
    /// Plane-side classification epsilon as a fraction of the diagonal.
    pub plane: f64,
    /// Vertex weld distance as a fraction of the diagonal.
    pub weld: f64,
    /// Floor for both absolute epsilons.
    pub absolute_floor: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            plane: 1e-9,
            weld: 1e-10,
            absolute_floor: 1e-9,
        }
    }
}

impl Tolerance {
    pub fn plane_eps(&self, diagonal: f64) -> f64 {
        (self.plane * diagonal).max(self.absolute_floor)
    }

    pub fn weld_eps(&self, diagonal: f64) -> f64 {
        (self.weld * diagonal).max(self.absolute_floor)
    }
}
