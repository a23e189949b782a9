use relief_kernel::GeometryError;
use serde::Serialize;

/// Errors from geometry operations on overlays and cutters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OpError {
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("solid is not closed ({boundary_edges} boundary, {non_manifold_edges} non-manifold edges)")]
    NotManifold {
        boundary_edges: usize,
        non_manifold_edges: usize,
    },

    #[error("invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    #[error("malformed CityJSON: {reason}")]
    CityJson { reason: String },
}

/// Why an overlay feature or label produced no geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DropReason {
    /// Every vertex lay outside the surface footprint plus the prune margin.
    OutsideTile,
    /// No run of at least two vertices survived projection.
    DrapeMissed,
    /// Too few distinct points or zero area.
    Degenerate,
    /// Nothing was left after the boundary cuts.
    ClippedAway,
    /// In-tile length below the configured minimum.
    TooShort,
    /// The label footprint crosses the inset tile boundary.
    FootprintOutside,
    /// Another accepted label is closer than the minimum separation.
    TooClose,
    /// A label with the same name was already placed.
    DuplicateName,
}

/// Non-fatal warnings collected during an operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
}

impl Diagnostics {
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }
}
