pub mod cityjson;
pub mod clip;
pub mod csg;
pub mod cutters;
pub mod drape;
pub mod labels;
pub mod solidify;
pub mod text;
pub mod types;

pub use cityjson::{AlignmentReport, Building, CityJsonAligner, CityJsonDocument, LodChoice};
pub use clip::{BoundaryClipper, Side};
pub use csg::{CsgEngine, CutTally, SubtractOutcome};
pub use cutters::{NotchSettings, NotchSpec, PrintScale};
pub use drape::{densify, DrapeResult, DrapeSettings, DrapedPath, SurfaceProjector};
pub use labels::{abbreviate, normalize_angle, LabelCandidate, LabelPlacer, LabelSettings, Placement};
pub use solidify::{ensure_closed, extrude_base, Profile, Solidifier};
pub use text::{GlyphCutter, TextLayout};
pub use types::*;
