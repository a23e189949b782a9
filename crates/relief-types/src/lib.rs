//! Shared value types for the terrain relief pipeline.
//!
//! Everything here is plain data: meshes, bounding boxes, tile rectangles,
//! vector overlay features and the coordinate transforms that connect
//! externally sourced datasets to the placed terrain frame.

pub mod bounds;
pub mod feature;
pub mod mesh;
pub mod transform;

pub use bounds::{Aabb, TileRect};
pub use feature::{FeatureGeometry, VectorFeature};
pub use mesh::{Mesh, MeshError};
pub use transform::{CoordinateOffset, CoordinateTransform};

pub use nalgebra::{Point2, Point3, Vector2, Vector3};
