use nalgebra::{Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

/// Scale and translate triplets attached to an integer-encoded 3D dataset.
///
/// Decoded coordinate = `raw * scale + translate`, component-wise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateTransform {
    pub scale: [f64; 3],
    pub translate: [f64; 3],
}

impl Default for CoordinateTransform {
    fn default() -> Self {
        Self {
            scale: [1.0; 3],
            translate: [0.0; 3],
        }
    }
}

impl CoordinateTransform {
    pub fn apply(&self, raw: [f64; 3]) -> Point3<f64> {
        Point3::new(
            raw[0] * self.scale[0] + self.translate[0],
            raw[1] * self.scale[1] + self.translate[1],
            raw[2] * self.scale[2] + self.translate[2],
        )
    }
}

/// Planar shift between an overlay's source frame and the placed terrain frame.
///
/// Recovered from the overlay dataset's bounding-box minimum versus the
/// minimum of the geometry the importer placed in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoordinateOffset {
    pub dx: f64,
    pub dy: f64,
}

impl CoordinateOffset {
    pub fn between(source_min: Point2<f64>, placed_min: Point2<f64>) -> Self {
        let d = source_min - placed_min;
        Self { dx: d.x, dy: d.y }
    }

    pub fn to_placed(&self, p: &Point2<f64>) -> Point2<f64> {
        p - Vector2::new(self.dx, self.dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_scales_then_translates() {
        let t = CoordinateTransform {
            scale: [0.001, 0.001, 0.01],
            translate: [100.0, 200.0, 5.0],
        };
        let p = t.apply([1000.0, 2000.0, 100.0]);
        assert_eq!(p, Point3::new(101.0, 202.0, 6.0));
    }

    #[test]
    fn offset_maps_source_min_to_placed_min() {
        let src = Point2::new(500_000.0, 4_000_000.0);
        let placed = Point2::new(0.0, 0.0);
        let off = CoordinateOffset::between(src, placed);
        assert_eq!(off.to_placed(&Point2::new(500_010.0, 4_000_020.0)), Point2::new(10.0, 20.0));
    }
}
