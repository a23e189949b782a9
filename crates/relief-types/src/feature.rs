use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// One vector overlay record as handed over by the overlay loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorFeature {
    pub geometry: FeatureGeometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeatureGeometry {
    /// Line string. `closed` joins the last point back to the first.
    Polyline {
        points: Vec<Point2<f64>>,
        #[serde(default)]
        closed: bool,
    },
    /// Footprint with an outer ring and optional holes. Rings are not
    /// repeated-endpoint closed.
    Polygon {
        exterior: Vec<Point2<f64>>,
        #[serde(default)]
        holes: Vec<Vec<Point2<f64>>>,
    },
}

impl VectorFeature {
    pub fn polyline(points: Vec<Point2<f64>>) -> Self {
        Self {
            geometry: FeatureGeometry::Polyline {
                points,
                closed: false,
            },
            name: None,
        }
    }

    pub fn polygon(exterior: Vec<Point2<f64>>) -> Self {
        Self {
            geometry: FeatureGeometry::Polygon {
                exterior,
                holes: Vec::new(),
            },
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Non-empty trimmed name, if any.
    pub fn label(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    pub fn points(&self) -> impl Iterator<Item = &Point2<f64>> {
        let (a, b): (&[Point2<f64>], &[Vec<Point2<f64>>]) = match &self.geometry {
            FeatureGeometry::Polyline { points, .. } => (points.as_slice(), [].as_slice()),
            FeatureGeometry::Polygon { exterior, holes } => {
                (exterior.as_slice(), holes.as_slice())
            }
        };
        a.iter().chain(b.iter().flatten())
    }

    /// Planar length along the polyline, or the exterior perimeter.
    pub fn length(&self) -> f64 {
        let (pts, closed) = match &self.geometry {
            FeatureGeometry::Polyline { points, closed } => (points, *closed),
            FeatureGeometry::Polygon { exterior, .. } => (exterior, true),
        };
        let open: f64 = pts.windows(2).map(|w| (w[1] - w[0]).norm()).sum();
        match (closed, pts.first(), pts.last()) {
            (true, Some(a), Some(b)) if pts.len() > 2 => open + (a - b).norm(),
            _ => open,
        }
    }

    pub fn map_points(&self, f: impl Fn(&Point2<f64>) -> Point2<f64>) -> VectorFeature {
        let geometry = match &self.geometry {
            FeatureGeometry::Polyline { points, closed } => FeatureGeometry::Polyline {
                points: points.iter().map(&f).collect(),
                closed: *closed,
            },
            FeatureGeometry::Polygon { exterior, holes } => FeatureGeometry::Polygon {
                exterior: exterior.iter().map(&f).collect(),
                holes: holes.iter().map(|h| h.iter().map(&f).collect()).collect(),
            },
        };
        VectorFeature {
            geometry,
            name: self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn polyline_length_sums_segments() {
        let f = VectorFeature::polyline(vec![
            Point2::new(0.0, 0.0),
            Point2::new(3.0, 4.0),
            Point2::new(3.0, 10.0),
        ]);
        assert_relative_eq!(f.length(), 11.0);
    }

    #[test]
    fn polygon_length_includes_closing_edge() {
        let f = VectorFeature::polygon(vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ]);
        assert_relative_eq!(f.length(), 4.0);
    }

    #[test]
    fn blank_name_is_not_a_label() {
        let f = VectorFeature::polyline(vec![]).with_name("   ");
        assert_eq!(f.label(), None);
        let g = VectorFeature::polyline(vec![]).with_name(" Main Street ");
        assert_eq!(g.label(), Some("Main Street"));
    }

    #[test]
    fn json_shape_is_tagged() {
        let f = VectorFeature::polyline(vec![Point2::new(1.0, 2.0)]).with_name("A");
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["geometry"]["type"], "Polyline");
        let back: VectorFeature = serde_json::from_value(json).unwrap();
        assert_eq!(back, f);
    }
}
