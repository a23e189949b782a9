//! Cutter builders for the fixed subtraction groups: flat bottom, deboss,
//! alignment notches and mounting holes.
//!
//! All sizes here are model units. Millimetre options are converted with
//! [`PrintScale`] before they reach these builders.

use std::f64::consts::{FRAC_PI_2, PI};

use nalgebra::{Point2, Point3, Rotation2, Vector2};
use relief_kernel::primitives::{make_box, make_cylinder, make_prism};
use relief_types::{Aabb, Mesh, TileRect};
use tracing::{debug, warn};

use crate::clip::Side;
use crate::text::{GlyphCutter, TextLayout};
use crate::types::OpError;

/// Relation between model units and the printed width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintScale {
    pub model_width: f64,
    pub width_mm: f64,
}

impl PrintScale {
    pub fn new(model_width: f64, width_mm: f64) -> Result<Self, OpError> {
        if !(model_width.is_finite() && model_width > 0.0) {
            return Err(OpError::InvalidParameter {
                reason: format!("model width must be positive, got {model_width}"),
            });
        }
        if !(width_mm.is_finite() && width_mm > 0.0) {
            return Err(OpError::InvalidParameter {
                reason: format!("output width must be positive, got {width_mm}"),
            });
        }
        Ok(Self { model_width, width_mm })
    }

    /// Uniform factor taking model units to millimetres.
    pub fn factor(&self) -> f64 {
        self.width_mm / self.model_width
    }

    pub fn mm_to_model(&self, mm: f64) -> f64 {
        mm * self.model_width / self.width_mm
    }
}

/// Cut elevation that flattens the whole underside of an extruded base.
///
/// The cut keeps `thickness` of material below the highest surface point,
/// so the printed height is fixed by the base setting. This differs from
/// cutting a fixed one unit below the lowest surface point, which leaves
/// the full relief plus one unit regardless of `thickness`.
///
/// Returns the elevation and whether it had to be lowered because the
/// naive choice would have cut into the terrain surface.
pub fn auto_cut_elevation(surface_min_z: f64, surface_max_z: f64, thickness: f64) -> (f64, bool) {
    let cut = surface_max_z - thickness;
    if cut > surface_min_z {
        let lowered = surface_min_z - 0.1 * thickness;
        warn!(
            requested = cut,
            lowered, "base thinner than terrain relief, cut lowered below the surface"
        );
        (lowered, true)
    } else {
        (cut, false)
    }
}

/// Oversized box whose top face sits at `cut_z`.
///
/// The box spans three times the model's planar extent and ten times its
/// height, or `min_height` if that is larger.
pub fn flat_bottom_cutter(bounds: &Aabb, cut_z: f64, min_height: f64) -> Mesh {
    let c = bounds.center();
    let half = 1.5 * bounds.planar_extent().max(f64::MIN_POSITIVE);
    let height = (10.0 * bounds.extent().z).max(min_height);
    make_box(
        Point3::new(c.x - half, c.y - half, cut_z - height),
        Point3::new(c.x + half, c.y + half, cut_z),
    )
}

/// Notch geometry in model units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotchSettings {
    /// Triangle base width and height.
    pub size: f64,
    pub depth: f64,
    /// Distance of each notch from its corner, percent of the edge length.
    pub position_pct: f64,
    /// 0 puts the whole triangle outside the tile, 100 puts the apex on the edge.
    pub edge_inset_pct: f64,
}

/// One planned notch: the edge it sits on and the corner it is nearest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotchSpec {
    pub edge: Side,
    pub corner: Side,
    pub center: Point2<f64>,
    pub rotation: f64,
    pub triangle: [Point2<f64>; 3],
}

impl NotchSpec {
    pub fn name(&self) -> String {
        format!("{:?}_{:?}", self.edge, self.corner)
    }

    pub fn cutter(&self, z0: f64, z1: f64) -> Result<Mesh, OpError> {
        Ok(make_prism(&self.triangle, z0, z1)?)
    }
}

/// Eight notches, two per edge, in S, N, W, E order with the lower corner
/// first on each edge.
pub fn notch_plan(tile: &TileRect, settings: &NotchSettings) -> Vec<NotchSpec> {
    let half = 0.5 * settings.size;
    let off = half * (2.0 * settings.edge_inset_pct / 100.0 - 1.0);
    let along_x = tile.width() * settings.position_pct / 100.0;
    let along_y = tile.height() * settings.position_pct / 100.0;

    let sites = [
        (Side::South, Side::West, tile.min_x + along_x, tile.min_y + off, PI),
        (Side::South, Side::East, tile.max_x - along_x, tile.min_y + off, PI),
        (Side::North, Side::West, tile.min_x + along_x, tile.max_y - off, 0.0),
        (Side::North, Side::East, tile.max_x - along_x, tile.max_y - off, 0.0),
        (Side::West, Side::South, tile.min_x + off, tile.min_y + along_y, FRAC_PI_2),
        (Side::West, Side::North, tile.min_x + off, tile.max_y - along_y, FRAC_PI_2),
        (Side::East, Side::South, tile.max_x - off, tile.min_y + along_y, -FRAC_PI_2),
        (Side::East, Side::North, tile.max_x - off, tile.max_y - along_y, -FRAC_PI_2),
    ];

    sites
        .into_iter()
        .map(|(edge, corner, x, y, rotation)| {
            let center = Point2::new(x, y);
            let rot = Rotation2::new(rotation);
            let local = [
                Vector2::new(0.0, half),
                Vector2::new(-half, -half),
                Vector2::new(half, -half),
            ];
            NotchSpec {
                edge,
                corner,
                center,
                rotation,
                triangle: local.map(|v| center + rot * v),
            }
        })
        .collect()
}

/// Vertical span of notch cutters below a model whose lowest point is `min_z`.
pub fn notch_z_range(min_z: f64, depth: f64) -> (f64, f64) {
    (min_z - 2.0 * depth, min_z + 1.2 * depth)
}

/// Hole centres inset from the SW, SE, NW and NE corners.
pub fn hole_centers(tile: &TileRect, corner_inset_pct: f64) -> [Point2<f64>; 4] {
    let ix = tile.width() * corner_inset_pct / 100.0;
    let iy = tile.height() * corner_inset_pct / 100.0;
    [
        Point2::new(tile.min_x + ix, tile.min_y + iy),
        Point2::new(tile.max_x - ix, tile.min_y + iy),
        Point2::new(tile.min_x + ix, tile.max_y - iy),
        Point2::new(tile.max_x - ix, tile.max_y - iy),
    ]
}

pub fn hole_z_range(min_z: f64, depth: f64) -> (f64, f64) {
    (min_z - 1.0, min_z + depth)
}

pub fn hole_cutter(center: Point2<f64>, diameter: f64, z0: f64, z1: f64, segments: usize) -> Mesh {
    make_cylinder(center, 0.5 * diameter, z0, z1, segments.max(3))
}

/// Deboss text and the optional north marker, one cutter group per glyph.
pub fn deboss_plan(
    text: &str,
    bounds: &Aabb,
    model_width: f64,
    depth: f64,
    north_arrow: bool,
) -> Result<Vec<GlyphCutter>, OpError> {
    let (z0, z1) = (bounds.min.z - 2.0 * depth, bounds.min.z + depth);
    let size = 0.12 * model_width;
    let c = bounds.center();
    let layout = TextLayout::new(size, Point2::new(c.x, c.y)).mirrored();
    let mut plan = GlyphCutter::from_text(&layout, text, z0, z1)?;

    if north_arrow {
        let ax = bounds.min.x + 0.85 * bounds.extent().x;
        let ay = bounds.min.y + 0.85 * bounds.extent().y;
        let s = 0.6 * size;
        let n = TextLayout::new(s, Point2::new(ax, ay)).mirrored();
        plan.extend(GlyphCutter::from_text(&n, "N", z0, z1)?);

        let base_y = ay + 0.5 * s;
        let tri = [
            Point2::new(ax, base_y + 0.3 * s),
            Point2::new(ax - 0.12 * s, base_y),
            Point2::new(ax + 0.12 * s, base_y),
        ];
        plan.push(GlyphCutter {
            label: "north-arrow".into(),
            strokes: vec![make_prism(&tri, z0, z1)?],
        });
    }
    debug!(glyphs = plan.len(), size, "deboss planned");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tile() -> TileRect {
        TileRect::new(0.0, 100.0, 0.0, 100.0)
    }

    fn settings(edge_inset_pct: f64) -> NotchSettings {
        NotchSettings {
            size: 10.0,
            depth: 3.0,
            position_pct: 25.0,
            edge_inset_pct,
        }
    }

    #[test]
    fn print_scale_converts_both_ways() {
        let s = PrintScale::new(1000.0, 200.0).unwrap();
        assert_relative_eq!(s.factor(), 0.2);
        assert_relative_eq!(s.mm_to_model(5.0), 25.0);
        assert!(PrintScale::new(0.0, 200.0).is_err());
    }

    #[test]
    fn auto_cut_lowers_when_base_is_too_thin() {
        assert_eq!(auto_cut_elevation(50.0, 100.0, 70.0), (30.0, false));
        let (cut, lowered) = auto_cut_elevation(50.0, 100.0, 20.0);
        assert!(lowered);
        assert_relative_eq!(cut, 48.0);
    }

    #[test]
    fn flat_cutter_top_is_the_cut_plane() {
        let bounds = Aabb::new(Point3::new(0.0, 0.0, -10.0), Point3::new(100.0, 50.0, 1.0));
        let cutter = flat_bottom_cutter(&bounds, 0.0, 50.0);
        let bb = cutter.bounds().unwrap();
        assert_eq!(bb.max.z, 0.0);
        assert_relative_eq!(bb.min.z, -110.0);
        assert_relative_eq!(bb.extent().x, 300.0);
        assert!(bb.min.y < bounds.min.y && bb.max.y > bounds.max.y);
    }

    #[test]
    fn notches_come_in_fixed_order() {
        let plan = notch_plan(&tile(), &settings(50.0));
        let names: Vec<String> = plan.iter().map(NotchSpec::name).collect();
        assert_eq!(
            names,
            [
                "South_West",
                "South_East",
                "North_West",
                "North_East",
                "West_South",
                "West_North",
                "East_South",
                "East_North"
            ]
        );
        assert_relative_eq!(plan[0].center.x, 25.0);
        assert_relative_eq!(plan[1].center.x, 75.0);
        assert_relative_eq!(plan[4].center.y, 25.0);
    }

    #[test]
    fn full_inset_puts_the_apex_on_the_edge() {
        let plan = notch_plan(&tile(), &settings(100.0));
        let south = &plan[0];
        assert_relative_eq!(south.triangle[0].y, 0.0, epsilon = 1e-9);
        assert!(south.triangle[1].y > 0.0);
        let east = &plan[6];
        assert_relative_eq!(east.triangle[0].x, 100.0, epsilon = 1e-9);
        assert!(east.triangle[1].x < 100.0);
    }

    #[test]
    fn zero_inset_keeps_the_triangle_outside() {
        for spec in notch_plan(&tile(), &settings(0.0)) {
            let inside = spec
                .triangle
                .iter()
                .filter(|p| p.x > 1e-9 && p.x < 100.0 - 1e-9 && p.y > 1e-9 && p.y < 100.0 - 1e-9)
                .count();
            assert_eq!(inside, 0, "{}", spec.name());
        }
    }

    #[test]
    fn notch_cutters_are_closed_prisms() {
        let (z0, z1) = notch_z_range(0.0, 3.0);
        assert_relative_eq!(z0, -6.0, epsilon = 1e-12);
        assert_relative_eq!(z1, 3.6, epsilon = 1e-12);
        for spec in notch_plan(&tile(), &settings(50.0)) {
            let m = spec.cutter(z0, z1).unwrap();
            assert_relative_eq!(m.signed_volume(), 50.0 * 9.6, epsilon = 1e-9);
        }
    }

    #[test]
    fn holes_sit_inside_each_corner() {
        let c = hole_centers(&TileRect::new(0.0, 200.0, 0.0, 100.0), 10.0);
        assert_eq!(c[0], Point2::new(20.0, 10.0));
        assert_eq!(c[3], Point2::new(180.0, 90.0));
        let m = hole_cutter(c[0], 6.0, -1.0, 3.0, 16);
        let bb = m.bounds().unwrap();
        assert_relative_eq!(bb.extent().x, 6.0, epsilon = 1e-9);
    }

    #[test]
    fn deboss_adds_north_marker() {
        let bounds = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(100.0, 100.0, 10.0));
        let plain = deboss_plan("AB", &bounds, 100.0, 1.0, false).unwrap();
        assert_eq!(plain.len(), 2);
        let with_arrow = deboss_plan("AB", &bounds, 100.0, 1.0, true).unwrap();
        assert_eq!(with_arrow.len(), 4);
        let arrow = with_arrow.last().unwrap().strokes[0].bounds().unwrap();
        assert!(arrow.min.x > 80.0 && arrow.min.y > 85.0);
        assert_relative_eq!(arrow.min.z, -2.0);
        assert_relative_eq!(arrow.max.z, 1.0);
    }
}
