//! LabelPlacer: road-name labels along named polylines.
//!
//! Placement is a plan-view heuristic: anchor at the middle of the in-tile
//! length, orient along the local segment, reject labels whose estimated
//! footprint leaves the tile, then accept greedily in discovery order with
//! a minimum anchor separation. Accepted labels are draped and thickened so
//! they pass through the full road body.

use std::collections::HashSet;
use std::f64::consts::{FRAC_PI_2, PI};

use geo::{BooleanOps, Coord, EuclideanLength, Line, LineInterpolatePoint, LineString, MultiLineString, Rect};
use nalgebra::{Point2, Rotation2, Vector2};
use relief_types::{CoordinateOffset, FeatureGeometry, Mesh, TileRect, VectorFeature};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::clip::BoundaryClipper;
use crate::drape::SurfaceProjector;
use crate::solidify::{Profile, Solidifier};
use crate::text::TextLayout;
use crate::types::{DropReason, OpError};

const ABBREVIATIONS: &[(&str, &str)] = &[
    (" Street", " St"),
    (" Avenue", " Ave"),
    (" Boulevard", " Blvd"),
    (" Drive", " Dr"),
    (" Road", " Rd"),
    (" Lane", " Ln"),
    (" Court", " Ct"),
    (" Place", " Pl"),
    (" Circle", " Cir"),
    (" Trail", " Tr"),
    (" Way", " Wy"),
    (" Terrace", " Ter"),
    (" Highway", " Hwy"),
    (" Parkway", " Pkwy"),
    (" Heights", " Hts"),
    (" Point", " Pt"),
    (" Square", " Sq"),
    (" North", " N"),
    (" South", " S"),
    (" East", " E"),
    (" West", " W"),
];

/// Shorten the first matching common suffix ("Main Street" -> "Main St").
pub fn abbreviate(name: &str) -> String {
    for (long, short) in ABBREVIATIONS {
        if let Some(stem) = name.strip_suffix(long) {
            return format!("{stem}{short}");
        }
    }
    name.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSettings {
    /// Cap height of label text, model units.
    pub size: f64,
    /// Extra depth of the label body below the road.
    pub height: f64,
    /// Features with less in-tile length are not labelled.
    pub min_length: f64,
    /// How far the label top stands above the road top.
    pub clearance: f64,
    /// Footprint width per character, as a fraction of `size`.
    pub char_width: f64,
    /// Footprint height, as a fraction of `size`.
    pub char_height: f64,
    /// Tile inset used for the footprint test, as a fraction of `size`.
    pub edge_margin: f64,
    /// Minimum anchor distance between labels, as a fraction of `size`.
    pub separation: f64,
}

impl Default for LabelSettings {
    fn default() -> Self {
        Self {
            size: 30.0,
            height: 5.0,
            min_length: 100.0,
            clearance: 1.5,
            char_width: 0.6,
            char_height: 0.8,
            edge_margin: 0.5,
            separation: 3.0,
        }
    }
}

impl LabelSettings {
    pub fn min_separation(&self) -> f64 {
        self.separation * self.size
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelCandidate {
    pub name: String,
    /// Abbreviated text that is actually cut.
    pub text: String,
    pub anchor: Point2<f64>,
    /// Radians in [-pi/2, pi/2].
    pub angle: f64,
    pub footprint: [Point2<f64>; 4],
    pub in_tile_length: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placement {
    pub accepted: Vec<LabelCandidate>,
    pub rejected: Vec<(String, DropReason)>,
}

fn coord(p: &Point2<f64>) -> Coord<f64> {
    Coord { x: p.x, y: p.y }
}

/// Parts of a polyline inside `tile`, in path order and direction.
fn in_tile_pieces(points: &[Point2<f64>], tile: &TileRect) -> Vec<Line<f64>> {
    let area = Rect::new(
        Coord { x: tile.min_x, y: tile.min_y },
        Coord { x: tile.max_x, y: tile.max_y },
    )
    .to_polygon();
    let mut pieces = Vec::new();
    for w in points.windows(2) {
        let (a, b) = (coord(&w[0]), coord(&w[1]));
        let d = b - a;
        if d.x == 0.0 && d.y == 0.0 {
            continue;
        }
        let along = |c: Coord<f64>| (c.x - a.x) * d.x + (c.y - a.y) * d.y;
        let clipped = area.clip(&MultiLineString::new(vec![LineString::from(vec![a, b])]), false);
        let mut inside: Vec<Line<f64>> = clipped
            .iter()
            .flat_map(|ls| ls.lines())
            .filter(|l| l.euclidean_length() > 0.0)
            .map(|l| if along(l.end) < along(l.start) { Line::new(l.end, l.start) } else { l })
            .collect();
        inside.sort_by(|l, r| along(l.start).total_cmp(&along(r.start)));
        pieces.extend(inside);
    }
    pieces
}

/// Length of a polyline lying inside `tile`.
pub fn in_tile_length(points: &[Point2<f64>], tile: &TileRect) -> f64 {
    in_tile_pieces(points, tile).iter().map(|l| l.euclidean_length()).sum()
}

/// Point and direction at `fraction` of the in-tile arc length.
fn anchor_at(points: &[Point2<f64>], tile: &TileRect, fraction: f64) -> Option<(Point2<f64>, Vector2<f64>)> {
    let pieces = in_tile_pieces(points, tile);
    let target = fraction * pieces.iter().map(|l| l.euclidean_length()).sum::<f64>();
    let mut walked = 0.0;
    for piece in &pieces {
        let len = piece.euclidean_length();
        if walked + len >= target {
            let at = piece.line_interpolate_point((target - walked) / len)?;
            let d = piece.delta();
            return Some((Point2::new(at.x(), at.y()), Vector2::new(d.x, d.y)));
        }
        walked += len;
    }
    pieces.last().map(|l| {
        let d = l.delta();
        (Point2::new(l.end.x, l.end.y), Vector2::new(d.x, d.y))
    })
}

/// Fold an angle into [-pi/2, pi/2] so text never reads upside down.
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle.rem_euclid(2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    }
    if a > FRAC_PI_2 {
        a -= PI;
    } else if a < -FRAC_PI_2 {
        a += PI;
    }
    a
}

fn polyline_points(feature: &VectorFeature) -> Option<Vec<Point2<f64>>> {
    match &feature.geometry {
        FeatureGeometry::Polyline { points, closed } => {
            let mut pts = points.clone();
            if *closed && pts.len() > 2 {
                pts.push(pts[0]);
            }
            Some(pts)
        }
        FeatureGeometry::Polygon { .. } => None,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LabelPlacer {
    pub settings: LabelSettings,
}

impl LabelPlacer {
    pub fn new(settings: LabelSettings) -> Self {
        Self { settings }
    }

    fn footprint(&self, text: &str, anchor: Point2<f64>, angle: f64) -> [Point2<f64>; 4] {
        let s = &self.settings;
        let hw = 0.5 * text.chars().count() as f64 * s.char_width * s.size;
        let hh = 0.5 * s.char_height * s.size;
        let rot = Rotation2::new(angle);
        [
            Vector2::new(-hw, -hh),
            Vector2::new(hw, -hh),
            Vector2::new(hw, hh),
            Vector2::new(-hw, hh),
        ]
        .map(|v| anchor + rot * v)
    }

    /// Evaluate one named polyline already in the placed frame.
    pub fn candidate(&self, name: &str, points: &[Point2<f64>], tile: &TileRect) -> Result<LabelCandidate, DropReason> {
        let length = in_tile_length(points, tile);
        if length <= 0.0 {
            return Err(DropReason::OutsideTile);
        }
        if length < self.settings.min_length {
            return Err(DropReason::TooShort);
        }
        let (anchor, dir) = anchor_at(points, tile, 0.5).ok_or(DropReason::OutsideTile)?;
        let angle = normalize_angle(dir.y.atan2(dir.x));
        let text = abbreviate(name);
        let footprint = self.footprint(&text, anchor, angle);
        let interior = tile.inset(self.settings.edge_margin * self.settings.size);
        if !interior.is_valid() || footprint.iter().any(|c| !interior.contains(c)) {
            return Err(DropReason::FootprintOutside);
        }
        Ok(LabelCandidate {
            name: name.to_string(),
            text,
            anchor,
            angle,
            footprint,
            in_tile_length: length,
        })
    }

    /// Candidates for every named feature, in input order. `offset` maps
    /// the features' source frame to the placed frame.
    pub fn candidates(
        &self,
        features: &[VectorFeature],
        offset: &CoordinateOffset,
        tile: &TileRect,
    ) -> (Vec<LabelCandidate>, Vec<(String, DropReason)>) {
        let mut found = Vec::new();
        let mut rejected = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for feature in features {
            let Some(name) = feature.label() else {
                continue;
            };
            if !seen.insert(name) {
                rejected.push((name.to_string(), DropReason::DuplicateName));
                continue;
            }
            let Some(points) = polyline_points(feature) else {
                rejected.push((name.to_string(), DropReason::Degenerate));
                continue;
            };
            let placed: Vec<Point2<f64>> = points.iter().map(|p| offset.to_placed(p)).collect();
            match self.candidate(name, &placed, tile) {
                Ok(c) => found.push(c),
                Err(reason) => {
                    debug!(name, ?reason, "label candidate rejected");
                    rejected.push((name.to_string(), reason));
                }
            }
        }
        (found, rejected)
    }

    /// Greedy acceptance in discovery order.
    pub fn select(&self, candidates: Vec<LabelCandidate>) -> Placement {
        let min_sep = self.settings.min_separation();
        let mut placement = Placement::default();
        for c in candidates {
            let crowded = placement
                .accepted
                .iter()
                .any(|a| (a.anchor - c.anchor).norm() < min_sep);
            if crowded {
                placement.rejected.push((c.name, DropReason::TooClose));
            } else {
                placement.accepted.push(c);
            }
        }
        placement
    }

    #[instrument(skip_all, fields(features = features.len()))]
    pub fn place(&self, features: &[VectorFeature], offset: &CoordinateOffset, tile: &TileRect) -> Placement {
        let (found, mut rejected) = self.candidates(features, offset, tile);
        let mut placement = self.select(found);
        rejected.append(&mut placement.rejected);
        placement.rejected = rejected;
        info!(
            accepted = placement.accepted.len(),
            rejected = placement.rejected.len(),
            "labels placed"
        );
        placement
    }

    /// Drape one label and extrude it through the road body.
    ///
    /// The top sits `clearance` above the road top; the bottom reaches
    /// `height` below the road bottom. Returns an empty mesh when nothing
    /// of the label survives draping and clipping.
    pub fn label_solid(
        &self,
        label: &LabelCandidate,
        projector: &SurfaceProjector<'_>,
        road: &Profile,
        tile: &TileRect,
        spacing: f64,
    ) -> Result<Mesh, OpError> {
        let s = &self.settings;
        let above = road.above + s.clearance;
        let below = road.below + s.height - s.clearance;
        let layout = TextLayout::new(s.size, label.anchor).rotated(label.angle);
        let solidifier = Solidifier::default();
        let clipper = BoundaryClipper::capped(*tile);
        let mut out = Mesh::new();
        for (_, rects) in layout.glyph_outlines(&label.text) {
            for rect in rects {
                let flat = solidifier.footprint_surface(&rect, &[], spacing)?;
                let draped = projector.drape_mesh(&flat);
                if draped.is_empty() {
                    continue;
                }
                match solidifier.solidify_surface(&draped, above, below) {
                    Ok(solid) => out.append(&clipper.clip(&solid)),
                    Err(e) => warn!(label = %label.text, error = %e, "label stroke skipped"),
                }
            }
        }
        debug!(label = %label.text, faces = out.face_count(), "label solid built");
        Ok(out)
    }
}
