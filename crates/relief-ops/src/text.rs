//! Stroke text for debossed tile names and road labels.
//!
//! Glyph strokes come from a Hershey vector font. Each pen segment becomes
//! a rectangle whose ends overlap its neighbours, so the strokes of one
//! glyph form a single connected outline once unioned. Layouts are centred
//! on the ink bounding box of the whole line.

use hershey::{Font, Vector as HersheyVector};
use nalgebra::{Point2, Rotation2, Vector2};
use relief_kernel::primitives::make_prism;
use relief_kernel::topology::audit_edges;
use relief_types::Mesh;
use tracing::{debug, warn};

use crate::csg::CsgEngine;
use crate::types::OpError;

/// Stroke width as a fraction of cap height.
const STROKE: f64 = 0.14;
/// Cap height in font units when the font has no `H` to measure.
const FALLBACK_CAP: f64 = 21.0;

fn font() -> Font {
    hershey::fonts::GOTHIC_ENG_SANS
}

/// Pen paths of one glyph in font units, with its advance width.
#[derive(Debug, Clone, Default)]
struct RawGlyph {
    paths: Vec<Vec<Vector2<f64>>>,
    min_x: f64,
    advance: f64,
}

fn raw_glyph(c: char) -> Option<RawGlyph> {
    let font = font();
    let glyph = font.glyph(c).ok()?;
    let mut paths: Vec<Vec<Vector2<f64>>> = Vec::new();
    let mut current: Vec<Vector2<f64>> = Vec::new();
    for v in &glyph.vectors {
        match v {
            HersheyVector::MoveTo { x, y } => {
                if current.len() >= 2 {
                    paths.push(std::mem::take(&mut current));
                }
                current.clear();
                current.push(Vector2::new(*x as f64, *y as f64));
            }
            HersheyVector::LineTo { x, y } => current.push(Vector2::new(*x as f64, *y as f64)),
        }
    }
    if current.len() >= 2 {
        paths.push(current);
    }
    Some(RawGlyph {
        paths,
        min_x: glyph.min_x as f64,
        advance: (glyph.max_x - glyph.min_x) as f64,
    })
}

/// Scale and vertical sense of the font.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Metrics {
    cap: f64,
    /// -1 when font Y grows downward.
    y_sign: f64,
    space: f64,
}

fn ink_rows(glyph: &RawGlyph) -> Option<(f64, f64)> {
    let ys = glyph.paths.iter().flatten().map(|p| p.y);
    let lo = ys.clone().fold(f64::INFINITY, f64::min);
    let hi = ys.fold(f64::NEG_INFINITY, f64::max);
    (hi > lo).then_some((lo, hi))
}

fn metrics() -> Metrics {
    let h = raw_glyph('H');
    let cap = h
        .as_ref()
        .and_then(ink_rows)
        .map(|(lo, hi)| hi - lo)
        .unwrap_or(FALLBACK_CAP);
    // The foot of an L is its longest horizontal run; it sits at the bottom.
    let y_sign = raw_glyph('L')
        .and_then(|l| {
            let (lo, hi) = ink_rows(&l)?;
            let foot = l
                .paths
                .iter()
                .flat_map(|p| p.windows(2))
                .filter(|w| (w[0].y - w[1].y).abs() < 1e-9)
                .max_by(|a, b| (a[1].x - a[0].x).abs().total_cmp(&(b[1].x - b[0].x).abs()))?;
            Some(if (foot[0].y - lo).abs() <= (foot[0].y - hi).abs() { 1.0 } else { -1.0 })
        })
        .unwrap_or(-1.0);
    let space = h.map(|g| 0.5 * g.advance).filter(|a| *a > 0.0).unwrap_or(0.5 * cap);
    Metrics { cap, y_sign, space }
}

/// Whether the font draws `c` (space and unknown characters only advance).
pub fn is_drawable(c: char) -> bool {
    raw_glyph(c).is_some_and(|g| !g.paths.is_empty())
}

/// Placement of one line of text in the XY plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextLayout {
    /// Cap height in model units.
    pub size: f64,
    pub center: Point2<f64>,
    /// Counter-clockwise rotation about `center`, radians.
    pub angle: f64,
    /// Flip about the X axis through `center` so the text reads from below.
    pub mirrored: bool,
}

type Paths = Vec<(char, Vec<Vec<Vector2<f64>>>)>;

impl TextLayout {
    pub fn new(size: f64, center: Point2<f64>) -> Self {
        Self {
            size,
            center,
            angle: 0.0,
            mirrored: false,
        }
    }

    pub fn rotated(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    pub fn mirrored(mut self) -> Self {
        self.mirrored = true;
        self
    }

    /// Pen paths in model units, centred on their ink bounding box.
    fn local_paths(&self, text: &str) -> Paths {
        let m = metrics();
        let unit = self.size / m.cap;
        let mut cursor = 0.0;
        let mut out: Paths = Vec::new();
        for c in text.chars() {
            let Some(g) = raw_glyph(c) else {
                cursor += m.space;
                continue;
            };
            let origin = cursor - g.min_x;
            cursor += g.advance;
            if g.paths.is_empty() {
                continue;
            }
            let paths = g
                .paths
                .iter()
                .map(|p| {
                    p.iter()
                        .map(|v| Vector2::new((origin + v.x) * unit, m.y_sign * v.y * unit))
                        .collect()
                })
                .collect();
            out.push((c, paths));
        }
        let Some((lo, hi)) = ink_bounds(&out) else {
            return out;
        };
        let shift = 0.5 * (lo + hi);
        for (_, paths) in &mut out {
            for v in paths.iter_mut().flatten() {
                *v -= shift;
            }
        }
        out
    }

    /// Ink width of `text` before rotation.
    pub fn width(&self, text: &str) -> f64 {
        ink_bounds(&self.local_paths(text)).map_or(0.0, |(lo, hi)| hi.x - lo.x)
    }

    fn place(&self, local: Vector2<f64>) -> Point2<f64> {
        let local = if self.mirrored {
            Vector2::new(local.x, -local.y)
        } else {
            local
        };
        self.center + Rotation2::new(self.angle) * local
    }

    /// Stroke rectangles for every drawable character, grouped by character.
    pub fn glyph_outlines(&self, text: &str) -> Vec<(char, Vec<[Point2<f64>; 4]>)> {
        let hw = 0.5 * STROKE * self.size;
        self.local_paths(text)
            .into_iter()
            .map(|(c, paths)| {
                let mut rects = Vec::new();
                for path in &paths {
                    for seg in path.windows(2) {
                        let (a, b) = (seg[0], seg[1]);
                        let Some(d) = (b - a).try_normalize(1e-12) else {
                            continue;
                        };
                        let n = Vector2::new(-d.y, d.x) * hw;
                        let (a, b) = (a - d * hw, b + d * hw);
                        rects.push([
                            self.place(a + n),
                            self.place(a - n),
                            self.place(b - n),
                            self.place(b + n),
                        ]);
                    }
                }
                (c, rects)
            })
            .filter(|(_, rects)| !rects.is_empty())
            .collect()
    }
}

fn ink_bounds(paths: &Paths) -> Option<(Vector2<f64>, Vector2<f64>)> {
    let mut points = paths.iter().flat_map(|(_, p)| p.iter().flatten());
    let first = *points.next()?;
    Some(points.fold((first, first), |(lo, hi), v| (lo.inf(v), hi.sup(v))))
}

/// The stroke solids of one debossed character or symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphCutter {
    pub label: String,
    pub strokes: Vec<Mesh>,
}

impl GlyphCutter {
    /// Extrude every stroke of `text` between `z0` and `z1`.
    pub fn from_text(layout: &TextLayout, text: &str, z0: f64, z1: f64) -> Result<Vec<GlyphCutter>, OpError> {
        layout
            .glyph_outlines(text)
            .into_iter()
            .map(|(c, rects)| {
                let strokes = rects
                    .iter()
                    .map(|r| make_prism(r, z0, z1))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(GlyphCutter {
                    label: c.to_string(),
                    strokes,
                })
            })
            .collect()
    }

    /// Closed cutters to subtract: the union of all strokes when it is a
    /// closed manifold, otherwise the strokes one by one.
    pub fn into_cutters(self, engine: &CsgEngine) -> Vec<Mesh> {
        if self.strokes.len() < 2 {
            return self.strokes;
        }
        match engine.union_all(&self.strokes) {
            Ok(merged) if !merged.is_empty() => {
                let audit = audit_edges(&merged);
                if audit.is_closed() {
                    debug!(glyph = %self.label, strokes = self.strokes.len(), "glyph strokes merged");
                    vec![merged]
                } else {
                    debug!(
                        glyph = %self.label,
                        boundary = audit.boundary_edges,
                        non_manifold = audit.non_manifold_edges,
                        "merged glyph is open, cutting strokes individually"
                    );
                    self.strokes
                }
            }
            Ok(_) => self.strokes,
            Err(e) => {
                warn!(glyph = %self.label, error = %e, "glyph union failed, cutting strokes individually");
                self.strokes
            }
        }
    }
}
