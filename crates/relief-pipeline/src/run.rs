//! One tile, start to finish.
//!
//! Stages run strictly in order, each taking the terrain solid by value and
//! handing back a new one: import, base extrusion, flat-bottom cut,
//! overlays, labels, deboss, notches, mounting holes, seam repair, final
//! scaling. Only
//! the loss of the terrain solid aborts the run; every other failure is
//! counted in the [`RunSummary`].

use std::time::Instant;

use relief_kernel::topology::repair_solid;
use relief_kernel::{HeightSurface, RepairReport, Tolerance};
use relief_ops::cutters::{
    auto_cut_elevation, deboss_plan, flat_bottom_cutter, hole_centers, hole_cutter, hole_z_range, notch_plan,
    notch_z_range,
};
use relief_ops::{
    extrude_base, BoundaryClipper, CityJsonDocument, CsgEngine, CutTally, DropReason, LabelPlacer, NotchSettings,
    PrintScale, Profile, Solidifier, SurfaceProjector,
};
use relief_types::{CoordinateOffset, FeatureGeometry, Mesh, Point2, TileRect, VectorFeature};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{BuildingSource, CutMode, PipelineConfig};
use crate::error::PipelineError;
use crate::input::TileInput;

/// Per-category feature counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub attempted: usize,
    pub produced: usize,
    pub dropped: usize,
}

impl CategoryCounts {
    fn reject(&mut self, category: &'static str, feature: usize, reason: DropReason) {
        self.dropped += 1;
        warn!(category, feature, ?reason, "feature dropped");
    }
}

/// Subtraction counts per cutter group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutGroups {
    pub flat_bottom: CutTally,
    pub deboss: CutTally,
    pub notches: CutTally,
    pub mounting_holes: CutTally,
}

impl CutGroups {
    pub fn total(&self) -> CutTally {
        let mut total = CutTally::default();
        for group in [&self.flat_bottom, &self.deboss, &self.notches, &self.mounting_holes] {
            total.merge(group);
        }
        total
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub tile: String,
    pub cut_elevation: f64,
    pub buildings: CategoryCounts,
    pub roads: CategoryCounts,
    pub trails: CategoryCounts,
    pub labels: CategoryCounts,
    pub cuts: CutGroups,
    /// Seam repair applied to the terrain after the last cut.
    pub repair: RepairReport,
    /// Vertical offset applied to CityJSON buildings, when one was estimated.
    pub alignment_offset: Option<f64>,
    pub vertices: usize,
    pub faces: usize,
    pub elapsed_ms: u64,
    pub warnings: Vec<String>,
}

impl RunSummary {
    fn new(tile: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            tile: tile.to_string(),
            ..Self::default()
        }
    }
}

/// Solids produced for one tile, scaled to millimetres.
#[derive(Debug, Clone, PartialEq)]
pub struct TileOutput {
    pub name: String,
    pub terrain: Mesh,
    pub buildings: Mesh,
    pub roads: Mesh,
    pub trails: Mesh,
    pub road_labels: Mesh,
    pub summary: RunSummary,
}

impl TileOutput {
    /// Non-empty solids with their category suffix.
    pub fn solids(&self) -> Vec<(&'static str, &Mesh)> {
        [
            ("terrain", &self.terrain),
            ("buildings", &self.buildings),
            ("roads", &self.roads),
            ("trails", &self.trails),
            ("road_labels", &self.road_labels),
        ]
        .into_iter()
        .filter(|(_, m)| !m.is_empty())
        .collect()
    }
}

fn ensure_terrain(terrain: &Mesh, stage: &'static str) -> Result<(), PipelineError> {
    if terrain.is_empty() {
        error!(stage, "terrain solid is empty");
        return Err(PipelineError::TerrainDestroyed { stage });
    }
    Ok(())
}

/// Line-overlay points and whether they form a ring.
fn line_points(feature: &VectorFeature) -> (&[Point2<f64>], bool) {
    match &feature.geometry {
        FeatureGeometry::Polyline { points, closed } => (points.as_slice(), *closed),
        FeatureGeometry::Polygon { exterior, .. } => (exterior.as_slice(), true),
    }
}

/// Shared state for the overlay stages of one run.
struct Overlay<'s> {
    projector: SurfaceProjector<'s>,
    clipper: BoundaryClipper,
    solidifier: Solidifier,
    spacing: f64,
}

impl Overlay<'_> {
    fn lines(
        &self,
        category: &'static str,
        features: &[VectorFeature],
        profile: &Profile,
        counts: &mut CategoryCounts,
    ) -> Mesh {
        let mut out = Mesh::new();
        for (index, feature) in features.iter().enumerate() {
            counts.attempted += 1;
            let (points, closed) = line_points(feature);
            let paths = self.projector.drape_polyline(points, closed, self.spacing);
            if paths.is_empty() {
                counts.reject(category, index, DropReason::DrapeMissed);
                continue;
            }
            let before = out.face_count();
            for path in &paths {
                match self.solidifier.sweep(path, profile) {
                    Ok(solid) => out.append(&self.clipper.clip(&solid)),
                    Err(e) => debug!(category, feature = index, error = %e, "path skipped"),
                }
            }
            if out.face_count() == before {
                counts.reject(category, index, DropReason::ClippedAway);
            } else {
                counts.produced += 1;
            }
        }
        out
    }

    fn footprints(&self, features: &[VectorFeature], height: f64, depth: f64, counts: &mut CategoryCounts) -> Mesh {
        let mut out = Mesh::new();
        for (index, feature) in features.iter().enumerate() {
            counts.attempted += 1;
            let FeatureGeometry::Polygon { exterior, holes } = &feature.geometry else {
                counts.reject("buildings", index, DropReason::Degenerate);
                continue;
            };
            let flat = match self.solidifier.footprint_surface(exterior, holes, self.spacing) {
                Ok(flat) => flat,
                Err(e) => {
                    debug!(feature = index, error = %e, "footprint not triangulated");
                    counts.reject("buildings", index, DropReason::Degenerate);
                    continue;
                }
            };
            let draped = self.projector.drape_mesh(&flat);
            if draped.is_empty() {
                counts.reject("buildings", index, DropReason::DrapeMissed);
                continue;
            }
            let solid = match self.solidifier.solidify_surface(&draped, height, depth) {
                Ok(solid) => solid,
                Err(e) => {
                    debug!(feature = index, error = %e, "footprint not solidified");
                    counts.reject("buildings", index, DropReason::Degenerate);
                    continue;
                }
            };
            let clipped = self.clipper.clip(&solid);
            if clipped.is_empty() {
                counts.reject("buildings", index, DropReason::ClippedAway);
                continue;
            }
            out.append(&clipped);
            counts.produced += 1;
        }
        out
    }
}

/// Runs tiles against one configuration and one boolean engine.
#[derive(Debug)]
pub struct TileRun<'c> {
    config: &'c PipelineConfig,
    engine: CsgEngine,
}

impl<'c> TileRun<'c> {
    pub fn new(config: &'c PipelineConfig) -> Result<Self, PipelineError> {
        Self::with_engine(config, CsgEngine::default())
    }

    pub fn with_engine(config: &'c PipelineConfig, engine: CsgEngine) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &PipelineConfig {
        self.config
    }

    #[instrument(skip_all, fields(tile = %input.name))]
    pub fn run(&self, input: &TileInput) -> Result<TileOutput, PipelineError> {
        let started = Instant::now();
        let cfg = self.config;
        let mut summary = RunSummary::new(&input.name);

        info!(stage = "import", subdivisions = cfg.detail.surface_subdivisions, "building terrain surface");
        let surface = input.terrain.surface(cfg.detail.surface_subdivisions)?;
        let bounds = *surface.bounds();
        let tile = bounds.tile();
        let scale = PrintScale::new(tile.width(), cfg.output.width_mm)?;
        let spacing = cfg.detail.overlay_spacing.unwrap_or_else(|| surface.sample_spacing());
        debug!(
            triangles = surface.triangle_count(),
            spacing,
            factor = scale.factor(),
            "surface ready"
        );

        info!(stage = "extrude_base", thickness = cfg.base.thickness, "extruding base");
        let terrain = extrude_base(surface.mesh(), cfg.base.thickness)?;
        ensure_terrain(&terrain, "extrude_base")?;

        let cut_z = match cfg.base.cut {
            CutMode::Manual { elevation } => elevation,
            CutMode::Auto => {
                let (z, lowered) = auto_cut_elevation(bounds.min.z, bounds.max.z, cfg.base.thickness);
                if lowered {
                    summary
                        .warnings
                        .push(format!("base thinner than terrain relief; cut lowered to {z:.3}"));
                }
                z
            }
        };
        summary.cut_elevation = cut_z;
        info!(stage = "flat_bottom", cut_elevation = cut_z, "cutting flat bottom");
        let terrain = self.flat_bottom(terrain, cut_z, &mut summary)?;

        let overlay = Overlay {
            projector: SurfaceProjector::new(&surface, cfg.drape),
            clipper: BoundaryClipper::capped(tile),
            solidifier: Solidifier::default(),
            spacing,
        };

        let mut buildings = if cfg.buildings.enabled {
            info!(stage = "buildings", "building overlays");
            self.buildings(input, &surface, &overlay, &tile, &mut summary)
        } else {
            Mesh::new()
        };

        info!(stage = "roads", count = input.roads.len(), "draping roads");
        let mut roads = overlay.lines("roads", &input.roads, &cfg.roads.profile(), &mut summary.roads);
        info!(stage = "trails", count = input.trails.len(), "draping trails");
        let mut trails = overlay.lines("trails", &input.trails, &cfg.trails.profile(), &mut summary.trails);

        let mut road_labels = if cfg.labels.enabled && !input.roads.is_empty() {
            info!(stage = "labels", "placing road labels");
            self.labels(input, &overlay, &tile, &mut summary)
        } else {
            Mesh::new()
        };

        let mut terrain = self.deboss(terrain, input, &tile, &scale, &mut summary)?;
        terrain = self.notches(terrain, &tile, &scale, &mut summary)?;
        terrain = self.mounting_holes(terrain, &tile, &scale, &mut summary)?;
        terrain = self.repair(terrain, &mut summary)?;

        let factor = scale.factor();
        info!(stage = "scale", factor, width_mm = cfg.output.width_mm, "scaling to print size");
        for mesh in [&mut terrain, &mut buildings, &mut roads, &mut trails, &mut road_labels] {
            mesh.scale_uniform(factor);
        }

        summary.vertices = terrain.vertex_count();
        summary.faces = terrain.face_count();
        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        let cuts = summary.cuts.total();
        info!(
            elapsed_ms = summary.elapsed_ms,
            faces = summary.faces,
            cuts = cuts.attempts,
            cut_failures = cuts.failures,
            roads = summary.roads.produced,
            labels = summary.labels.produced,
            "tile complete"
        );

        Ok(TileOutput {
            name: input.name.clone(),
            terrain,
            buildings,
            roads,
            trails,
            road_labels,
            summary,
        })
    }

    fn repair(&self, terrain: Mesh, summary: &mut RunSummary) -> Result<Mesh, PipelineError> {
        let diagonal = terrain
            .bounds()
            .ok_or(PipelineError::TerrainDestroyed { stage: "repair" })?
            .diagonal();
        let eps = Tolerance::default().plane_eps(diagonal);
        info!(stage = "repair", eps, "closing terrain seams");
        let (terrain, report) = repair_solid(&terrain, eps);
        if !report.audit.is_closed() {
            summary.warnings.push(format!(
                "terrain still open after repair: {} boundary, {} non-manifold edges",
                report.audit.boundary_edges, report.audit.non_manifold_edges
            ));
        }
        summary.repair = report;
        ensure_terrain(&terrain, "repair")?;
        Ok(terrain)
    }

    fn flat_bottom(&self, terrain: Mesh, cut_z: f64, summary: &mut RunSummary) -> Result<Mesh, PipelineError> {
        let bounds = terrain
            .bounds()
            .ok_or(PipelineError::TerrainDestroyed { stage: "extrude_base" })?;
        let cutter = flat_bottom_cutter(&bounds, cut_z, self.config.base.min_cutter_height);
        let (terrain, tally) = self.engine.apply_cutters(terrain, [cutter], "flat_bottom");
        summary.cuts.flat_bottom = tally;
        ensure_terrain(&terrain, "flat_bottom")?;
        Ok(terrain)
    }

    fn buildings(
        &self,
        input: &TileInput,
        surface: &HeightSurface,
        overlay: &Overlay<'_>,
        tile: &TileRect,
        summary: &mut RunSummary,
    ) -> Mesh {
        match &self.config.buildings.source {
            BuildingSource::Footprints { height, depth } => {
                overlay.footprints(&input.buildings, *height, *depth, &mut summary.buildings)
            }
            BuildingSource::CityJson { lod, penetration_depth } => {
                let Some(city) = &input.city_json else {
                    warn!("CityJSON buildings enabled but no dataset supplied");
                    summary.warnings.push("no CityJSON dataset for this tile".into());
                    return Mesh::new();
                };
                let document = match CityJsonDocument::from_value(&city.document, lod) {
                    Ok(document) => document,
                    Err(e) => {
                        warn!(error = %e, "CityJSON dataset skipped");
                        summary.warnings.push(e.to_string());
                        return Mesh::new();
                    }
                };
                let counts = &mut summary.buildings;
                counts.attempted = document.buildings.len();
                let selected = document.select(&city.offset, tile).len();
                counts.dropped = counts.attempted - selected;
                let mesh = document.building_mesh(&city.offset, tile);
                if mesh.is_empty() {
                    return mesh;
                }
                let aligner = self.config.cityjson.aligner(*penetration_depth);
                let (mesh, report) = aligner.process(&mesh, surface, tile);
                summary.alignment_offset = report.offset.filter(|_| report.applied);
                summary.warnings.extend(report.diagnostics.warnings);
                if mesh.is_empty() {
                    summary.buildings.dropped = summary.buildings.attempted;
                } else {
                    summary.buildings.produced = selected;
                }
                mesh
            }
        }
    }

    fn labels(&self, input: &TileInput, overlay: &Overlay<'_>, tile: &TileRect, summary: &mut RunSummary) -> Mesh {
        let (names, offset) = if input.road_names.is_empty() {
            (&input.roads, CoordinateOffset::default())
        } else {
            (&input.road_names, input.name_offset())
        };
        let placer = LabelPlacer::new(self.config.labels.settings);
        let placement = placer.place(names, &offset, tile);
        let counts = &mut summary.labels;
        counts.attempted = placement.accepted.len() + placement.rejected.len();
        for (name, reason) in &placement.rejected {
            counts.dropped += 1;
            debug!(name = %name, ?reason, "label rejected");
        }
        let road = self.config.roads.profile();
        let mut out = Mesh::new();
        for (index, label) in placement.accepted.iter().enumerate() {
            match placer.label_solid(label, &overlay.projector, &road, tile, overlay.spacing) {
                Ok(solid) if !solid.is_empty() => {
                    out.append(&solid);
                    counts.produced += 1;
                }
                Ok(_) => counts.reject("labels", index, DropReason::ClippedAway),
                Err(e) => {
                    debug!(label = %label.text, error = %e, "label solid failed");
                    counts.reject("labels", index, DropReason::Degenerate);
                }
            }
        }
        out
    }

    fn deboss(
        &self,
        terrain: Mesh,
        input: &TileInput,
        tile: &TileRect,
        scale: &PrintScale,
        summary: &mut RunSummary,
    ) -> Result<Mesh, PipelineError> {
        let cfg = &self.config.deboss;
        if !cfg.enabled {
            return Ok(terrain);
        }
        let text = cfg.text.clone().unwrap_or_else(|| input.name.clone());
        let depth = scale.mm_to_model(cfg.depth_mm);
        let bounds = terrain
            .bounds()
            .ok_or(PipelineError::TerrainDestroyed { stage: "deboss" })?;
        info!(stage = "deboss", text = %text, depth, north_arrow = cfg.north_arrow, "debossing");
        let plan = deboss_plan(&text, &bounds, tile.width(), depth, cfg.north_arrow)?;
        let cutters = plan.into_iter().flat_map(|glyph| glyph.into_cutters(&self.engine));
        let (terrain, tally) = self.engine.apply_cutters(terrain, cutters, "deboss");
        summary.cuts.deboss = tally;
        ensure_terrain(&terrain, "deboss")?;
        Ok(terrain)
    }

    fn notches(
        &self,
        terrain: Mesh,
        tile: &TileRect,
        scale: &PrintScale,
        summary: &mut RunSummary,
    ) -> Result<Mesh, PipelineError> {
        let cfg = &self.config.notches;
        if !cfg.enabled {
            return Ok(terrain);
        }
        let settings = NotchSettings {
            size: scale.mm_to_model(cfg.size_mm),
            depth: scale.mm_to_model(cfg.depth_mm),
            position_pct: cfg.position_pct,
            edge_inset_pct: cfg.edge_inset_pct,
        };
        let min_z = terrain
            .bounds()
            .ok_or(PipelineError::TerrainDestroyed { stage: "notches" })?
            .min
            .z;
        let (z0, z1) = notch_z_range(min_z, settings.depth);
        info!(stage = "notches", size = settings.size, depth = settings.depth, "cutting alignment notches");
        let plan = notch_plan(tile, &settings);
        let cutters = plan.iter().filter_map(|spec| match spec.cutter(z0, z1) {
            Ok(cutter) => Some(cutter),
            Err(e) => {
                warn!(notch = %spec.name(), error = %e, "notch cutter not built");
                None
            }
        });
        let (terrain, tally) = self.engine.apply_cutters(terrain, cutters, "notches");
        summary.cuts.notches = tally;
        ensure_terrain(&terrain, "notches")?;
        Ok(terrain)
    }

    fn mounting_holes(
        &self,
        terrain: Mesh,
        tile: &TileRect,
        scale: &PrintScale,
        summary: &mut RunSummary,
    ) -> Result<Mesh, PipelineError> {
        let cfg = &self.config.mounting_holes;
        if !cfg.enabled {
            return Ok(terrain);
        }
        let diameter = scale.mm_to_model(cfg.diameter_mm);
        let depth = scale.mm_to_model(self.config.notches.depth_mm);
        let min_z = terrain
            .bounds()
            .ok_or(PipelineError::TerrainDestroyed { stage: "mounting_holes" })?
            .min
            .z;
        let (z0, z1) = hole_z_range(min_z, depth);
        info!(stage = "mounting_holes", diameter, depth, "drilling mounting holes");
        let cutters = hole_centers(tile, cfg.corner_inset_pct)
            .into_iter()
            .map(|c| hole_cutter(c, diameter, z0, z1, cfg.segments));
        let (terrain, tally) = self.engine.apply_cutters(terrain, cutters, "mounting_holes");
        summary.cuts.mounting_holes = tally;
        ensure_terrain(&terrain, "mounting_holes")?;
        Ok(terrain)
    }
}
