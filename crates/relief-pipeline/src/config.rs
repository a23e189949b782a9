//! Pipeline configuration.
//!
//! Every section deserializes with defaults, so a config file only needs
//! the options it changes. Lengths are model units unless the field name
//! ends in `_mm`.

use relief_ops::{CityJsonAligner, DrapeSettings, LabelSettings, LodChoice, Profile};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Deepest supported grid refinement.
pub const MAX_SUBDIVISIONS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub output: OutputConfig,
    pub detail: DetailConfig,
    pub base: BaseConfig,
    pub deboss: DebossConfig,
    pub notches: NotchConfig,
    pub mounting_holes: HoleConfig,
    pub buildings: BuildingConfig,
    pub roads: RoadConfig,
    pub trails: RoadConfig,
    pub labels: LabelConfig,
    pub drape: DrapeSettings,
    pub cityjson: CityJsonConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Printed width of the tile.
    pub width_mm: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { width_mm: 200.0 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailConfig {
    /// Bilinear refinement levels applied to height grids.
    pub surface_subdivisions: u32,
    /// Overlay densify spacing; the surface sample spacing when unset.
    pub overlay_spacing: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CutMode {
    /// Flatten the whole underside at the highest point of the extruded base.
    Auto,
    Manual { elevation: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    pub thickness: f64,
    pub cut: CutMode,
    pub min_cutter_height: f64,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            thickness: 7000.0,
            cut: CutMode::Auto,
            min_cutter_height: 50_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebossConfig {
    pub enabled: bool,
    pub depth_mm: f64,
    pub north_arrow: bool,
    /// Text to cut; the tile name when unset.
    pub text: Option<String>,
}

impl Default for DebossConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            depth_mm: 1.0,
            north_arrow: true,
            text: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotchConfig {
    pub enabled: bool,
    pub size_mm: f64,
    pub depth_mm: f64,
    pub position_pct: f64,
    pub edge_inset_pct: f64,
}

impl Default for NotchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size_mm: 5.0,
            depth_mm: 3.0,
            position_pct: 25.0,
            edge_inset_pct: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoleConfig {
    pub enabled: bool,
    pub diameter_mm: f64,
    pub corner_inset_pct: f64,
    pub segments: usize,
}

impl Default for HoleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            diameter_mm: 3.0,
            corner_inset_pct: 10.0,
            segments: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildingSource {
    /// Extrude 2D footprints: `height` above and `depth` below the drape.
    Footprints { height: f64, depth: f64 },
    /// Import a 3D dataset and align it to the terrain.
    CityJson {
        #[serde(default)]
        lod: LodChoice,
        penetration_depth: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingConfig {
    pub enabled: bool,
    pub source: BuildingSource,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            source: BuildingSource::Footprints {
                height: 12.0,
                depth: 10.0,
            },
        }
    }
}

/// Cross-section of a swept line overlay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadConfig {
    pub width: f64,
    /// Top of the road above the drape.
    pub height: f64,
    /// Bottom of the road below the drape.
    pub depth: f64,
}

impl RoadConfig {
    pub fn roads() -> Self {
        Self {
            width: 40.0,
            height: 1.5,
            depth: 20.0,
        }
    }

    pub fn trails() -> Self {
        Self {
            width: 10.0,
            height: 1.0,
            depth: 10.0,
        }
    }

    pub fn profile(&self) -> Profile {
        Profile {
            width: self.width,
            above: self.height,
            below: self.depth,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: LabelSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CityJsonConfig {
    pub deadband: f64,
    pub mismatch_threshold: f64,
    pub lift_margin: f64,
    pub contact_tolerance: f64,
}

impl Default for CityJsonConfig {
    fn default() -> Self {
        let aligner = CityJsonAligner::default();
        Self {
            deadband: aligner.deadband,
            mismatch_threshold: aligner.mismatch_threshold,
            lift_margin: aligner.lift_margin,
            contact_tolerance: aligner.contact_tolerance,
        }
    }
}

impl CityJsonConfig {
    pub fn aligner(&self, penetration_depth: f64) -> CityJsonAligner {
        CityJsonAligner {
            deadband: self.deadband,
            mismatch_threshold: self.mismatch_threshold,
            lift_margin: self.lift_margin,
            penetration_depth,
            contact_tolerance: self.contact_tolerance,
        }
    }
}

fn invalid(reason: impl Into<String>) -> PipelineError {
    PipelineError::InvalidConfig { reason: reason.into() }
}

fn positive(name: &str, value: f64) -> Result<(), PipelineError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be positive, got {value}")))
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), PipelineError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must not be negative, got {value}")))
    }
}

fn in_range(name: &str, value: f64, lo: f64, hi: f64) -> Result<(), PipelineError> {
    if (lo..=hi).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be within {lo}..={hi}, got {value}")))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            detail: DetailConfig::default(),
            base: BaseConfig::default(),
            deboss: DebossConfig::default(),
            notches: NotchConfig::default(),
            mounting_holes: HoleConfig::default(),
            buildings: BuildingConfig::default(),
            roads: RoadConfig::roads(),
            trails: RoadConfig::trails(),
            labels: LabelConfig::default(),
            drape: DrapeSettings::default(),
            cityjson: CityJsonConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        positive("output.width_mm", self.output.width_mm)?;
        if self.detail.surface_subdivisions > MAX_SUBDIVISIONS {
            return Err(invalid(format!(
                "detail.surface_subdivisions must be at most {MAX_SUBDIVISIONS}, got {}",
                self.detail.surface_subdivisions
            )));
        }
        if let Some(spacing) = self.detail.overlay_spacing {
            positive("detail.overlay_spacing", spacing)?;
        }
        positive("base.thickness", self.base.thickness)?;
        positive("base.min_cutter_height", self.base.min_cutter_height)?;
        if let CutMode::Manual { elevation } = self.base.cut {
            if !elevation.is_finite() {
                return Err(invalid("base.cut.elevation must be finite"));
            }
        }
        if self.deboss.enabled {
            positive("deboss.depth_mm", self.deboss.depth_mm)?;
        }
        if self.notches.enabled {
            positive("notches.size_mm", self.notches.size_mm)?;
            positive("notches.depth_mm", self.notches.depth_mm)?;
            in_range("notches.position_pct", self.notches.position_pct, 5.0, 45.0)?;
            in_range("notches.edge_inset_pct", self.notches.edge_inset_pct, 0.0, 100.0)?;
        }
        if self.mounting_holes.enabled {
            positive("mounting_holes.diameter_mm", self.mounting_holes.diameter_mm)?;
            in_range("mounting_holes.corner_inset_pct", self.mounting_holes.corner_inset_pct, 5.0, 25.0)?;
            if self.mounting_holes.segments < 3 {
                return Err(invalid("mounting_holes.segments must be at least 3"));
            }
        }
        if self.buildings.enabled {
            match &self.buildings.source {
                BuildingSource::Footprints { height, depth } => {
                    positive("buildings.height", *height)?;
                    non_negative("buildings.depth", *depth)?;
                }
                BuildingSource::CityJson { penetration_depth, .. } => {
                    non_negative("buildings.penetration_depth", *penetration_depth)?;
                }
            }
        }
        for (name, road) in [("roads", &self.roads), ("trails", &self.trails)] {
            positive(&format!("{name}.width"), road.width)?;
            non_negative(&format!("{name}.height"), road.height)?;
            non_negative(&format!("{name}.depth"), road.depth)?;
            positive(&format!("{name}.height + depth"), road.height + road.depth)?;
        }
        if self.labels.enabled {
            positive("labels.size", self.labels.settings.size)?;
            non_negative("labels.height", self.labels.settings.height)?;
            non_negative("labels.min_length", self.labels.settings.min_length)?;
            non_negative("labels.clearance", self.labels.settings.clearance)?;
        }
        non_negative("drape.lift_margin", self.drape.lift_margin)?;
        non_negative("drape.prune_margin", self.drape.prune_margin)?;
        non_negative("cityjson.deadband", self.cityjson.deadband)?;
        Ok(())
    }
}
