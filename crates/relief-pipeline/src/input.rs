//! Data handed to a tile run by the loaders.

use relief_kernel::{HeightGrid, HeightSurface};
use relief_types::{CoordinateOffset, Mesh, Point2, VectorFeature};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerrainSource {
    Grid(HeightGrid),
    Mesh(Mesh),
}

impl TerrainSource {
    /// Build the queryable surface, refining grids by `subdivisions` levels.
    pub fn surface(&self, subdivisions: u32) -> Result<HeightSurface, PipelineError> {
        let surface = match self {
            TerrainSource::Grid(grid) => {
                let grid = if subdivisions > 0 {
                    grid.subdivide(subdivisions)
                } else {
                    grid.clone()
                };
                debug!(cols = grid.cols, rows = grid.rows, "height grid ready");
                HeightSurface::from_grid(&grid)?
            }
            TerrainSource::Mesh(mesh) => {
                if subdivisions > 0 {
                    debug!("subdivision applies to height grids only");
                }
                HeightSurface::from_mesh(mesh)?
            }
        };
        if surface.triangle_count() == 0 {
            return Err(PipelineError::EmptySurface);
        }
        Ok(surface)
    }
}

/// A CityJSON dataset and the planar shift into the terrain frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityJsonInput {
    pub document: serde_json::Value,
    #[serde(default)]
    pub offset: CoordinateOffset,
}

/// Everything one tile run consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileInput {
    pub name: String,
    pub terrain: TerrainSource,
    /// Building footprints in the terrain frame.
    #[serde(default)]
    pub buildings: Vec<VectorFeature>,
    #[serde(default)]
    pub city_json: Option<CityJsonInput>,
    /// Road lines in the terrain frame.
    #[serde(default)]
    pub roads: Vec<VectorFeature>,
    #[serde(default)]
    pub trails: Vec<VectorFeature>,
    /// Named road lines in their source frame. Matched to `roads` through
    /// the offset between the two datasets' bounding-box minima.
    #[serde(default)]
    pub road_names: Vec<VectorFeature>,
}

impl TileInput {
    pub fn new(name: impl Into<String>, terrain: TerrainSource) -> Self {
        Self {
            name: name.into(),
            terrain,
            buildings: Vec::new(),
            city_json: None,
            roads: Vec::new(),
            trails: Vec::new(),
            road_names: Vec::new(),
        }
    }

    /// Offset taking `road_names` into the frame of `roads`.
    pub fn name_offset(&self) -> CoordinateOffset {
        match (min_corner(&self.road_names), min_corner(&self.roads)) {
            (Some(source), Some(placed)) => CoordinateOffset::between(source, placed),
            _ => CoordinateOffset::default(),
        }
    }
}

fn min_corner(features: &[VectorFeature]) -> Option<Point2<f64>> {
    features
        .iter()
        .flat_map(VectorFeature::points)
        .fold(None, |acc: Option<Point2<f64>>, p| {
            Some(match acc {
                Some(m) => Point2::new(m.x.min(p.x), m.y.min(p.y)),
                None => *p,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_offset_matches_bounding_minima() {
        let mut input = TileInput::new(
            "t",
            TerrainSource::Grid(HeightGrid::from_fn(Point2::origin(), 1.0, 2, 2, |_, _| 0.0).unwrap()),
        );
        input.roads = vec![VectorFeature::polyline(vec![Point2::new(10.0, 20.0), Point2::new(30.0, 5.0)])];
        input.road_names = vec![VectorFeature::polyline(vec![Point2::new(1010.0, 2020.0), Point2::new(1030.0, 2005.0)])
            .with_name("Main Street")];
        let offset = input.name_offset();
        assert_eq!(offset.to_placed(&Point2::new(1010.0, 2020.0)), Point2::new(10.0, 20.0));
    }

    #[test]
    fn nodata_grid_is_an_empty_surface() {
        let grid = HeightGrid::from_fn(Point2::origin(), 1.0, 3, 3, |_, _| f64::NAN).unwrap();
        let err = TerrainSource::Grid(grid).surface(0);
        assert!(matches!(err, Err(PipelineError::EmptySurface) | Err(PipelineError::Surface(_))));
    }
}
