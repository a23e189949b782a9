//! Fluent builder for single-tile scenarios.

use relief_kernel::{Scripted, ScriptedSolver};
use relief_ops::CsgEngine;
use relief_pipeline::{PipelineConfig, TerrainSource, TileInput, TileOutput, TileRun};
use relief_types::VectorFeature;

use crate::helpers::{small_config, HarnessError};
use crate::report::TileReport;

/// Which boolean engine a scenario runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Solvers {
    /// Exact solver with fast fallback.
    Real,
    /// Both solvers fail every call.
    Failing,
    /// Exact fails, fallback returns the target unchanged.
    FallbackOnly,
}

impl Solvers {
    fn engine(self) -> CsgEngine {
        match self {
            Solvers::Real => CsgEngine::default(),
            Solvers::Failing => CsgEngine::new(
                Box::new(ScriptedSolver::new("exact", Scripted::Fail)),
                Box::new(ScriptedSolver::new("fast", Scripted::Fail)),
            ),
            Solvers::FallbackOnly => CsgEngine::new(
                Box::new(ScriptedSolver::new("exact", Scripted::Fail)),
                Box::new(ScriptedSolver::new("fast", Scripted::Pass)),
            ),
        }
    }
}

pub struct Scenario {
    pub input: TileInput,
    pub config: PipelineConfig,
    pub solvers: Solvers,
}

impl Scenario {
    /// A scenario on `terrain` with [`small_config`].
    pub fn new(name: &str, terrain: TerrainSource) -> Self {
        Self {
            input: TileInput::new(name, terrain),
            config: small_config(),
            solvers: Solvers::Real,
        }
    }

    pub fn configure(mut self, f: impl FnOnce(&mut PipelineConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn solvers(mut self, solvers: Solvers) -> Self {
        self.solvers = solvers;
        self
    }

    pub fn road(mut self, feature: VectorFeature) -> Self {
        self.input.roads.push(feature);
        self
    }

    pub fn trail(mut self, feature: VectorFeature) -> Self {
        self.input.trails.push(feature);
        self
    }

    pub fn footprint(mut self, feature: VectorFeature) -> Self {
        self.input.buildings.push(feature);
        self
    }

    pub fn road_name(mut self, feature: VectorFeature) -> Self {
        self.input.road_names.push(feature);
        self
    }

    pub fn run(&self) -> Result<TileOutput, HarnessError> {
        let runner = TileRun::with_engine(&self.config, self.solvers.engine())?;
        Ok(runner.run(&self.input)?)
    }

    /// Run and build a report; the report text is printed so it shows up
    /// in the output of a failing test.
    pub fn run_with_report(&self) -> Result<(TileOutput, TileReport), HarnessError> {
        let output = self.run()?;
        let report = TileReport::new(&output);
        println!("{report}");
        Ok((output, report))
    }
}
