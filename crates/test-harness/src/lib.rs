//! Test harness for terrain-to-solid runs.
//!
//! Provides fixtures for scripting single-tile scenarios, oracles that
//! verify the produced solids, and plain-text reports for diagnostics.
//!
//! # Key Components
//!
//! - [`Scenario`]: Fluent builder around one tile run
//! - [`oracle`]: Verification functions returning pass/fail verdicts
//! - [`report`]: Structured text tile descriptions
//! - [`helpers`]: Terrain fixtures, feature builders, small configs
//! - [`assertions`]: Assertion helpers with diagnostics

pub mod assertions;
pub mod helpers;
pub mod oracle;
pub mod report;
pub mod scenario;

pub use helpers::HarnessError;
pub use oracle::OracleVerdict;
pub use report::TileReport;
pub use scenario::{Scenario, Solvers};
