//! Sequential batch processing over many tiles.
//!
//! Tiles are loaded, processed and handed to the sink one at a time; at most
//! one tile's solids are alive at once. A failed tile is recorded and the
//! batch moves on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::input::TileInput;
use crate::run::{RunSummary, TileOutput, TileRun};

/// Cooperative cancellation flag, checked between tiles.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileOutcome {
    pub name: String,
    pub result: Result<RunSummary, PipelineError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub succeeded: usize,
    pub failed: usize,
    /// Set when the token stopped the batch before the input ran out.
    pub cancelled: bool,
    pub tiles: Vec<TileOutcome>,
}

impl BatchReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            succeeded: 0,
            failed: 0,
            cancelled: false,
            tiles: Vec::new(),
        }
    }

    fn record(&mut self, name: String, result: Result<RunSummary, PipelineError>) {
        match &result {
            Ok(_) => self.succeeded += 1,
            Err(_) => self.failed += 1,
        }
        self.tiles.push(TileOutcome { name, result });
    }
}

/// Run every tile yielded by `tiles`, passing each output to `on_tile`
/// before the next tile is loaded.
///
/// A loader error, a run error and a sink error each count as one failed
/// tile. Configuration errors abort before any tile is touched.
#[instrument(skip_all)]
pub fn run_batch<I, F>(
    config: &PipelineConfig,
    tiles: I,
    cancel: &CancelToken,
    mut on_tile: F,
) -> Result<BatchReport, PipelineError>
where
    I: IntoIterator<Item = Result<TileInput, PipelineError>>,
    F: FnMut(&TileOutput) -> Result<(), PipelineError>,
{
    let runner = TileRun::new(config)?;
    let mut report = BatchReport::new();
    info!(run_id = %report.run_id, "batch started");

    let mut tiles = tiles.into_iter();
    loop {
        if cancel.is_cancelled() {
            warn!(done = report.tiles.len(), "batch cancelled");
            report.cancelled = true;
            break;
        }
        let Some(next) = tiles.next() else {
            break;
        };
        let input = match next {
            Ok(input) => input,
            Err(e) => {
                error!(error = %e, "tile not loaded");
                let name = match &e {
                    PipelineError::Load { tile, .. } => tile.clone(),
                    _ => format!("#{}", report.tiles.len()),
                };
                report.record(name, Err(e));
                continue;
            }
        };
        let result = runner.run(&input).and_then(|output| {
            on_tile(&output)?;
            Ok(output.summary)
        });
        if let Err(e) = &result {
            error!(tile = %input.name, error = %e, "tile failed");
        }
        report.record(input.name, result);
    }

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        cancelled = report.cancelled,
        "batch finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CutMode;
    use crate::input::TerrainSource;
    use relief_kernel::HeightGrid;
    use relief_types::Point2;

    fn tile(name: &str) -> TileInput {
        let grid = HeightGrid::from_fn(Point2::origin(), 10.0, 4, 4, |x, y| 1.0 + 0.01 * (x + y)).unwrap();
        TileInput::new(name, TerrainSource::Grid(grid))
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::new();
        config.base.thickness = 5.0;
        config.base.cut = CutMode::Manual { elevation: 0.0 };
        config.deboss.enabled = false;
        config
    }

    #[test]
    fn loader_errors_do_not_stop_the_batch() {
        let inputs = vec![
            Ok(tile("a")),
            Err(PipelineError::Load {
                tile: "b".into(),
                reason: "missing raster".into(),
            }),
            Ok(tile("c")),
        ];
        let mut seen = Vec::new();
        let report = run_batch(&config(), inputs, &CancelToken::new(), |out| {
            seen.push(out.name.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(seen, vec!["a", "c"]);
        assert_eq!(report.tiles[1].name, "b");
    }

    #[test]
    fn cancel_is_checked_before_each_tile() {
        let cancel = CancelToken::new();
        let inputs = vec![Ok(tile("a")), Ok(tile("b")), Ok(tile("c"))];
        let handle = cancel.clone();
        let report = run_batch(&config(), inputs, &cancel, |_| {
            handle.cancel();
            Ok(())
        })
        .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.tiles.len(), 1);
    }

    #[test]
    fn sink_errors_fail_the_tile() {
        let inputs = vec![Ok(tile("a"))];
        let report = run_batch(&config(), inputs, &CancelToken::new(), |_| {
            Err(PipelineError::Sink {
                reason: "disk full".into(),
            })
        })
        .unwrap();
        assert_eq!(report.failed, 1);
        assert!(matches!(report.tiles[0].result, Err(PipelineError::Sink { .. })));
    }
}
