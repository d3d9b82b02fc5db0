//! Runs batches of the external epidemic simulation and reports on them.

pub mod config;
pub mod error;
pub mod executor;
pub mod sweep;

use std::path::PathBuf;

use epi_analysis::{render_series_chart, write_summary, BatchReport};
use tracing::{info, warn};

pub use config::{split_args, BatchConfig, DEFAULT_SIM_COMMAND};
pub use error::BatchError;
pub use executor::{BatchOutcome, TrialExecutor, TrialSpec};
pub use sweep::{expand_cases, run_sweep, Level, SweepCase, SweepConfig, SweepEvent, SweepOutcome};

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub num_trials: usize,
    pub sim_args: Vec<String>,
    /// Chart title; defaults to the argument string.
    pub title: Option<String>,
    pub fig_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct CompletedBatch {
    pub report: BatchReport,
    pub summary_path: PathBuf,
    pub chart_path: Option<PathBuf>,
}

/// Runs a batch, writes `summary.json` next to its logs and, for time-series
/// batches with a figure path, renders the chart.
pub fn run_and_report(
    executor: &TrialExecutor,
    request: &BatchRequest,
) -> Result<CompletedBatch, BatchError> {
    let outcome = executor.run_batch(request.num_trials, &request.sim_args)?;
    let report = outcome.summarize(&executor.config().sim_command, &request.sim_args)?;
    let summary_path = write_summary(&outcome.batch_dir, &report)?;
    info!(path = %summary_path.display(), "batch summary written");

    let chart_path = match &request.fig_path {
        Some(path) if report.summary.is_series() => {
            let title = request
                .title
                .clone()
                .unwrap_or_else(|| request.sim_args.join(" "));
            render_series_chart(&report.summary, &title, path)?;
            Some(path.clone())
        }
        Some(path) => {
            warn!(path = %path.display(), "scalar results have no time series; chart skipped");
            None
        }
        None => None,
    };

    Ok(CompletedBatch {
        report,
        summary_path,
        chart_path,
    })
}
