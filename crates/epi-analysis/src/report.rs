use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{BatchSummary, FieldStats, RunTimingStats};
use crate::error::AnalysisError;
use crate::result::{ALIVE_KEY, INFECTED_KEY};

pub const SUMMARY_FILE_NAME: &str = "summary.json";

/// Everything recorded about one finished batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub num_trials: usize,
    pub sim_command: Vec<String>,
    pub sim_args: Vec<String>,
    pub batch_dir: PathBuf,
    pub summary: BatchSummary,
    pub timing: RunTimingStats,
    pub total_seconds: f64,
    pub created_at: String,
}

fn stats_line(label: &str, stats: &FieldStats) -> String {
    format!(
        "{}: min={:.6} max={:.6} mean={:.6} std={:.6}",
        label, stats.min, stats.max, stats.mean, stats.std
    )
}

/// Renders the console report printed after a batch.
pub fn format_report(report: &BatchReport) -> String {
    let mut out = String::new();
    let (alive, infected) = report.summary.headline();
    if let BatchSummary::Series { step, .. } = &report.summary {
        let _ = writeln!(
            out,
            "series: {} samples per trial, final-step statistics below",
            step.len()
        );
    }
    let _ = writeln!(out, "{}", stats_line(ALIVE_KEY, alive));
    let _ = writeln!(out, "{}", stats_line(INFECTED_KEY, infected));
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", stats_line("run_times", &report.timing.stats));
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "-> {} trials finished in {:.6} seconds",
        report.num_trials, report.total_seconds
    );
    out
}

/// Writes `summary.json` into `dir`, replacing any previous copy atomically.
pub fn write_summary(dir: &Path, report: &BatchReport) -> Result<PathBuf, AnalysisError> {
    let path = dir.join(SUMMARY_FILE_NAME);
    let bytes = serde_json::to_vec_pretty(report).map_err(AnalysisError::SummaryJson)?;
    atomic_write_bytes(&path, &bytes)?;
    debug!(path = %path.display(), "wrote batch summary");
    Ok(path)
}

pub fn read_summary(path: &Path) -> Result<BatchReport, AnalysisError> {
    let bytes = fs::read(path).map_err(|e| AnalysisError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(AnalysisError::SummaryJson)
}

fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<(), AnalysisError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AnalysisError::io(parent, e))?;
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}", name, std::process::id()));
    let write = || -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    };
    write().map_err(|e| {
        let _ = fs::remove_file(&tmp);
        AnalysisError::io(path, e)
    })
}
