use std::io;
use std::path::PathBuf;
use std::time::Duration;

use epi_analysis::AnalysisError;
use thiserror::Error;

/// Reasons a batch stops. None of them is retried: logs written so far stay
/// on disk and no partial summary is produced.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("invalid batch configuration: {0}")]
    InvalidConfig(String),

    #[error("trial {trial}: failed to start `{command}`: {source}")]
    Spawn {
        trial: usize,
        command: String,
        source: io::Error,
    },

    #[error("trial {trial}: waiting for the simulation failed: {source}")]
    Wait { trial: usize, source: io::Error },

    #[error(
        "trial {trial}: simulation still running after {:.1}s and was killed (log: {})",
        .limit.as_secs_f64(),
        .log_path.display()
    )]
    Timeout {
        trial: usize,
        limit: Duration,
        log_path: PathBuf,
    },

    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("trial {trial}: cannot decode {}: {source}", .log_path.display())]
    Parse {
        trial: usize,
        log_path: PathBuf,
        source: AnalysisError,
    },

    #[error("trial {trial}: result does not match earlier trials: {source}")]
    Incompatible { trial: usize, source: AnalysisError },

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("sweep config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

impl BatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Index of the trial that failed, when the failure belongs to one.
    pub fn trial(&self) -> Option<usize> {
        match self {
            BatchError::Spawn { trial, .. }
            | BatchError::Wait { trial, .. }
            | BatchError::Timeout { trial, .. }
            | BatchError::Parse { trial, .. }
            | BatchError::Incompatible { trial, .. } => Some(*trial),
            _ => None,
        }
    }

    /// Short machine-readable name of the failing stage.
    pub fn stage(&self) -> &'static str {
        match self {
            BatchError::InvalidConfig(_) | BatchError::Config { .. } => "config",
            BatchError::Spawn { .. } => "spawn",
            BatchError::Wait { .. } | BatchError::Timeout { .. } => "wait",
            BatchError::Io { .. } => "io",
            BatchError::Parse { .. } => "parse",
            BatchError::Incompatible { .. } | BatchError::Analysis(_) => "aggregate",
        }
    }
}
