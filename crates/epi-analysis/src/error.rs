use std::path::PathBuf;

use thiserror::Error;

/// Failures while decoding a trial log or aggregating a batch.
///
/// Every variant is fatal for the batch that produced it.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no end-of-run marker line found in log")]
    MissingMarker,

    #[error("log ended before {expected}")]
    Truncated { expected: &'static str },

    #[error("unexpected key '{found}' (expected '{expected}')")]
    UnexpectedKey {
        expected: &'static str,
        found: String,
    },

    #[error("malformed value for '{key}': {value}")]
    MalformedValue { key: String, value: String },

    #[error("end-of-run payload is empty")]
    EmptyPayload,

    #[error("end-of-run payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("summary JSON: {0}")]
    SummaryJson(#[source] serde_json::Error),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("cannot aggregate an empty batch")]
    EmptyBatch,

    #[error("chart rendering requires a time-series summary")]
    NotSeries,

    #[error("chart rendering failed: {0}")]
    Plot(String),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AnalysisError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
