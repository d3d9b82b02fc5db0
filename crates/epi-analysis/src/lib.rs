//! Decoding and aggregation of epidemic simulation trial logs.

pub mod aggregate;
pub mod error;
pub mod parse;
pub mod plot;
pub mod report;
pub mod result;

pub use aggregate::{aggregate, aggregate_timing, BatchSummary, FieldStats, RunTimingStats, SeriesCurve};
pub use error::AnalysisError;
pub use parse::{parse_log, parse_log_file, MIN_MARKER_LEN};
pub use plot::render_series_chart;
pub use report::{format_report, read_summary, write_summary, BatchReport, SUMMARY_FILE_NAME};
pub use result::{ScalarCounts, SeriesCounts, TrialResult};
