use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::result::{ScalarCounts, SeriesCounts, TrialResult};

/// Descriptive statistics of one scalar field across a batch.
///
/// `std` is the population standard deviation (divides by `N`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl FieldStats {
    pub fn from_values(values: &[f64]) -> Result<Self, AnalysisError> {
        if values.is_empty() {
            return Err(AnalysisError::EmptyBatch);
        }
        let n = values.len() as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Ok(Self {
            min,
            max,
            mean,
            std: variance.sqrt(),
        })
    }

    fn from_counts(values: impl Iterator<Item = i64>) -> Result<Self, AnalysisError> {
        let values: Vec<f64> = values.map(|v| v as f64).collect();
        Self::from_values(&values)
    }
}

/// Mean and standard deviation of one field at every sampled step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesCurve {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum BatchSummary {
    Scalar {
        alive: FieldStats,
        infected: FieldStats,
    },
    Series {
        step: Vec<i64>,
        alive: SeriesCurve,
        infected: SeriesCurve,
        /// Statistics over each trial's last sample.
        final_alive: FieldStats,
        final_infected: FieldStats,
    },
}

impl BatchSummary {
    pub fn is_series(&self) -> bool {
        matches!(self, BatchSummary::Series { .. })
    }

    /// The scalar statistics shown in the text report.
    pub fn headline(&self) -> (&FieldStats, &FieldStats) {
        match self {
            BatchSummary::Scalar { alive, infected } => (alive, infected),
            BatchSummary::Series {
                final_alive,
                final_infected,
                ..
            } => (final_alive, final_infected),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTimingStats {
    /// Wall-clock seconds per trial, in trial order.
    pub run_times: Vec<f64>,
    pub stats: FieldStats,
}

/// Aggregates a complete batch of trial results.
///
/// All results must share one shape, and series results one length.
pub fn aggregate(results: &[TrialResult]) -> Result<BatchSummary, AnalysisError> {
    let first = results.first().ok_or(AnalysisError::EmptyBatch)?;
    if let TrialResult::Series(head) = first {
        head.validate()?;
    }
    for other in &results[1..] {
        first.check_compatible(other)?;
    }

    match first {
        TrialResult::Scalar(_) => {
            let scalars: Vec<&ScalarCounts> = results
                .iter()
                .filter_map(|r| match r {
                    TrialResult::Scalar(s) => Some(s),
                    TrialResult::Series(_) => None,
                })
                .collect();
            Ok(BatchSummary::Scalar {
                alive: FieldStats::from_counts(scalars.iter().map(|s| s.alive))?,
                infected: FieldStats::from_counts(scalars.iter().map(|s| s.infected))?,
            })
        }
        TrialResult::Series(head) => {
            let series: Vec<&SeriesCounts> = results
                .iter()
                .filter_map(|r| match r {
                    TrialResult::Series(s) => Some(s),
                    TrialResult::Scalar(_) => None,
                })
                .collect();
            let finals = series
                .iter()
                .map(|s| s.last().ok_or(AnalysisError::EmptyPayload))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(BatchSummary::Series {
                step: head.step.clone(),
                alive: per_step_curve(&series, |s| &s.alive)?,
                infected: per_step_curve(&series, |s| &s.infected)?,
                final_alive: FieldStats::from_counts(finals.iter().map(|c| c.alive))?,
                final_infected: FieldStats::from_counts(finals.iter().map(|c| c.infected))?,
            })
        }
    }
}

fn per_step_curve<F>(series: &[&SeriesCounts], field: F) -> Result<SeriesCurve, AnalysisError>
where
    F: Fn(&SeriesCounts) -> &Vec<i64>,
{
    let num_samples = series.first().map(|s| s.num_samples()).unwrap_or(0);
    let mut mean = Vec::with_capacity(num_samples);
    let mut std = Vec::with_capacity(num_samples);
    for i in 0..num_samples {
        let stats = FieldStats::from_counts(series.iter().map(|s| field(*s)[i]))?;
        mean.push(stats.mean);
        std.push(stats.std);
    }
    Ok(SeriesCurve { mean, std })
}

pub fn aggregate_timing(run_times: &[f64]) -> Result<RunTimingStats, AnalysisError> {
    Ok(RunTimingStats {
        run_times: run_times.to_vec(),
        stats: FieldStats::from_values(run_times)?,
    })
}
