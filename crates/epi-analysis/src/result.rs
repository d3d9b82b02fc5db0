use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

pub const ALIVE_KEY: &str = "numAgentsAlive";
pub const INFECTED_KEY: &str = "numAgentsInfected";
pub const STEP_KEY: &str = "step";

/// End-of-run counts reported by older simulation builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalarCounts {
    #[serde(rename = "numAgentsAlive")]
    pub alive: i64,
    #[serde(rename = "numAgentsInfected")]
    pub infected: i64,
}

/// Per-step counts sampled over a whole run. All three vectors share one length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesCounts {
    pub step: Vec<i64>,
    #[serde(rename = "numAgentsAlive")]
    pub alive: Vec<i64>,
    #[serde(rename = "numAgentsInfected")]
    pub infected: Vec<i64>,
}

impl SeriesCounts {
    pub fn num_samples(&self) -> usize {
        self.step.len()
    }

    /// Fails when the three vectors differ in length or hold no samples.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.step.len() != self.alive.len() || self.step.len() != self.infected.len() {
            return Err(AnalysisError::ShapeMismatch(format!(
                "ragged series: {}={}, {}={}, {}={}",
                STEP_KEY,
                self.step.len(),
                ALIVE_KEY,
                self.alive.len(),
                INFECTED_KEY,
                self.infected.len()
            )));
        }
        if self.step.is_empty() {
            return Err(AnalysisError::EmptyPayload);
        }
        Ok(())
    }

    /// Counts at the last sampled step.
    pub fn last(&self) -> Option<ScalarCounts> {
        Some(ScalarCounts {
            alive: *self.alive.last()?,
            infected: *self.infected.last()?,
        })
    }
}

/// Decoded payload of one trial log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum TrialResult {
    Scalar(ScalarCounts),
    Series(SeriesCounts),
}

impl TrialResult {
    pub fn shape_name(&self) -> &'static str {
        match self {
            TrialResult::Scalar(_) => "scalar",
            TrialResult::Series(_) => "series",
        }
    }

    /// Fails unless `other` could be aggregated together with `self`.
    /// Series on either side must also be internally consistent.
    pub fn check_compatible(&self, other: &TrialResult) -> Result<(), AnalysisError> {
        match (self, other) {
            (TrialResult::Scalar(_), TrialResult::Scalar(_)) => Ok(()),
            (TrialResult::Series(a), TrialResult::Series(b)) => {
                a.validate()?;
                b.validate()?;
                if a.num_samples() == b.num_samples() {
                    Ok(())
                } else {
                    Err(AnalysisError::ShapeMismatch(format!(
                        "series length {} does not match {}",
                        b.num_samples(),
                        a.num_samples()
                    )))
                }
            }
            _ => Err(AnalysisError::ShapeMismatch(format!(
                "{} result mixed with {} result",
                other.shape_name(),
                self.shape_name()
            ))),
        }
    }
}
