//! Batches over a grid of simulation parameters.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::BatchError;
use crate::executor::TrialExecutor;
use crate::{run_and_report, BatchRequest, CompletedBatch};

/// A named setting of one sweep axis, e.g. `flocking=yes` meaning `2.5`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub label: String,
    pub value: f64,
}

impl Level {
    pub fn new(label: &str, value: f64) -> Self {
        Self {
            label: label.to_string(),
            value,
        }
    }
}

/// Sweep grid. Keys missing from a YAML file keep their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub num_trials: usize,
    pub num_steps: u64,
    pub diseases: Vec<String>,
    pub flocking: Vec<Level>,
    pub observability: Vec<Level>,
    /// Labelled symptom-tolerance values.
    pub paranoid: Vec<Level>,
    pub plots_dir: PathBuf,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            num_trials: 30,
            num_steps: 800,
            diseases: ["none", "cold", "malaria", "avian-flu"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            flocking: vec![Level::new("yes", 2.5), Level::new("no", 0.0)],
            observability: vec![Level::new("perfect", 1.0), Level::new("poor", 0.2)],
            paranoid: vec![Level::new("yes", 0.2), Level::new("no", 0.8)],
            plots_dir: PathBuf::from("plots"),
        }
    }
}

impl SweepConfig {
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let raw = fs::read_to_string(path).map_err(|e| BatchError::io(path, e))?;
        let cfg: SweepConfig = serde_yaml::from_str(&raw).map_err(|source| BatchError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        let mut problems = Vec::new();
        if self.num_trials == 0 {
            problems.push("num_trials must be at least 1");
        }
        if self.diseases.is_empty() {
            problems.push("diseases must not be empty");
        }
        if self.flocking.is_empty() {
            problems.push("flocking must not be empty");
        }
        if self.observability.is_empty() {
            problems.push("observability must not be empty");
        }
        if self.paranoid.is_empty() {
            problems.push("paranoid must not be empty");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(BatchError::InvalidConfig(problems.join("; ")))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepCase {
    pub sim_args: Vec<String>,
    pub title: String,
    pub fig_path: PathBuf,
}

/// Expands the grid, disease outermost and paranoia innermost.
pub fn expand_cases(cfg: &SweepConfig) -> Vec<SweepCase> {
    let mut cases = Vec::new();
    for disease in &cfg.diseases {
        for flocking in &cfg.flocking {
            for observability in &cfg.observability {
                for paranoid in &cfg.paranoid {
                    let sim_args = format!(
                        "-for {} -disease {} -flocking {:.6} -observability {:.6} -symptom-tolerance {:.6}",
                        cfg.num_steps, disease, flocking.value, observability.value, paranoid.value
                    )
                    .split_whitespace()
                    .map(str::to_string)
                    .collect();
                    let title = format!(
                        "disease={} flocking={} observability={} paranoid={}",
                        disease, flocking.label, observability.label, paranoid.label
                    );
                    let fig_path = cfg.plots_dir.join(format!(
                        "fig-disease={},flocking={},observability={},paranoid={}.png",
                        disease, flocking.label, observability.label, paranoid.label
                    ));
                    cases.push(SweepCase {
                        sim_args,
                        title,
                        fig_path,
                    });
                }
            }
        }
    }
    cases
}

#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub case: SweepCase,
    pub batch: CompletedBatch,
}

/// Runs one batch per case. `on_case` sees each case before it starts and
/// each outcome once it is written. The first failing batch stops the sweep.
pub fn run_sweep<F>(
    executor: &TrialExecutor,
    cfg: &SweepConfig,
    mut on_case: F,
) -> Result<Vec<SweepOutcome>, BatchError>
where
    F: FnMut(SweepEvent<'_>),
{
    cfg.validate()?;
    let cases = expand_cases(cfg);
    info!(cases = cases.len(), trials_per_case = cfg.num_trials, "starting sweep");
    let mut outcomes = Vec::with_capacity(cases.len());
    for (index, case) in cases.into_iter().enumerate() {
        on_case(SweepEvent::Started {
            index,
            case: &case,
        });
        let request = BatchRequest {
            num_trials: cfg.num_trials,
            sim_args: case.sim_args.clone(),
            title: Some(case.title.clone()),
            fig_path: Some(case.fig_path.clone()),
        };
        let batch = run_and_report(executor, &request)?;
        let outcome = SweepOutcome { case, batch };
        on_case(SweepEvent::Finished {
            index,
            outcome: &outcome,
        });
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

pub enum SweepEvent<'a> {
    Started { index: usize, case: &'a SweepCase },
    Finished {
        index: usize,
        outcome: &'a SweepOutcome,
    },
}
