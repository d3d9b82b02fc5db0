use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Instant;

use chrono::Utc;
use epi_analysis::{aggregate, aggregate_timing, parse_log, BatchReport, RunTimingStats, TrialResult};
use tracing::{debug, info, warn};

use crate::config::BatchConfig;
use crate::error::BatchError;

/// One launch of the simulation inside a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialSpec {
    pub trial_index: usize,
    pub sim_args: Vec<String>,
}

impl TrialSpec {
    /// `run00.log`, `run01.log`, ... (at least two digits).
    pub fn log_file_name(&self) -> String {
        format!("run{:02}.log", self.trial_index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub batch_dir: PathBuf,
    pub results: Vec<TrialResult>,
    pub timing: RunTimingStats,
    pub total_seconds: f64,
}

impl BatchOutcome {
    /// Aggregates the collected results into a report.
    pub fn summarize(
        &self,
        sim_command: &[String],
        sim_args: &[String],
    ) -> Result<BatchReport, BatchError> {
        let summary = aggregate(&self.results)?;
        Ok(BatchReport {
            num_trials: self.results.len(),
            sim_command: sim_command.to_vec(),
            sim_args: sim_args.to_vec(),
            batch_dir: self.batch_dir.clone(),
            summary,
            timing: self.timing.clone(),
            total_seconds: self.total_seconds,
            created_at: Utc::now().to_rfc3339(),
        })
    }
}

/// Runs the external simulation repeatedly and decodes each trial's log.
#[derive(Debug, Clone)]
pub struct TrialExecutor {
    config: BatchConfig,
}

impl TrialExecutor {
    pub fn new(config: BatchConfig) -> Result<Self, BatchError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Full command line for one trial.
    pub fn command_line(&self, sim_args: &[String]) -> Vec<String> {
        self.config
            .sim_command
            .iter()
            .chain(sim_args)
            .cloned()
            .collect()
    }

    /// Runs `num_trials` trials one after another in a fresh batch directory.
    ///
    /// The first failing trial aborts the batch.
    pub fn run_batch(
        &self,
        num_trials: usize,
        sim_args: &[String],
    ) -> Result<BatchOutcome, BatchError> {
        if num_trials == 0 {
            return Err(BatchError::InvalidConfig(
                "number of trials must be at least 1".to_string(),
            ));
        }
        let total = Instant::now();
        let batch_dir = create_batch_dir(&self.config.log_root)?;
        info!(
            num_trials,
            sim_args = %shell_join(sim_args),
            batch_dir = %batch_dir.display(),
            "running simulation batch"
        );

        let mut results: Vec<TrialResult> = Vec::with_capacity(num_trials);
        let mut run_times = Vec::with_capacity(num_trials);
        for trial_index in 0..num_trials {
            let spec = TrialSpec {
                trial_index,
                sim_args: sim_args.to_vec(),
            };
            let (result, elapsed) = self.run_trial(&batch_dir, &spec)?;
            if let Some(first) = results.first() {
                first
                    .check_compatible(&result)
                    .map_err(|source| BatchError::Incompatible {
                        trial: trial_index,
                        source,
                    })?;
            }
            results.push(result);
            run_times.push(elapsed);
        }

        let timing = aggregate_timing(&run_times)?;
        let total_seconds = total.elapsed().as_secs_f64();
        info!(num_trials, total_secs = total_seconds, "batch finished");
        Ok(BatchOutcome {
            batch_dir,
            results,
            timing,
            total_seconds,
        })
    }

    /// Runs one trial, leaving its log in `batch_dir`. Returns the decoded
    /// result and the elapsed wall-clock seconds.
    pub fn run_trial(
        &self,
        batch_dir: &Path,
        spec: &TrialSpec,
    ) -> Result<(TrialResult, f64), BatchError> {
        let trial = spec.trial_index;
        let log_path = batch_dir.join(spec.log_file_name());
        let log = fs::File::create(&log_path).map_err(|e| BatchError::io(&log_path, e))?;
        let log_err = log.try_clone().map_err(|e| BatchError::io(&log_path, e))?;

        let command_line = shell_join(&self.command_line(&spec.sim_args));
        let (program, leading) = self
            .config
            .sim_command
            .split_first()
            .ok_or_else(|| BatchError::InvalidConfig("simulation command is empty".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(leading)
            .args(&spec.sim_args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        debug!(trial, command = %command_line, log = %log_path.display(), "spawning simulation");
        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| BatchError::Spawn {
            trial,
            command: command_line.clone(),
            source,
        })?;
        drop(cmd);
        let status = self.wait_for_exit(&mut child, trial, &log_path)?;
        let elapsed = started.elapsed().as_secs_f64();
        info!(trial, elapsed_secs = elapsed, "trial done");
        if !status.success() {
            debug!(trial, %status, "simulation exited unsuccessfully");
        }

        let bytes = fs::read(&log_path).map_err(|e| BatchError::io(&log_path, e))?;
        let result =
            parse_log(&String::from_utf8_lossy(&bytes)).map_err(|source| BatchError::Parse {
                trial,
                log_path: log_path.clone(),
                source,
            })?;
        debug!(trial, shape = result.shape_name(), "extracted stats");
        Ok((result, elapsed))
    }

    fn wait_for_exit(
        &self,
        child: &mut Child,
        trial: usize,
        log_path: &Path,
    ) -> Result<ExitStatus, BatchError> {
        let wait_err = |source: std::io::Error| BatchError::Wait { trial, source };
        let Some(limit) = self.config.timeout else {
            return child.wait().map_err(wait_err);
        };
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(wait_err)? {
                return Ok(status);
            }
            if started.elapsed() >= limit {
                warn!(trial, limit_secs = limit.as_secs_f64(), "simulation timed out, killing it");
                if let Err(e) = child.kill() {
                    warn!(trial, error = %e, "failed to kill timed-out simulation");
                }
                if let Err(e) = child.wait() {
                    warn!(trial, error = %e, "failed to reap timed-out simulation");
                }
                return Err(BatchError::Timeout {
                    trial,
                    limit,
                    log_path: log_path.to_path_buf(),
                });
            }
            thread::sleep(self.config.poll_interval);
        }
    }
}

/// Creates `batch-<timestamp>` under `root`, adding a numeric suffix when a
/// directory of that name already exists. Existing directories are never
/// reused.
fn create_batch_dir(root: &Path) -> Result<PathBuf, BatchError> {
    fs::create_dir_all(root).map_err(|e| BatchError::io(root, e))?;
    let stamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    for attempt in 0..1000u32 {
        let name = if attempt == 0 {
            format!("batch-{}", stamp)
        } else {
            format!("batch-{}-{}", stamp, attempt)
        };
        let dir = root.join(name);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(BatchError::io(&dir, e)),
        }
    }
    Err(BatchError::InvalidConfig(format!(
        "no free batch directory name under {}",
        root.display()
    )))
}

pub(crate) fn shell_join(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| shell_quote(p))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:=,".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_names_are_zero_padded() {
        let spec = |trial_index| TrialSpec {
            trial_index,
            sim_args: vec![],
        };
        assert_eq!(spec(0).log_file_name(), "run00.log");
        assert_eq!(spec(7).log_file_name(), "run07.log");
        assert_eq!(spec(42).log_file_name(), "run42.log");
        assert_eq!(spec(123).log_file_name(), "run123.log");
    }

    #[test]
    fn batch_dirs_are_never_reused() {
        let root = tempfile::tempdir().expect("tempdir");
        let first = create_batch_dir(root.path()).expect("first");
        let second = create_batch_dir(root.path()).expect("second");
        assert_ne!(first, second);
        assert!(first.is_dir() && second.is_dir());
        let name = first.file_name().and_then(|s| s.to_str()).unwrap_or_default();
        assert!(name.starts_with("batch-"), "{}", name);
    }

    #[test]
    fn command_line_appends_sim_args() {
        let exec = TrialExecutor::new(BatchConfig::default()).expect("executor");
        let args = vec!["-for".to_string(), "800".to_string()];
        assert_eq!(
            exec.command_line(&args),
            vec!["java", "DiseaseSpread", "-for", "800"]
        );
    }

    #[test]
    fn shell_join_quotes_only_when_needed() {
        let parts = vec![
            "java".to_string(),
            "-flocking".to_string(),
            "2.500000".to_string(),
            "a b".to_string(),
            String::new(),
        ];
        assert_eq!(shell_join(&parts), "java -flocking 2.500000 'a b' ''");
    }

    #[test]
    fn zero_trials_is_invalid() {
        let exec = TrialExecutor::new(BatchConfig::default()).expect("executor");
        assert!(matches!(
            exec.run_batch(0, &[]).expect_err("should fail"),
            BatchError::InvalidConfig(_)
        ));
    }
}
