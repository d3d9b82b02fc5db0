use std::path::PathBuf;
use std::time::Duration;

use crate::error::BatchError;

/// Command used to start the simulation when none is configured.
pub const DEFAULT_SIM_COMMAND: [&str; 2] = ["java", "DiseaseSpread"];

#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    /// Program and leading arguments; per-batch arguments are appended.
    pub sim_command: Vec<String>,
    /// Directory under which each batch creates its own `batch-*` directory.
    pub log_root: PathBuf,
    /// Kill a trial that runs longer than this. `None` waits forever.
    pub timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            sim_command: DEFAULT_SIM_COMMAND.iter().map(|s| s.to_string()).collect(),
            log_root: PathBuf::from("."),
            timeout: None,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl BatchConfig {
    pub fn with_sim_command(mut self, sim_command: Vec<String>) -> Self {
        self.sim_command = sim_command;
        self
    }

    pub fn with_log_root(mut self, log_root: impl Into<PathBuf>) -> Self {
        self.log_root = log_root.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        match self.sim_command.first() {
            None => Err(BatchError::InvalidConfig(
                "simulation command is empty".to_string(),
            )),
            Some(program) if program.trim().is_empty() => Err(BatchError::InvalidConfig(
                "simulation program name is blank".to_string(),
            )),
            Some(_) => {
                if self.timeout == Some(Duration::ZERO) {
                    return Err(BatchError::InvalidConfig(
                        "timeout must be positive".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Splits a raw argument string on whitespace, the way the simulation
/// arguments are passed on the command line.
pub fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
