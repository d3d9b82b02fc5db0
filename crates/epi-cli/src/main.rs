use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use epi_analysis::{format_report, BatchReport, TrialResult};
use epi_runner::{
    BatchConfig, BatchError, BatchRequest, CompletedBatch, SweepCase, SweepConfig, SweepEvent,
    TrialExecutor,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "epi-batch",
    version = "0.3.0",
    about = "Batch runner for the DiseaseSpread simulation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ExecutorArgs {
    /// Simulation command, split on whitespace.
    #[arg(long, default_value = "java DiseaseSpread")]
    sim_exe: String,
    /// Directory in which each batch creates its batch-* log directory.
    #[arg(long, default_value = ".")]
    log_root: PathBuf,
    /// Kill a trial still running after this many seconds.
    #[arg(long)]
    timeout_seconds: Option<u64>,
}

impl ExecutorArgs {
    fn executor(&self) -> Result<TrialExecutor> {
        let config = BatchConfig::default()
            .with_sim_command(epi_runner::split_args(&self.sim_exe))
            .with_log_root(&self.log_root)
            .with_timeout(self.timeout_seconds.map(Duration::from_secs));
        Ok(TrialExecutor::new(config)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulation --num times and report aggregate statistics.
    Run {
        #[arg(long = "num")]
        num_trials: usize,
        /// Arguments passed to every simulation run, split on whitespace.
        #[arg(long, allow_hyphen_values = true)]
        sim_args: String,
        #[arg(long)]
        title: Option<String>,
        /// Chart output path (.svg or a bitmap format such as .png).
        #[arg(long)]
        fig: Option<PathBuf>,
        #[command(flatten)]
        exec: ExecutorArgs,
        #[arg(long)]
        json: bool,
    },
    /// Run one batch per case of a parameter grid.
    Sweep {
        /// YAML grid; the built-in grid is used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        exec: ExecutorArgs,
        #[arg(long)]
        json: bool,
    },
    /// List the cases a sweep would run.
    DescribeSweep {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Decode the end-of-run statistics of one captured log.
    Parse {
        log: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", &err));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Run {
            num_trials,
            sim_args,
            title,
            fig,
            exec,
            json,
        } => {
            let executor = exec.executor()?;
            let request = BatchRequest {
                num_trials,
                sim_args: epi_runner::split_args(&sim_args),
                title,
                fig_path: fig,
            };
            let done = epi_runner::run_and_report(&executor, &request)
                .with_context(|| format!("batch failed ({} trials)", num_trials))?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "batch": completed_to_json(&done)?,
                })));
            }
            print_completed(&done);
        }
        Commands::Sweep { config, exec, json } => {
            let cfg = load_sweep_config(config.as_deref())?;
            let executor = exec.executor()?;
            let outcomes = epi_runner::run_sweep(&executor, &cfg, |event| {
                if json {
                    return;
                }
                match event {
                    SweepEvent::Started { case, .. } => {
                        println!();
                        println!("{}", "*".repeat(78));
                        println!("Doing {}:", case.title);
                    }
                    SweepEvent::Finished { outcome, .. } => print_completed(&outcome.batch),
                }
            })?;
            tracing::info!(cases = outcomes.len(), "sweep finished");
            if json {
                let batches = outcomes
                    .iter()
                    .map(|o| {
                        Ok(json!({
                            "case": case_to_json(&o.case),
                            "batch": completed_to_json(&o.batch)?,
                        }))
                    })
                    .collect::<Result<Vec<Value>>>()?;
                return Ok(Some(json!({
                    "ok": true,
                    "command": "sweep",
                    "cases": batches,
                })));
            }
            println!("All done.");
        }
        Commands::DescribeSweep { config, json } => {
            let cfg = load_sweep_config(config.as_deref())?;
            cfg.validate()?;
            let cases = epi_runner::expand_cases(&cfg);
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe-sweep",
                    "num_trials": cfg.num_trials,
                    "cases": cases.iter().map(case_to_json).collect::<Vec<_>>(),
                })));
            }
            println!("num_trials: {}", cfg.num_trials);
            println!("cases: {}", cases.len());
            for case in &cases {
                println!("{}", case.title);
                println!("  sim_args: {}", case.sim_args.join(" "));
                println!("  fig: {}", case.fig_path.display());
            }
        }
        Commands::Parse { log, json } => {
            let result = epi_analysis::parse_log_file(&log)
                .with_context(|| format!("cannot decode {}", log.display()))?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "parse",
                    "log": log.display().to_string(),
                    "result": serde_json::to_value(&result)?,
                })));
            }
            print_trial_result(&result);
        }
    }
    Ok(None)
}

fn load_sweep_config(path: Option<&Path>) -> Result<SweepConfig> {
    match path {
        Some(p) => Ok(SweepConfig::load(p)?),
        None => Ok(SweepConfig::default()),
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, err: &anyhow::Error) -> Value {
    let details = match err.downcast_ref::<BatchError>() {
        Some(batch_err) => json!({
            "stage": batch_err.stage(),
            "trial": batch_err.trial(),
        }),
        None => json!({}),
    };
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": format!("{:#}", err),
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. }
        | Commands::Sweep { json, .. }
        | Commands::DescribeSweep { json, .. }
        | Commands::Parse { json, .. } => *json,
    }
}

fn completed_to_json(done: &CompletedBatch) -> Result<Value> {
    Ok(json!({
        "report": serde_json::to_value(&done.report)?,
        "summary_path": done.summary_path.display().to_string(),
        "chart_path": done.chart_path.as_ref().map(|p| p.display().to_string()),
    }))
}

fn case_to_json(case: &SweepCase) -> Value {
    json!({
        "title": case.title,
        "sim_args": case.sim_args,
        "fig": case.fig_path.display().to_string(),
    })
}

fn print_completed(done: &CompletedBatch) {
    print_report_header(&done.report);
    print!("{}", format_report(&done.report));
    println!("summary: {}", done.summary_path.display());
    if let Some(chart) = &done.chart_path {
        println!("chart: {}", chart.display());
    }
}

fn print_report_header(report: &BatchReport) {
    println!("batch_dir: {}", report.batch_dir.display());
    println!("command: {}", report.sim_command.join(" "));
    println!("sim_args: {}", report.sim_args.join(" "));
    println!();
}

fn print_trial_result(result: &TrialResult) {
    match result {
        TrialResult::Scalar(counts) => {
            println!("shape: scalar");
            println!("numAgentsAlive: {}", counts.alive);
            println!("numAgentsInfected: {}", counts.infected);
        }
        TrialResult::Series(series) => {
            println!("shape: series");
            println!("samples: {}", series.num_samples());
            match (series.step.first(), series.step.last()) {
                (Some(first), Some(last)) => println!("steps: {}..={}", first, last),
                _ => println!("steps: none"),
            }
            if let Some(last) = series.last() {
                println!("final numAgentsAlive: {}", last.alive);
                println!("final numAgentsInfected: {}", last.infected);
            }
        }
    }
}
