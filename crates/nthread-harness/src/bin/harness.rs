//! CLI entrypoint for the nthread stress harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use nthread_core::{CancelMode, MutexKind};
use nthread_harness::native_events;
use nthread_harness::structured_log::{LogEmitter, validate_log_file};
use nthread_harness::{Scenario, StressConfig};

/// Stress tooling for nthread.
#[derive(Debug, Parser)]
#[command(name = "nthread-harness")]
#[command(about = "Stress harness for native thread handles and primitives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CancelArg {
    Async,
    Deferred,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MutexArg {
    Normal,
    Errorcheck,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run stress scenarios and write a JSONL evidence log.
    Stress {
        /// Scenarios to run (repeatable). Defaults to all of them.
        #[arg(long = "scenario", value_enum)]
        scenarios: Vec<Scenario>,
        /// Worker threads per scenario.
        #[arg(long, default_value_t = 4)]
        threads: usize,
        /// Iterations (or rounds) per scenario.
        #[arg(long, default_value_t = 200)]
        iterations: u64,
        /// Cancellation mode. Defaults to `NTHREAD_CANCEL_MODE`.
        #[arg(long, value_enum)]
        cancel_mode: Option<CancelArg>,
        /// Mutex kind. Defaults to `NTHREAD_MUTEX_KIND`.
        #[arg(long, value_enum)]
        mutex_kind: Option<MutexArg>,
        /// Run identifier embedded in trace ids.
        #[arg(long, default_value = "run-1")]
        run_id: String,
        /// Output JSONL path (if omitted, prints to stdout).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Also record the native crate's debug events.
        #[arg(long = "native-events")]
        capture_native: bool,
    },
    /// Validate a JSONL evidence log.
    ValidateLog {
        /// JSONL log path.
        #[arg(long)]
        log: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Stress {
            scenarios,
            threads,
            iterations,
            cancel_mode,
            mutex_kind,
            run_id,
            log,
            capture_native,
        } => {
            let mut config = StressConfig {
                threads,
                iterations,
                ..StressConfig::default()
            };
            if let Some(mode) = cancel_mode {
                config.cancel_mode = match mode {
                    CancelArg::Async => CancelMode::Asynchronous,
                    CancelArg::Deferred => CancelMode::Deferred,
                };
            }
            if let Some(kind) = mutex_kind {
                config.mutex_kind = match kind {
                    MutexArg::Normal => MutexKind::Normal,
                    MutexArg::Errorcheck => MutexKind::ErrorCheck,
                };
            }
            let scenarios = if scenarios.is_empty() {
                Scenario::ALL.to_vec()
            } else {
                scenarios
            };

            let capture = if capture_native {
                native_events::install(log::LevelFilter::Debug)
            } else {
                None
            };
            let mut emitter = match &log {
                Some(path) => LogEmitter::to_file(path, "nthread", &run_id)?,
                None => LogEmitter::to_stdout("nthread", &run_id),
            };

            let failures = nthread_harness::run_stress(&scenarios, &config, &mut emitter, capture)?;
            if let Some(path) = &log {
                eprintln!("Wrote stress log to {}", path.display());
            }
            if failures > 0 {
                return Err(format!("{failures} of {} scenarios failed", scenarios.len()).into());
            }
            eprintln!("All {} scenarios passed", scenarios.len());
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for error in &errors {
                eprintln!("{error}");
            }
            if !errors.is_empty() {
                return Err(format!(
                    "{} validation errors in {lines} lines of {}",
                    errors.len(),
                    log.display()
                )
                .into());
            }
            eprintln!("{lines} lines valid in {}", log.display());
        }
    }

    Ok(())
}
