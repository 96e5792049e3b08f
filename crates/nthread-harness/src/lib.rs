//! Stress harness for nthread.
//!
//! This crate provides:
//! - Stress scenarios over the native thread handle and its primitives
//! - Canonical JSONL evidence logs with schema validation
//! - Capture of the native crate's `log` events into those logs

#![forbid(unsafe_code)]

pub mod error;
pub mod native_events;
pub mod scenarios;
pub mod structured_log;

pub use error::HarnessError;
pub use scenarios::{LatencySummary, Scenario, ScenarioReport, StressConfig};
pub use structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};

/// Run `scenarios` in order and record one JSONL entry per scenario, followed
/// by any captured native events. Returns the number of failed scenarios.
pub fn run_stress(
    scenarios: &[Scenario],
    config: &StressConfig,
    emitter: &mut LogEmitter,
    capture: Option<&native_events::EventCapture>,
) -> Result<usize, HarnessError> {
    config.validate()?;
    emitter.emit_entry(
        LogEntry::new(String::new(), LogLevel::Info, "stress_start")
            .with_cancel_mode(config.cancel_mode)
            .with_details(serde_json::json!({
                "threads": config.threads,
                "iterations": config.iterations,
                "mutex_kind": config.mutex_kind.as_str(),
            })),
    )?;

    let mut failures = 0;
    for &scenario in scenarios {
        let entry = LogEntry::new(String::new(), LogLevel::Info, "scenario_end")
            .with_scenario(scenario.name())
            .with_cancel_mode(config.cancel_mode);
        let entry = match scenarios::run(scenario, config) {
            Ok(report) => entry
                .with_outcome(Outcome::Pass)
                .with_latency_ns(report.latency.p50_ns)
                .with_details(serde_json::to_value(&report)?),
            Err(err) => {
                failures += 1;
                let mut entry = LogEntry {
                    level: LogLevel::Error,
                    ..entry
                }
                .with_outcome(Outcome::Fail)
                .with_details(serde_json::json!({ "error": err.to_string() }));
                if let Some(errno) = err.errno() {
                    entry = entry.with_errno(errno);
                }
                entry
            }
        };
        emitter.emit_entry(entry)?;

        if let Some(capture) = capture {
            for event in capture.drain() {
                emitter.emit_entry(event.into_entry(Some(scenario.name())))?;
            }
        }
    }

    emitter.emit_entry(
        LogEntry::new(String::new(), LogLevel::Info, "stress_end").with_details(
            serde_json::json!({ "scenarios": scenarios.len(), "failures": failures }),
        ),
    )?;
    emitter.flush()?;
    Ok(failures)
}
