//! Stress scenarios over the native primitives.
//!
//! Each scenario drives real threads, checks the properties the primitives
//! promise, and reports latency samples. A violated property becomes
//! [`HarnessError::Invariant`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use nthread_core::{CancelMode, Disposition, MutexKind, ThreadError, ThreadState};
use nthread_native::{Condvar, Mutex, ThreadBuilder, ThreadHandle, mem_barrier};

use crate::error::HarnessError;

const MAX_THREADS: usize = 1024;

/// Stress scenario selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// N threads incrementing one mutex-guarded counter.
    Counter,
    /// Waiters released by one broadcast, repeatedly.
    Condvar,
    /// Producer/consumer handoff ordered by memory barriers.
    Barrier,
    /// Spawn a looping routine and terminate it.
    Terminate,
    /// Join and terminate racing on the same handle.
    Race,
}

impl Scenario {
    pub const ALL: [Self; 5] = [
        Self::Counter,
        Self::Condvar,
        Self::Barrier,
        Self::Terminate,
        Self::Race,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Condvar => "condvar",
            Self::Barrier => "barrier",
            Self::Terminate => "terminate",
            Self::Race => "race",
        }
    }
}

/// Knobs shared by every scenario.
#[derive(Debug, Clone, Copy)]
pub struct StressConfig {
    pub threads: usize,
    pub iterations: u64,
    pub cancel_mode: CancelMode,
    pub mutex_kind: MutexKind,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            iterations: 200,
            cancel_mode: nthread_core::cancel_mode(),
            mutex_kind: nthread_core::mutex_kind(),
        }
    }
}

impl StressConfig {
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.threads == 0 || self.threads > MAX_THREADS {
            return Err(HarnessError::Config(format!(
                "threads must be in 1..={MAX_THREADS}, got {}",
                self.threads
            )));
        }
        if self.iterations == 0 {
            return Err(HarnessError::Config("iterations must be positive".into()));
        }
        Ok(())
    }

    fn builder(&self) -> ThreadBuilder {
        ThreadBuilder::new().cancel_mode(self.cancel_mode)
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Percentile summary of latency samples in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub p50_ns: u64,
    pub p99_ns: u64,
    pub max_ns: u64,
}

impl LatencySummary {
    #[must_use]
    pub fn from_samples(mut samples: Vec<u64>) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        samples.sort_unstable();
        let pick = |pct: usize| samples[(samples.len() - 1) * pct / 100];
        Self {
            samples: samples.len(),
            p50_ns: pick(50),
            p99_ns: pick(99),
            max_ns: samples[samples.len() - 1],
        }
    }
}

/// Result of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub operations: u64,
    pub elapsed_ns: u64,
    pub latency: LatencySummary,
    pub notes: serde_json::Value,
}

/// Latency samples collected from many threads.
#[derive(Debug, Clone, Default)]
struct Latencies(Arc<parking_lot::Mutex<Vec<u64>>>);

impl Latencies {
    fn record(&self, elapsed: Duration) {
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.0.lock().push(ns);
    }

    fn summary(&self) -> LatencySummary {
        LatencySummary::from_samples(self.0.lock().clone())
    }
}

fn invariant(scenario: Scenario, message: String) -> HarnessError {
    HarnessError::Invariant {
        scenario: scenario.name(),
        message,
    }
}

fn elapsed_ns(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Run one scenario to completion.
pub fn run(scenario: Scenario, config: &StressConfig) -> Result<ScenarioReport, HarnessError> {
    config.validate()?;
    let start = Instant::now();
    let latencies = Latencies::default();
    let (operations, notes) = match scenario {
        Scenario::Counter => run_counter(config, &latencies)?,
        Scenario::Condvar => run_condvar(config, &latencies)?,
        Scenario::Barrier => run_barrier(config, &latencies)?,
        Scenario::Terminate => run_terminate(config, &latencies)?,
        Scenario::Race => run_race(config, &latencies)?,
    };
    Ok(ScenarioReport {
        scenario,
        operations,
        elapsed_ns: elapsed_ns(start),
        latency: latencies.summary(),
        notes,
    })
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

fn join_all<T>(handles: &[ThreadHandle<T>]) -> Result<Vec<T>, HarnessError>
where
    T: Clone + Send + 'static,
{
    handles
        .iter()
        .map(|h| h.join().map_err(HarnessError::from))
        .collect()
}

fn run_counter(
    config: &StressConfig,
    latencies: &Latencies,
) -> Result<(u64, serde_json::Value), HarnessError> {
    let counter = Arc::new(Mutex::with_kind(0_u64, config.mutex_kind)?);
    let handles = (0..config.threads)
        .map(|_| {
            let counter = Arc::clone(&counter);
            let latencies = latencies.clone();
            let iterations = config.iterations;
            config.builder().spawn(move || {
                for _ in 0..iterations {
                    let start = Instant::now();
                    let mut guard = counter.lock();
                    latencies.record(start.elapsed());
                    *guard += 1;
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    join_all(&handles)?;

    let expected = config.threads as u64 * config.iterations;
    let total = *counter.lock();
    if total != expected {
        return Err(invariant(
            Scenario::Counter,
            format!("counter is {total}, expected {expected}"),
        ));
    }
    Ok((
        expected,
        serde_json::json!({ "mutex_kind": config.mutex_kind.as_str(), "total": total }),
    ))
}

struct Gate {
    generation: Mutex<u64>,
    cv: Condvar,
}

fn run_condvar(
    config: &StressConfig,
    latencies: &Latencies,
) -> Result<(u64, serde_json::Value), HarnessError> {
    let gate = Arc::new(Gate {
        generation: Mutex::with_kind(0_u64, config.mutex_kind)?,
        cv: Condvar::new()?,
    });
    let released = Arc::new(AtomicU64::new(0));
    let rounds = config.iterations;

    let waiters = (0..config.threads)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let released = Arc::clone(&released);
            config.builder().spawn(move || {
                for round in 1..=rounds {
                    let guard = gate.cv.wait_while(gate.generation.lock(), |g| *g < round);
                    drop(guard);
                    released.fetch_add(1, Ordering::AcqRel);
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let per_round = config.threads as u64;
    for round in 1..=rounds {
        let start = Instant::now();
        {
            let mut generation = gate.generation.lock();
            *generation = round;
            gate.cv.broadcast();
        }
        // Every waiter passes this generation before the next broadcast.
        while released.load(Ordering::Acquire) < round * per_round {
            std::thread::yield_now();
        }
        latencies.record(start.elapsed());
    }
    join_all(&waiters)?;

    let total = released.load(Ordering::Acquire);
    if total != rounds * per_round {
        return Err(invariant(
            Scenario::Condvar,
            format!("{total} wakeups observed, expected {}", rounds * per_round),
        ));
    }
    Ok((total, serde_json::json!({ "rounds": rounds, "waiters": per_round })))
}

struct Mailbox {
    payload: AtomicU64,
    seq: AtomicU64,
}

fn run_barrier(
    config: &StressConfig,
    latencies: &Latencies,
) -> Result<(u64, serde_json::Value), HarnessError> {
    let rounds = config.iterations;
    let mailbox = Arc::new(Mailbox {
        payload: AtomicU64::new(0),
        seq: AtomicU64::new(0),
    });

    let producer = {
        let mailbox = Arc::clone(&mailbox);
        config.builder().spawn(move || {
            for round in 1..=rounds {
                while mailbox.seq.load(Ordering::Relaxed) != (round - 1) * 2 {
                    std::hint::spin_loop();
                }
                mailbox.payload.store(round.wrapping_mul(0x9e37_79b9), Ordering::Relaxed);
                mem_barrier();
                mailbox.seq.store(round * 2 - 1, Ordering::Relaxed);
            }
        })?
    };

    let mut mismatches = 0_u64;
    for round in 1..=rounds {
        let start = Instant::now();
        while mailbox.seq.load(Ordering::Relaxed) != round * 2 - 1 {
            std::hint::spin_loop();
        }
        mem_barrier();
        if mailbox.payload.load(Ordering::Relaxed) != round.wrapping_mul(0x9e37_79b9) {
            mismatches += 1;
        }
        mem_barrier();
        mailbox.seq.store(round * 2, Ordering::Relaxed);
        latencies.record(start.elapsed());
    }
    producer.join()?;

    if mismatches != 0 {
        return Err(invariant(
            Scenario::Barrier,
            format!("{mismatches} stale payloads in {rounds} rounds"),
        ));
    }
    Ok((rounds, serde_json::json!({ "mismatches": mismatches })))
}

fn run_terminate(
    config: &StressConfig,
    latencies: &Latencies,
) -> Result<(u64, serde_json::Value), HarnessError> {
    for i in 0..config.iterations {
        let handle = config.builder().spawn(|| -> u64 {
            loop {
                std::thread::sleep(Duration::from_micros(100));
            }
        })?;

        let start = Instant::now();
        handle.terminate()?;
        latencies.record(start.elapsed());

        if handle.state() != ThreadState::Terminated(Disposition::Succeeded) {
            return Err(invariant(
                Scenario::Terminate,
                format!("iteration {i}: state {:?} after terminate", handle.state()),
            ));
        }
        match handle.join() {
            Err(ThreadError::Terminated) => {}
            other => {
                return Err(invariant(
                    Scenario::Terminate,
                    format!("iteration {i}: join after terminate returned {other:?}"),
                ));
            }
        }
    }
    Ok((
        config.iterations,
        serde_json::json!({ "cancel_mode": config.cancel_mode.as_str() }),
    ))
}

fn run_race(
    config: &StressConfig,
    latencies: &Latencies,
) -> Result<(u64, serde_json::Value), HarnessError> {
    let mut joined_first = 0_u64;
    let mut terminated_first = 0_u64;
    let mut finished_before_cancel = 0_u64;

    for i in 0..config.iterations {
        let spin = i % 64 * 200;
        let handle = config.builder().spawn(move || {
            let mut acc = i;
            for step in 0..spin {
                acc = std::hint::black_box(acc.wrapping_add(step));
            }
            i
        })?;

        let start = Instant::now();
        let (joined, terminated) = std::thread::scope(|scope| {
            let joiner = scope.spawn(|| handle.join());
            let terminator = scope.spawn(|| handle.terminate());
            (joiner.join(), terminator.join())
        });
        latencies.record(start.elapsed());
        let (Ok(joined), Ok(terminated)) = (joined, terminated) else {
            return Err(invariant(Scenario::Race, format!("iteration {i}: driver panicked")));
        };

        let replay = handle.join();
        if replay != joined {
            return Err(invariant(
                Scenario::Race,
                format!("iteration {i}: join replay {replay:?} differs from {joined:?}"),
            ));
        }
        match (joined, terminated) {
            (Ok(value), _) if value != i => {
                return Err(invariant(
                    Scenario::Race,
                    format!("iteration {i}: joined wrong value {value}"),
                ));
            }
            (_, Err(ThreadError::FinishedBeforeCancel)) => finished_before_cancel += 1,
            (Ok(_), Ok(())) => joined_first += 1,
            (Err(ThreadError::Terminated), Ok(())) => terminated_first += 1,
            (j, t) => {
                return Err(invariant(
                    Scenario::Race,
                    format!("iteration {i}: inconsistent outcome join={j:?} terminate={t:?}"),
                ));
            }
        }
        if !handle.state().is_terminal() {
            return Err(invariant(
                Scenario::Race,
                format!("iteration {i}: state {:?} is not terminal", handle.state()),
            ));
        }
    }
    Ok((
        config.iterations,
        serde_json::json!({
            "joined_first": joined_first,
            "terminated_first": terminated_first,
            "finished_before_cancel": finished_before_cancel,
        }),
    ))
}
