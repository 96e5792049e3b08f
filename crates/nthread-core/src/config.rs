//! Runtime configuration.
//!
//! Two environment variables are read once, on first use, and cached for the
//! life of the process:
//! - `NTHREAD_CANCEL_MODE`: `async` (default) or `deferred`. Selects the
//!   cancellation type a spawned thread enables before running its routine.
//! - `NTHREAD_MUTEX_KIND`: `normal` (default) or `errorcheck`. Selects the
//!   kind used by `Mutex::new`.
//!
//! Unknown values fall back to the defaults.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::mutex::MutexKind;

pub const CANCEL_MODE_ENV: &str = "NTHREAD_CANCEL_MODE";
pub const MUTEX_KIND_ENV: &str = "NTHREAD_MUTEX_KIND";

/// Cancellation type enabled by the thread thunk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelMode {
    /// Cancellation may take effect at any instruction.
    #[default]
    Asynchronous,
    /// Cancellation takes effect only at POSIX cancellation points.
    Deferred,
}

impl CancelMode {
    /// Parse from string (case-insensitive). Unknown values map to `Asynchronous`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "deferred" | "defer" | "cooperative" => Self::Deferred,
            _ => Self::Asynchronous,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asynchronous => "async",
            Self::Deferred => "deferred",
        }
    }
}

// Cache states: 0=unresolved, 1..=N resolved value, 255=resolving.
// A reader that races the resolver gets the default instead of blocking.
const UNRESOLVED: u8 = 0;
const RESOLVING: u8 = 255;

static CACHED_CANCEL_MODE: AtomicU8 = AtomicU8::new(UNRESOLVED);
static CACHED_MUTEX_KIND: AtomicU8 = AtomicU8::new(UNRESOLVED);

const fn cancel_mode_to_u8(mode: CancelMode) -> u8 {
    match mode {
        CancelMode::Asynchronous => 1,
        CancelMode::Deferred => 2,
    }
}

const fn u8_to_cancel_mode(v: u8) -> CancelMode {
    match v {
        2 => CancelMode::Deferred,
        _ => CancelMode::Asynchronous,
    }
}

const fn mutex_kind_to_u8(kind: MutexKind) -> u8 {
    match kind {
        MutexKind::Normal => 1,
        MutexKind::ErrorCheck => 2,
    }
}

const fn u8_to_mutex_kind(v: u8) -> MutexKind {
    match v {
        2 => MutexKind::ErrorCheck,
        _ => MutexKind::Normal,
    }
}

/// Resolve a cached setting, reading `var` at most once per process.
fn resolve_cached(cache: &AtomicU8, var: &str, parse: fn(&str) -> u8, default: u8) -> u8 {
    let cached = cache.load(Ordering::Acquire);
    if cached != UNRESOLVED && cached != RESOLVING {
        return cached;
    }
    if cached == RESOLVING {
        return default;
    }
    if cache
        .compare_exchange(UNRESOLVED, RESOLVING, Ordering::SeqCst, Ordering::Relaxed)
        .is_err()
    {
        let v = cache.load(Ordering::Acquire);
        return if v != UNRESOLVED && v != RESOLVING { v } else { default };
    }

    let value = std::env::var(var).map_or(default, |raw| parse(&raw));
    cache.store(value, Ordering::Release);
    value
}

/// Configured cancellation mode (reads `NTHREAD_CANCEL_MODE` on first call).
#[must_use]
pub fn cancel_mode() -> CancelMode {
    u8_to_cancel_mode(resolve_cached(
        &CACHED_CANCEL_MODE,
        CANCEL_MODE_ENV,
        |raw| cancel_mode_to_u8(CancelMode::from_str_loose(raw)),
        cancel_mode_to_u8(CancelMode::default()),
    ))
}

/// Configured default mutex kind (reads `NTHREAD_MUTEX_KIND` on first call).
#[must_use]
pub fn mutex_kind() -> MutexKind {
    u8_to_mutex_kind(resolve_cached(
        &CACHED_MUTEX_KIND,
        MUTEX_KIND_ENV,
        |raw| mutex_kind_to_u8(MutexKind::from_str_loose(raw)),
        mutex_kind_to_u8(MutexKind::default()),
    ))
}
