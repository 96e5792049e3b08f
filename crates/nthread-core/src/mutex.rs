//! Mutex kinds and the held-lock errno contract.
//!
//! The native layer owns a `pthread_mutex_t`; this module says which errno
//! each acquiring call reports when the lock is already held, so the guard API
//! can tell a relock from a genuine native failure.

use crate::errno;

/// Mutex flavour selected at creation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutexKind {
    /// No ownership checking; a relock by the owner deadlocks.
    #[default]
    Normal,
    /// Relock by the owner and unlock by a non-owner report an errno.
    ErrorCheck,
}

impl MutexKind {
    /// Parse from string (case-insensitive). Unknown values map to `Normal`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "errorcheck" | "error-check" | "error_check" | "checked" => Self::ErrorCheck,
            _ => Self::Normal,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::ErrorCheck => "errorcheck",
        }
    }
}

// ---------------------------------------------------------------------------
// Held-lock contract
// ---------------------------------------------------------------------------

/// Acquiring operation applied to a mutex that is already held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexContractOp {
    /// Blocking acquire by the thread that already owns the lock.
    Relock,
    /// Non-blocking acquire while any thread owns the lock.
    TryLock,
}

/// Errno the native call returns for `op` on a held mutex of `kind`.
///
/// `0` means the call never returns: a `Normal` relock deadlocks.
#[must_use]
pub const fn held_lock_errno(kind: MutexKind, op: MutexContractOp) -> i32 {
    match (op, kind) {
        (MutexContractOp::TryLock, _) => errno::EBUSY,
        (MutexContractOp::Relock, MutexKind::Normal) => 0,
        (MutexContractOp::Relock, MutexKind::ErrorCheck) => errno::EDEADLK,
    }
}
