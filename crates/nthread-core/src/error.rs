//! Error taxonomy for thread and primitive operations.
//!
//! Every operation reports failure to its immediate caller as a [`ThreadError`].
//! Errors are `Copy` so a failed join or terminate can be recorded inside the
//! handle's disposition and replayed verbatim on later calls.

use core::fmt;

use thiserror::Error;

use crate::errno;

/// Native call that produced an errno.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeOp {
    Join,
    Detach,
}

impl NativeOp {
    /// Name of the underlying pthread entry point.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Join => "pthread_join",
            Self::Detach => "pthread_detach",
        }
    }
}

impl fmt::Display for NativeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Failure of a thread, mutex or condition variable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ThreadError {
    /// The OS could not provide a mutex, condition variable or attribute object.
    #[error("failed to allocate {what}: errno {errno}")]
    Alloc { what: &'static str, errno: i32 },
    /// The native execution context could not be started.
    #[error("failed to start native thread: errno {errno}")]
    Spawn { errno: i32 },
    /// `spawn` was called on a handle that already left the created state.
    #[error("thread handle was already spawned")]
    AlreadySpawned,
    /// The handle never received a native execution context.
    #[error("thread handle was never spawned")]
    NotSpawned,
    /// A native call reported an errno.
    #[error("{op} failed: errno {errno}")]
    Native { op: NativeOp, errno: i32 },
    /// The native join revealed the thread was cancelled instead of returning.
    #[error("thread was cancelled before its routine returned")]
    Cancelled,
    /// The thread was terminated, so no result is available.
    #[error("thread was terminated before producing a result")]
    Terminated,
    /// The routine returned before the cancellation request took effect.
    #[error("thread finished before the cancellation took effect")]
    FinishedBeforeCancel,
    /// The OS rejected the cancellation request.
    #[error("cancellation request rejected: errno {errno}")]
    CancelRejected { errno: i32 },
    /// The handle runs a detached context, which cannot be confirmed by a native join.
    #[error("detached thread cannot be natively joined or terminated")]
    NotJoinable,
    /// The calling thread asked to wait for or cancel itself.
    #[error("thread cannot join or terminate itself")]
    SelfDeadlock,
}

impl ThreadError {
    /// POSIX errno a C caller would observe for this failure.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::Alloc { errno, .. }
            | Self::Spawn { errno }
            | Self::Native { errno, .. }
            | Self::CancelRejected { errno } => errno,
            Self::AlreadySpawned | Self::NotJoinable => errno::EINVAL,
            Self::NotSpawned | Self::FinishedBeforeCancel => errno::ESRCH,
            Self::Cancelled | Self::Terminated => errno::ECANCELED,
            Self::SelfDeadlock => errno::EDEADLK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_matches_posix_expectations() {
        assert_eq!(ThreadError::SelfDeadlock.errno(), errno::EDEADLK);
        assert_eq!(ThreadError::NotJoinable.errno(), errno::EINVAL);
        assert_eq!(ThreadError::NotSpawned.errno(), errno::ESRCH);
        assert_eq!(ThreadError::Cancelled.errno(), errno::ECANCELED);
        assert_eq!(
            ThreadError::Native {
                op: NativeOp::Join,
                errno: errno::ESRCH
            }
            .errno(),
            errno::ESRCH
        );
        assert_eq!(
            ThreadError::Spawn {
                errno: errno::EAGAIN
            }
            .errno(),
            errno::EAGAIN
        );
    }

    #[test]
    fn display_names_the_native_call() {
        let err = ThreadError::Native {
            op: NativeOp::Detach,
            errno: errno::ESRCH,
        };
        assert_eq!(err.to_string(), "pthread_detach failed: errno 3");
        let err = ThreadError::Alloc {
            what: "mutex",
            errno: errno::ENOMEM,
        };
        assert_eq!(err.to_string(), "failed to allocate mutex: errno 12");
    }
}
