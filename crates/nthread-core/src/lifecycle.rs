//! Thread lifecycle state machine.
//!
//! A thread handle moves `Created -> Running -> Finished` and ends in one of two
//! terminal dispositions, `Joined` or `Terminated`, each either succeeded or
//! failed. The native layer never mutates the state directly: it observes the
//! guarded record, asks [`plan_join`] / [`plan_terminate`] what to do, performs
//! the native call, and folds the result back with the transition methods on
//! [`ThreadState`].
//!
//! ## Disposition rules
//!
//! - The first recorded disposition wins. A join racing a terminate leaves
//!   whichever was recorded first; the loser reports a consistent result.
//! - The single exception is `Terminated(Failed(_))`: a failed terminate leaves
//!   the thread to a later cleanup join, which may replace it with `Joined(_)`.
//! - Calls made by the thread on itself are rejected without recording anything.

use crate::error::ThreadError;

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Outcome recorded with a terminal disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    Succeeded,
    Failed(ThreadError),
}

impl Disposition {
    /// Convert into the status returned to callers.
    pub const fn into_result(self) -> Result<(), ThreadError> {
        match self {
            Self::Succeeded => Ok(()),
            Self::Failed(err) => Err(err),
        }
    }
}

/// Lifecycle state of a thread handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// Built but not spawned.
    Created,
    /// Native context started; routine has not returned.
    Running,
    /// Routine returned and its result is stored.
    Finished,
    /// Terminal: forced termination was requested.
    Terminated(Disposition),
    /// Terminal: the handle was joined.
    Joined(Disposition),
}

impl ThreadState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated(_) | Self::Joined(_))
    }

    /// Recorded terminal disposition, if any.
    #[must_use]
    pub const fn disposition(self) -> Option<Disposition> {
        match self {
            Self::Terminated(d) | Self::Joined(d) => Some(d),
            _ => None,
        }
    }

    /// Successful spawn: `Created -> Running`.
    #[must_use]
    pub const fn spawned(self) -> Self {
        match self {
            Self::Created => Self::Running,
            other => other,
        }
    }

    /// The routine returned: `Running -> Finished`.
    ///
    /// A failed terminate keeps its disposition; the stored result is what
    /// marks the routine as done in that case.
    #[must_use]
    pub const fn finished(self) -> Self {
        match self {
            Self::Running => Self::Finished,
            other => other,
        }
    }

    /// Record the outcome of a join.
    #[must_use]
    pub const fn joined(self, outcome: Disposition) -> Self {
        match self {
            Self::Joined(_) | Self::Terminated(Disposition::Succeeded) => self,
            _ => Self::Joined(outcome),
        }
    }

    /// Record the outcome of a terminate.
    #[must_use]
    pub const fn terminated(self, outcome: Disposition) -> Self {
        match self {
            Self::Joined(_) | Self::Terminated(_) => self,
            _ => Self::Terminated(outcome),
        }
    }
}

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// What the native slot of a handle currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeSlot {
    /// No context: never spawned, reaped, or claimed by an in-flight reaper.
    Empty,
    /// A joinable context that nobody has claimed yet.
    Joinable,
    /// A detached context; the OS reclaims it when the thread exits.
    Detached,
}

/// Snapshot of the guarded record taken under the state lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub state: ThreadState,
    /// The routine returned and its result is stored.
    pub finished: bool,
    pub native: NativeSlot,
    /// The caller runs on the handle's own native context.
    pub caller_is_self: bool,
}

/// How a native join of the thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// The thread left its start routine normally.
    Returned,
    /// The thread was cancelled.
    Cancelled,
}

// ---------------------------------------------------------------------------
// Join planning
// ---------------------------------------------------------------------------

/// Next action for a join call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStep {
    /// A join disposition exists; report it again.
    Replay(Disposition),
    /// Terminated successfully; report the stored result if there is one.
    Settled,
    /// The routine finished and nothing is left to reap: record `Joined(Succeeded)`.
    Collect,
    /// Claim the native context and join it.
    Reap,
    /// Block on the condition variable and observe again.
    Wait,
    /// Record `Joined(Failed(err))` and report it.
    Fail(ThreadError),
    /// Report `err` without recording anything.
    Reject(ThreadError),
}

/// Decide the next join action for an observed record.
#[must_use]
pub const fn plan_join(obs: Observation) -> JoinStep {
    match obs.state {
        ThreadState::Joined(d) => return JoinStep::Replay(d),
        ThreadState::Terminated(Disposition::Succeeded) => return JoinStep::Settled,
        ThreadState::Created => return JoinStep::Fail(ThreadError::NotSpawned),
        _ => {}
    }
    if obs.caller_is_self {
        return JoinStep::Reject(ThreadError::SelfDeadlock);
    }

    let failed_terminate = matches!(obs.state, ThreadState::Terminated(Disposition::Failed(_)));
    if !obs.finished {
        return match obs.native {
            // Running with an empty slot means a terminate is confirming its
            // cancellation; it broadcasts once it records the outcome.
            NativeSlot::Empty if failed_terminate => JoinStep::Settled,
            _ => JoinStep::Wait,
        };
    }
    match obs.native {
        NativeSlot::Joinable => JoinStep::Reap,
        NativeSlot::Detached => JoinStep::Collect,
        NativeSlot::Empty if failed_terminate => JoinStep::Collect,
        // Another joiner is reaping.
        NativeSlot::Empty => JoinStep::Wait,
    }
}

/// Disposition recorded after a reaping join.
#[must_use]
pub const fn reap_disposition(exit: Result<ExitKind, i32>) -> Disposition {
    match exit {
        Ok(ExitKind::Returned) => Disposition::Succeeded,
        Ok(ExitKind::Cancelled) => Disposition::Failed(ThreadError::Cancelled),
        Err(errno) => Disposition::Failed(ThreadError::Native {
            op: crate::error::NativeOp::Join,
            errno,
        }),
    }
}

// ---------------------------------------------------------------------------
// Terminate planning
// ---------------------------------------------------------------------------

/// Next action for a terminate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateStep {
    /// A terminate disposition exists; report it again.
    Replay(Disposition),
    /// Nothing to cancel: record `Terminated(Succeeded)` unless already joined.
    Settle,
    /// Request cancellation, then join to confirm it.
    Cancel,
    /// Another party is reaping the context; wait and observe again.
    Wait,
    /// Record `Terminated(Failed(err))` and report it.
    Refuse(ThreadError),
    /// Report `err` without recording anything.
    Reject(ThreadError),
}

/// Decide the next terminate action for an observed record.
#[must_use]
pub const fn plan_terminate(obs: Observation) -> TerminateStep {
    match obs.state {
        ThreadState::Terminated(d) => TerminateStep::Replay(d),
        ThreadState::Created | ThreadState::Finished | ThreadState::Joined(_) => {
            TerminateStep::Settle
        }
        ThreadState::Running => match obs.native {
            NativeSlot::Empty => TerminateStep::Wait,
            NativeSlot::Detached => TerminateStep::Refuse(ThreadError::NotJoinable),
            NativeSlot::Joinable if obs.caller_is_self => {
                TerminateStep::Reject(ThreadError::SelfDeadlock)
            }
            NativeSlot::Joinable => TerminateStep::Cancel,
        },
    }
}

/// Disposition recorded after the confirming join of a cancellation.
///
/// Only a join that reports "cancelled" confirms the termination.
#[must_use]
pub const fn cancel_disposition(exit: Result<ExitKind, i32>) -> Disposition {
    match exit {
        Ok(ExitKind::Cancelled) => Disposition::Succeeded,
        Ok(ExitKind::Returned) => Disposition::Failed(ThreadError::FinishedBeforeCancel),
        Err(errno) => Disposition::Failed(ThreadError::Native {
            op: crate::error::NativeOp::Join,
            errno,
        }),
    }
}
