//! Native thread handles.
//!
//! A [`ThreadHandle`] owns one native execution context and the guarded record
//! describing it. The spawned thread writes its result into the record and
//! broadcasts; joiners and terminators block on the same mutex/condvar pair.
//!
//! ## Cancellation
//!
//! [`ThreadHandle::terminate`] uses `pthread_cancel`, which unwinds the target
//! thread at an arbitrary point in its routine when the cancel mode is
//! asynchronous. Locks or allocations held by the routine at that point may be
//! left in an inconsistent state. Routines that need a graceful stop should
//! poll a shared flag instead.
//!
//! A panic that escapes the routine aborts the process.

use std::ffi::c_void;
use std::fmt;
use std::ptr;
use std::sync::Arc;

use nthread_core::lifecycle::{cancel_disposition, plan_join, plan_terminate, reap_disposition};
use nthread_core::{
    CancelMode, Disposition, JoinStep, NativeOp, NativeSlot, Observation, TerminateStep,
    ThreadError, ThreadState, config,
};

use crate::condvar::Condvar;
use crate::mutex::{Mutex, MutexGuard};
use crate::sys::{self, RawThread};

type Routine<T> = Box<dyn FnOnce() -> T + Send + 'static>;

#[derive(Debug, Clone, Copy)]
struct NativeThread {
    id: RawThread,
    joinable: bool,
}

// SAFETY: a pthread id is a plain token valid from any thread; on some targets
// it is a pointer type, which is not `Send` by default.
unsafe impl Send for NativeThread {}

/// State shared between a handle and its running thread.
struct Record<T> {
    state: ThreadState,
    retval: Option<T>,
    native: Option<NativeThread>,
    routine: Option<Routine<T>>,
}

impl<T> Record<T> {
    fn observe(&self) -> Observation {
        let native = match self.native {
            None => NativeSlot::Empty,
            Some(n) if n.joinable => NativeSlot::Joinable,
            Some(_) => NativeSlot::Detached,
        };
        Observation {
            state: self.state,
            finished: self.retval.is_some(),
            native,
            caller_is_self: self.native.is_some_and(|n| sys::is_current(n.id)),
        }
    }
}

struct Shared<T> {
    record: Mutex<Record<T>>,
    condvar: Condvar,
}

/// Handed to the new thread through `pthread_create`'s argument pointer.
struct StartPacket<T> {
    shared: Arc<Shared<T>>,
    routine: Routine<T>,
    cancel_mode: CancelMode,
}

extern "C-unwind" fn thread_start<T: Send + 'static>(arg: *mut c_void) -> *mut c_void {
    // SAFETY: `arg` is the packet leaked by `ThreadHandle::spawn`, which hands
    // ownership to this thread once pthread_create succeeds.
    let packet = unsafe { Box::from_raw(arg.cast::<StartPacket<T>>()) };
    let StartPacket {
        shared,
        routine,
        cancel_mode,
    } = *packet;

    sys::enable_cancellation(cancel_mode);
    let value = routine();
    // A cancelled thread must never die holding the record lock.
    sys::disable_cancellation();

    let mut record = shared.record.lock();
    record.retval = Some(value);
    record.state = record.state.finished();
    shared.condvar.broadcast();
    ptr::null_mut()
}

/// Join result as seen by a caller, given the settled record.
fn report_join<T, R>(
    record: &Record<T>,
    extract: &impl Fn(&Record<T>) -> Option<R>,
) -> Result<R, ThreadError> {
    match record.state {
        ThreadState::Joined(Disposition::Failed(err)) => Err(err),
        _ => extract(record).ok_or(ThreadError::Terminated),
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Options fixed when a handle is created.
#[derive(Debug, Clone, Copy)]
pub struct ThreadBuilder {
    joinable: bool,
    cancel_mode: CancelMode,
}

impl Default for ThreadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadBuilder {
    /// Joinable, with the configured cancel mode (`NTHREAD_CANCEL_MODE`).
    #[must_use]
    pub fn new() -> Self {
        Self {
            joinable: true,
            cancel_mode: config::cancel_mode(),
        }
    }

    #[must_use]
    pub fn joinable(mut self, joinable: bool) -> Self {
        self.joinable = joinable;
        self
    }

    #[must_use]
    pub fn cancel_mode(mut self, mode: CancelMode) -> Self {
        self.cancel_mode = mode;
        self
    }

    /// Create a handle in the `Created` state. `routine(data)` runs once spawned.
    pub fn build<T, D, F>(self, routine: F, data: D) -> Result<ThreadHandle<T>, ThreadError>
    where
        T: Send + 'static,
        D: Send + 'static,
        F: FnOnce(D) -> T + Send + 'static,
    {
        let record = Record {
            state: ThreadState::Created,
            retval: None,
            native: None,
            routine: Some(Box::new(move || routine(data))),
        };
        let shared = Shared {
            record: Mutex::new(record)?,
            condvar: Condvar::new()?,
        };
        Ok(ThreadHandle {
            shared: Arc::new(shared),
            joinable: self.joinable,
            cancel_mode: self.cancel_mode,
        })
    }

    /// Build and spawn in one step.
    pub fn spawn<T, F>(self, routine: F) -> Result<ThreadHandle<T>, ThreadError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let handle = self.build(|()| routine(), ())?;
        handle.spawn()?;
        Ok(handle)
    }
}

/// Spawn a joinable thread running `routine` with the configured cancel mode.
pub fn spawn<T, F>(routine: F) -> Result<ThreadHandle<T>, ThreadError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    ThreadBuilder::new().spawn(routine)
}

/// End the calling thread immediately without touching any handle.
///
/// # Safety
///
/// The thread is ended by a forced unwind. No frame between here and the
/// thread's entry point may catch unwinds (`std::panic::catch_unwind`), so this
/// must not be called on the main thread or a `std::thread` thread. When called
/// from a [`ThreadHandle`] routine the routine never returns, so joiners of that
/// handle wait until it is terminated or dropped.
pub unsafe fn exit() -> ! {
    log::debug!("native thread exiting");
    // SAFETY: forwarded to the caller.
    unsafe { sys::exit_current() }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Owner of one native thread and its result.
pub struct ThreadHandle<T> {
    shared: Arc<Shared<T>>,
    joinable: bool,
    cancel_mode: CancelMode,
}

impl<T: Send + 'static> ThreadHandle<T> {
    /// Start the native thread. Allowed once, from the `Created` state.
    ///
    /// On failure nothing is leaked and the handle stays `Created`.
    pub fn spawn(&self) -> Result<(), ThreadError> {
        let mut record = self.shared.record.lock();
        if record.state != ThreadState::Created {
            return Err(ThreadError::AlreadySpawned);
        }
        let Some(routine) = record.routine.take() else {
            return Err(ThreadError::AlreadySpawned);
        };

        let packet = Box::into_raw(Box::new(StartPacket {
            shared: Arc::clone(&self.shared),
            routine,
            cancel_mode: self.cancel_mode,
        }));
        // The record lock stays held so the new thread cannot publish a result
        // before its native id is recorded.
        // SAFETY: on success the thread takes ownership of `packet`.
        let spawned =
            unsafe { sys::spawn_native(self.joinable, thread_start::<T>, packet.cast()) };
        match spawned {
            Ok(id) => {
                record.native = Some(NativeThread {
                    id,
                    joinable: self.joinable,
                });
                record.state = record.state.spawned();
                log::debug!(
                    "spawned native thread (joinable={}, cancel={})",
                    self.joinable,
                    self.cancel_mode.as_str()
                );
                Ok(())
            }
            Err(err) => {
                // SAFETY: no thread was created, so `packet` was never handed over.
                let packet = unsafe { Box::from_raw(packet) };
                record.routine = Some(packet.routine);
                log::warn!("spawn failed: {err}");
                Err(err)
            }
        }
    }

    /// Wait for the routine and return a copy of its result.
    ///
    /// Repeated and concurrent calls report the same outcome.
    pub fn join(&self) -> Result<T, ThreadError>
    where
        T: Clone,
    {
        self.join_with(|record| record.retval.clone())
    }

    /// Like [`join`](Self::join) without copying the result out.
    pub fn wait(&self) -> Result<(), ThreadError> {
        self.join_with(|record| record.retval.as_ref().map(|_| ()))
    }

    /// Run `f` on the stored result once the routine has finished.
    pub fn with_result<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let record = self.shared.record.lock();
        record.retval.as_ref().map(f)
    }

    fn join_with<R>(&self, extract: impl Fn(&Record<T>) -> Option<R>) -> Result<R, ThreadError> {
        let shared = &*self.shared;
        let mut record = shared.record.lock();
        loop {
            match plan_join(record.observe()) {
                JoinStep::Replay(_) | JoinStep::Settled => {
                    log::trace!("join replays {:?}", record.state);
                    return report_join(&record, &extract);
                }
                JoinStep::Reject(err) => return Err(err),
                JoinStep::Wait => record = shared.condvar.wait(record),
                JoinStep::Fail(err) => {
                    record.state = record.state.joined(Disposition::Failed(err));
                    shared.condvar.broadcast();
                    log::debug!("join failed: {err}");
                    return report_join(&record, &extract);
                }
                JoinStep::Collect => {
                    record.state = record.state.joined(Disposition::Succeeded);
                    shared.condvar.broadcast();
                    log::debug!("joined without native reap");
                    return report_join(&record, &extract);
                }
                JoinStep::Reap => {
                    let Some(native) = record.native.take() else {
                        continue;
                    };
                    MutexGuard::unlock(record);
                    let exit = sys::join(native.id);
                    record = shared.record.lock();

                    let outcome = reap_disposition(exit);
                    if let Disposition::Failed(err) = outcome {
                        log::warn!("native join failed: {err}");
                    }
                    record.state = record.state.joined(outcome);
                    shared.condvar.broadcast();
                    log::debug!("joined native thread: {:?}", record.state);
                    return report_join(&record, &extract);
                }
            }
        }
    }

    /// Forcibly stop the thread and confirm it with a native join.
    ///
    /// Succeeds without touching the thread if it already finished or was
    /// joined. If the routine finishes before the cancellation lands, the
    /// terminate fails and the result stays available to a later join.
    ///
    /// A failed terminate is recorded and later terminate calls only replay it.
    /// Only [`join`](Self::join) or [`wait`](Self::wait) can settle the handle
    /// afterwards: it reaps a native thread left intact by a rejected cancel, or
    /// collects the result of a routine that finished first, and records `Joined`.
    pub fn terminate(&self) -> Result<(), ThreadError> {
        let shared = &*self.shared;
        let mut record = shared.record.lock();
        loop {
            match plan_terminate(record.observe()) {
                TerminateStep::Replay(outcome) => {
                    log::trace!("terminate replays {outcome:?}");
                    return outcome.into_result();
                }
                TerminateStep::Reject(err) => return Err(err),
                TerminateStep::Wait => record = shared.condvar.wait(record),
                TerminateStep::Settle => {
                    record.state = record.state.terminated(Disposition::Succeeded);
                    shared.condvar.broadcast();
                    log::debug!("terminate settled without cancel: {:?}", record.state);
                    return record
                        .state
                        .disposition()
                        .map_or(Ok(()), Disposition::into_result);
                }
                TerminateStep::Refuse(err) => {
                    record.state = record.state.terminated(Disposition::Failed(err));
                    shared.condvar.broadcast();
                    log::warn!("terminate refused: {err}");
                    return Err(err);
                }
                TerminateStep::Cancel => {
                    let Some(native) = record.native else {
                        continue;
                    };
                    if let Err(errno) = sys::cancel(native.id) {
                        let err = ThreadError::CancelRejected { errno };
                        record.state = record.state.terminated(Disposition::Failed(err));
                        shared.condvar.broadcast();
                        log::warn!("terminate failed: {err}");
                        return Err(err);
                    }

                    record.native = None;
                    MutexGuard::unlock(record);
                    let exit = sys::join(native.id);
                    record = shared.record.lock();

                    if exit.is_err() {
                        // Never released speculatively.
                        record.native = Some(native);
                    }
                    let outcome = cancel_disposition(exit);
                    record.state = record.state.terminated(outcome);
                    shared.condvar.broadcast();
                    match outcome {
                        Disposition::Succeeded => log::debug!("terminated native thread"),
                        Disposition::Failed(err) => log::warn!("terminate failed: {err}"),
                    }
                    return outcome.into_result();
                }
            }
        }
    }
}

impl<T> ThreadHandle<T> {
    /// Whether the caller runs on this handle's native thread.
    #[must_use]
    pub fn is_self(&self) -> bool {
        let record = self.shared.record.lock();
        record.native.is_some_and(|n| sys::is_current(n.id))
    }

    #[must_use]
    pub fn state(&self) -> ThreadState {
        self.shared.record.lock().state
    }

    /// Whether the routine has returned and stored its result.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.record.lock().retval.is_some()
    }

    #[must_use]
    pub fn is_joinable(&self) -> bool {
        self.joinable
    }

    #[must_use]
    pub fn cancel_mode(&self) -> CancelMode {
        self.cancel_mode
    }
}

impl<T> Drop for ThreadHandle<T> {
    fn drop(&mut self) {
        let mut record = self.shared.record.lock();
        if let Some(native) = record.native.take_if(|n| n.joinable) {
            match sys::detach(native.id) {
                Ok(()) => log::debug!("detached unreaped native thread on drop"),
                Err(errno) => {
                    let err = ThreadError::Native {
                        op: NativeOp::Detach,
                        errno,
                    };
                    log::warn!("{err} on drop");
                }
            }
        }
    }
}

impl<T> fmt::Debug for ThreadHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("state", &self.state())
            .field("joinable", &self.joinable)
            .field("cancel_mode", &self.cancel_mode)
            .finish_non_exhaustive()
    }
}
