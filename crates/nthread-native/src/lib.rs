//! # nthread-native
//!
//! Native thread handles and the synchronization primitives they are built on.
//!
//! ```text
//! ThreadHandle ──> Mutex<Record> + Condvar ──> pthread_mutex_t / pthread_cond_t
//!      │
//!      └─> sys (pthread_create / join / cancel / detach)
//! ```
//!
//! Decisions about what a join or terminate may do come from the safe state
//! machine in `nthread-core`; this crate only performs the native calls and
//! records their results. Lifecycle events are emitted through the `log`
//! facade; no logger is installed here.

#[cfg(target_os = "android")]
compile_error!("nthread-native requires pthread_cancel, which bionic does not provide");

#[cfg(not(any(target_os = "linux", target_os = "freebsd", target_vendor = "apple")))]
compile_error!("nthread-native supports Linux, FreeBSD and Apple targets");

mod sys;

pub mod barrier;
pub mod condvar;
pub mod mutex;
pub mod thread;

pub use barrier::mem_barrier;
pub use condvar::Condvar;
pub use mutex::{Mutex, MutexGuard};
pub use nthread_core::{CancelMode, Disposition, MutexKind, NativeOp, ThreadError, ThreadState};
pub use thread::{ThreadBuilder, ThreadHandle, exit, spawn};
