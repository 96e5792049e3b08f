//! pthread-backed condition variable.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem;

use nthread_core::ThreadError;

use crate::mutex::MutexGuard;

/// Wait/broadcast condition variable used together with a [`crate::Mutex`].
///
/// Wakeups may be spurious; wait in a loop or use [`Condvar::wait_while`].
pub struct Condvar {
    raw: Box<UnsafeCell<libc::pthread_cond_t>>,
}

// SAFETY: pthread condition variables are designed for use from any thread.
unsafe impl Send for Condvar {}
// SAFETY: as above.
unsafe impl Sync for Condvar {}

impl Condvar {
    pub fn new() -> Result<Self, ThreadError> {
        // SAFETY: an all-zero pthread_cond_t is valid storage for pthread_cond_init.
        let raw: Box<UnsafeCell<libc::pthread_cond_t>> =
            Box::new(UnsafeCell::new(unsafe { mem::zeroed() }));
        // SAFETY: `raw` is heap storage that never moves; null attr selects defaults.
        let rc = unsafe { libc::pthread_cond_init(raw.get(), std::ptr::null()) };
        if rc != 0 {
            return Err(ThreadError::Alloc {
                what: "condition variable",
                errno: rc,
            });
        }
        Ok(Self { raw })
    }

    /// Release the guard's mutex, block until woken, and reacquire it.
    pub fn wait<'a, T: ?Sized>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mutex = guard.mutex();
        // SAFETY: the guard proves the calling thread holds `mutex`, and both
        // native objects outlive this call.
        let rc = unsafe { libc::pthread_cond_wait(self.raw.get(), mutex.raw()) };
        if rc != 0 {
            log::warn!("pthread_cond_wait failed: errno {rc}");
        }
        guard
    }

    /// Wait until `condition` returns false. Returns immediately if it already does.
    pub fn wait_while<'a, T, F>(
        &self,
        mut guard: MutexGuard<'a, T>,
        mut condition: F,
    ) -> MutexGuard<'a, T>
    where
        T: ?Sized,
        F: FnMut(&mut T) -> bool,
    {
        while condition(&mut *guard) {
            guard = self.wait(guard);
        }
        guard
    }

    /// Wake every waiter.
    pub fn broadcast(&self) {
        // SAFETY: `raw` was initialized in `new`.
        let rc = unsafe { libc::pthread_cond_broadcast(self.raw.get()) };
        if rc != 0 {
            log::warn!("pthread_cond_broadcast failed: errno {rc}");
        }
    }
}

impl Drop for Condvar {
    fn drop(&mut self) {
        // SAFETY: `&mut self` means no thread is waiting.
        let rc = unsafe { libc::pthread_cond_destroy(self.raw.get()) };
        if rc != 0 {
            log::warn!("pthread_cond_destroy failed: errno {rc}");
        }
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}
