//! pthread-backed mutex guarding a value.
//!
//! The native object lives in its own heap allocation so the `Mutex` itself can
//! move; pthread objects must stay at the address they were initialized at.

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ops::{Deref, DerefMut};

use nthread_core::mutex::{MutexContractOp, held_lock_errno};
use nthread_core::{MutexKind, ThreadError, config};

/// Exclusive lock around a `T`.
///
/// Unlock happens when the [`MutexGuard`] drops; the native mutex is destroyed
/// when the `Mutex` drops, which the borrow checker orders after every guard.
pub struct Mutex<T: ?Sized> {
    raw: Box<UnsafeCell<libc::pthread_mutex_t>>,
    kind: MutexKind,
    data: UnsafeCell<T>,
}

// SAFETY: the value is only reachable through a guard, and a guard exists only
// while the native mutex is held.
unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
// SAFETY: as above; concurrent `&Mutex` access is serialized by the native lock.
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Create a mutex of the configured default kind (`NTHREAD_MUTEX_KIND`).
    pub fn new(value: T) -> Result<Self, ThreadError> {
        Self::with_kind(value, config::mutex_kind())
    }

    pub fn with_kind(value: T, kind: MutexKind) -> Result<Self, ThreadError> {
        let raw = init_native(kind)?;
        Ok(Self {
            raw,
            kind,
            data: UnsafeCell::new(value),
        })
    }

    pub fn into_inner(self) -> T {
        let this = mem::ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so `raw` and `data` are each moved
        // out exactly once.
        let (raw, data) = unsafe { (std::ptr::read(&this.raw), std::ptr::read(&this.data)) };
        destroy_native(&raw);
        data.into_inner()
    }
}

fn init_native(kind: MutexKind) -> Result<Box<UnsafeCell<libc::pthread_mutex_t>>, ThreadError> {
    let alloc_failed = |errno| ThreadError::Alloc {
        what: "mutex",
        errno,
    };
    // SAFETY: an all-zero pthread_mutex_t is valid storage for pthread_mutex_init.
    let raw: Box<UnsafeCell<libc::pthread_mutex_t>> =
        Box::new(UnsafeCell::new(unsafe { mem::zeroed() }));

    let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
    // SAFETY: `attr` is writable storage for one attribute object.
    let rc = unsafe { libc::pthread_mutexattr_init(attr.as_mut_ptr()) };
    if rc != 0 {
        return Err(alloc_failed(rc));
    }
    let native_kind = match kind {
        MutexKind::Normal => libc::PTHREAD_MUTEX_NORMAL,
        MutexKind::ErrorCheck => libc::PTHREAD_MUTEX_ERRORCHECK,
    };
    // SAFETY: `attr` is initialized; `raw` is heap storage that never moves.
    let rc = unsafe {
        let mut rc = libc::pthread_mutexattr_settype(attr.as_mut_ptr(), native_kind);
        if rc == 0 {
            rc = libc::pthread_mutex_init(raw.get(), attr.as_ptr());
        }
        libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
        rc
    };
    if rc != 0 {
        return Err(alloc_failed(rc));
    }
    Ok(raw)
}

#[cold]
fn lock_failed(kind: MutexKind, rc: i32) -> ! {
    if rc == held_lock_errno(kind, MutexContractOp::Relock) {
        panic!("{} mutex relocked by its owning thread (errno {rc})", kind.as_str());
    }
    log::error!("pthread_mutex_lock failed: errno {rc}");
    panic!("pthread_mutex_lock failed: errno {rc}");
}

fn destroy_native(raw: &UnsafeCell<libc::pthread_mutex_t>) {
    // SAFETY: called once, after the last guard is gone.
    let rc = unsafe { libc::pthread_mutex_destroy(raw.get()) };
    if rc != 0 {
        log::warn!("pthread_mutex_destroy failed: errno {rc}");
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Block until the lock is held.
    ///
    /// # Panics
    ///
    /// Panics if an `ErrorCheck` mutex is relocked by its owner, or if the
    /// native lock reports any other error. The other errors are logged at
    /// `error` level first.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        // SAFETY: `raw` was initialized by `init_native` and lives as long as `self`.
        let rc = unsafe { libc::pthread_mutex_lock(self.raw.get()) };
        if rc != 0 {
            lock_failed(self.kind, rc);
        }
        MutexGuard::new(self)
    }

    /// Acquire the lock if it is free. Never blocks.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        // SAFETY: `raw` was initialized by `init_native` and lives as long as `self`.
        let rc = unsafe { libc::pthread_mutex_trylock(self.raw.get()) };
        if rc == 0 {
            return Some(MutexGuard::new(self));
        }
        if rc != held_lock_errno(self.kind, MutexContractOp::TryLock) {
            log::warn!("pthread_mutex_trylock failed: errno {rc}");
        }
        None
    }

    #[must_use]
    pub fn kind(&self) -> MutexKind {
        self.kind
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub(crate) fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.raw.get()
    }
}

impl<T: ?Sized> Drop for Mutex<T> {
    fn drop(&mut self) {
        destroy_native(&self.raw);
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        d.field("kind", &self.kind);
        match self.try_lock() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish_non_exhaustive()
    }
}

/// Proof that the calling thread holds a [`Mutex`].
///
/// Not `Send`: a pthread mutex must be unlocked by the thread that locked it.
#[must_use = "if unused the Mutex will immediately unlock"]
pub struct MutexGuard<'a, T: ?Sized> {
    lock: &'a Mutex<T>,
    _not_send: PhantomData<*const ()>,
}

// SAFETY: a shared guard only hands out `&T`.
unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}

impl<'a, T: ?Sized> MutexGuard<'a, T> {
    fn new(lock: &'a Mutex<T>) -> Self {
        Self {
            lock,
            _not_send: PhantomData,
        }
    }

    /// Release the lock now.
    pub fn unlock(guard: Self) {
        drop(guard);
    }

    pub(crate) fn mutex(&self) -> &'a Mutex<T> {
        self.lock
    }
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the native lock is held.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the native lock is held.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: this guard's thread holds the lock.
        let rc = unsafe { libc::pthread_mutex_unlock(self.lock.raw()) };
        if rc != 0 {
            log::warn!("pthread_mutex_unlock failed: errno {rc}");
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_gives_exclusive_access() {
        let mutex = Mutex::with_kind(5_u32, MutexKind::Normal).unwrap();
        {
            let mut guard = mutex.lock();
            *guard += 1;
            assert!(mutex.try_lock().is_none());
        }
        assert_eq!(*mutex.lock(), 6);
    }

    #[test]
    fn explicit_unlock_releases() {
        let mutex = Mutex::with_kind(Vec::<u8>::new(), MutexKind::ErrorCheck).unwrap();
        let mut guard = mutex.lock();
        guard.push(1);
        MutexGuard::unlock(guard);
        let guard = mutex.try_lock().expect("unlocked after explicit unlock");
        assert_eq!(*guard, vec![1]);
    }

    #[test]
    fn into_inner_returns_value() {
        let mutex = Mutex::with_kind(String::from("kept"), MutexKind::Normal).unwrap();
        assert_eq!(mutex.into_inner(), "kept");
    }

    #[test]
    fn debug_shows_locked_state() {
        let mutex = Mutex::with_kind(1_i32, MutexKind::Normal).unwrap();
        assert!(format!("{mutex:?}").contains("data: 1"));
        let _guard = mutex.lock();
        assert!(format!("{mutex:?}").contains("<locked>"));
    }

    #[test]
    #[should_panic(expected = "pthread_mutex_lock failed: errno")]
    fn native_lock_error_is_not_reported_as_relock() {
        lock_failed(MutexKind::ErrorCheck, libc::EINVAL);
    }

    #[test]
    #[should_panic(expected = "errorcheck mutex relocked")]
    fn edeadlk_on_errorcheck_is_a_relock() {
        lock_failed(MutexKind::ErrorCheck, libc::EDEADLK);
    }

    #[test]
    fn get_mut_needs_no_lock() {
        let mut mutex = Mutex::with_kind(0_u8, MutexKind::Normal).unwrap();
        *mutex.get_mut() = 9;
        assert_eq!(*mutex.lock(), 9);
    }
}
