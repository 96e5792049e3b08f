//! Thin wrappers over the pthread entry points used by thread handles.
//!
//! Every wrapper returns the raw errno on failure; callers decide which
//! `ThreadError` it becomes.

use std::ffi::{c_int, c_void};
use std::mem::MaybeUninit;
use std::ptr;

use nthread_core::{CancelMode, ExitKind, ThreadError};

pub(crate) type RawThread = libc::pthread_t;

/// Start routine as seen by `pthread_create`. Declared `C-unwind` so a
/// cancellation unwind may pass through the Rust frames of the routine.
pub(crate) type StartRoutine = extern "C-unwind" fn(*mut c_void) -> *mut c_void;

#[cfg(any(target_os = "linux", target_os = "freebsd"))]
mod cancel {
    pub(super) const ENABLE: super::c_int = 0;
    pub(super) const DISABLE: super::c_int = 1;
    pub(super) const DEFERRED: super::c_int = 0;
    #[cfg(target_os = "linux")]
    pub(super) const ASYNCHRONOUS: super::c_int = 1;
    #[cfg(target_os = "freebsd")]
    pub(super) const ASYNCHRONOUS: super::c_int = 2;
}

#[cfg(target_vendor = "apple")]
mod cancel {
    pub(super) const ENABLE: super::c_int = 0x01;
    pub(super) const DISABLE: super::c_int = 0x00;
    pub(super) const DEFERRED: super::c_int = 0x02;
    pub(super) const ASYNCHRONOUS: super::c_int = 0x00;
}

// Address of `PTHREAD_CANCELED`.
#[cfg(target_os = "linux")]
const CANCELED_ADDR: usize = usize::MAX;
#[cfg(not(target_os = "linux"))]
const CANCELED_ADDR: usize = 1;

unsafe extern "C" {
    #[link_name = "pthread_create"]
    fn host_pthread_create(
        native: *mut libc::pthread_t,
        attr: *const libc::pthread_attr_t,
        start: StartRoutine,
        arg: *mut c_void,
    ) -> c_int;
    #[link_name = "pthread_cancel"]
    fn host_pthread_cancel(native: libc::pthread_t) -> c_int;
    #[link_name = "pthread_setcancelstate"]
    fn host_pthread_setcancelstate(state: c_int, oldstate: *mut c_int) -> c_int;
    #[link_name = "pthread_setcanceltype"]
    fn host_pthread_setcanceltype(kind: c_int, oldtype: *mut c_int) -> c_int;
}

unsafe extern "C-unwind" {
    #[link_name = "pthread_exit"]
    fn host_pthread_exit(retval: *mut c_void) -> !;
}

/// Start a native thread running `start(arg)`.
///
/// # Safety
///
/// `arg` must stay valid until `start` takes ownership of it. On error the
/// thread was not created and ownership of `arg` stays with the caller.
pub(crate) unsafe fn spawn_native(
    joinable: bool,
    start: StartRoutine,
    arg: *mut c_void,
) -> Result<RawThread, ThreadError> {
    let mut attr = MaybeUninit::<libc::pthread_attr_t>::uninit();
    // SAFETY: `attr` is writable storage for one attribute object.
    let rc = unsafe { libc::pthread_attr_init(attr.as_mut_ptr()) };
    if rc != 0 {
        return Err(ThreadError::Alloc {
            what: "thread attributes",
            errno: rc,
        });
    }

    let detach_state = if joinable {
        libc::PTHREAD_CREATE_JOINABLE
    } else {
        libc::PTHREAD_CREATE_DETACHED
    };
    // SAFETY: `attr` was initialized above.
    let mut rc = unsafe { libc::pthread_attr_setdetachstate(attr.as_mut_ptr(), detach_state) };
    let mut native = MaybeUninit::<libc::pthread_t>::uninit();
    if rc == 0 {
        // SAFETY: `attr` is initialized, `native` is writable, and the caller
        // guarantees `arg` for `start`.
        rc = unsafe { host_pthread_create(native.as_mut_ptr(), attr.as_ptr(), start, arg) };
    }
    // SAFETY: `attr` was initialized above and is destroyed exactly once.
    unsafe { libc::pthread_attr_destroy(attr.as_mut_ptr()) };

    if rc != 0 {
        return Err(ThreadError::Spawn { errno: rc });
    }
    // SAFETY: pthread_create wrote the id on success.
    Ok(unsafe { native.assume_init() })
}

/// Wait for `native` to exit and report how it ended.
pub(crate) fn join(native: RawThread) -> Result<ExitKind, i32> {
    let mut value: *mut c_void = ptr::null_mut();
    // SAFETY: the caller claimed `native` from a handle slot, so it is a
    // joinable thread that nobody else joins or detaches.
    let rc = unsafe { libc::pthread_join(native, &mut value) };
    if rc != 0 {
        return Err(rc);
    }
    if value.addr() == CANCELED_ADDR {
        Ok(ExitKind::Cancelled)
    } else {
        Ok(ExitKind::Returned)
    }
}

/// Ask `native` to cancel. Only the request is made here.
pub(crate) fn cancel(native: RawThread) -> Result<(), i32> {
    // SAFETY: `native` is an unreaped thread id owned by a handle slot.
    match unsafe { host_pthread_cancel(native) } {
        0 => Ok(()),
        errno => Err(errno),
    }
}

pub(crate) fn detach(native: RawThread) -> Result<(), i32> {
    // SAFETY: `native` is an unreaped joinable thread id owned by a handle slot.
    match unsafe { libc::pthread_detach(native) } {
        0 => Ok(()),
        errno => Err(errno),
    }
}

/// Whether the calling thread is `native`.
pub(crate) fn is_current(native: RawThread) -> bool {
    // SAFETY: pthread_self and pthread_equal have no preconditions.
    unsafe { libc::pthread_equal(native, libc::pthread_self()) != 0 }
}

/// Allow cancellation of the calling thread in `mode`.
pub(crate) fn enable_cancellation(mode: CancelMode) {
    let kind = match mode {
        CancelMode::Asynchronous => cancel::ASYNCHRONOUS,
        CancelMode::Deferred => cancel::DEFERRED,
    };
    let mut old = 0;
    // SAFETY: both calls only touch the calling thread and write `old`.
    unsafe {
        host_pthread_setcanceltype(kind, &mut old);
        host_pthread_setcancelstate(cancel::ENABLE, &mut old);
    }
}

/// Block cancellation of the calling thread.
pub(crate) fn disable_cancellation() {
    let mut old = 0;
    // SAFETY: only touches the calling thread and writes `old`.
    unsafe {
        host_pthread_setcancelstate(cancel::DISABLE, &mut old);
    }
}

/// End the calling thread.
///
/// # Safety
///
/// See [`crate::thread::exit`].
pub(crate) unsafe fn exit_current() -> ! {
    // SAFETY: forwarded to the caller.
    unsafe { host_pthread_exit(ptr::null_mut()) }
}
