use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nthread_core::mutex::{MutexContractOp, held_lock_errno};
use nthread_native::{Mutex, MutexGuard, MutexKind, spawn};

#[test]
fn try_lock_fails_while_another_thread_holds() {
    let mutex = Arc::new(Mutex::with_kind(0_u32, MutexKind::Normal).unwrap());
    let held = Arc::new(AtomicBool::new(false));
    let release = Arc::new(AtomicBool::new(false));

    let holder = {
        let mutex = Arc::clone(&mutex);
        let held = Arc::clone(&held);
        let release = Arc::clone(&release);
        spawn(move || {
            let mut guard = mutex.lock();
            *guard = 1;
            held.store(true, Ordering::Release);
            while !release.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap()
    };

    while !held.load(Ordering::Acquire) {
        std::thread::yield_now();
    }
    assert_eq!(
        held_lock_errno(MutexKind::Normal, MutexContractOp::TryLock),
        libc::EBUSY
    );
    assert!(mutex.try_lock().is_none());

    release.store(true, Ordering::Release);
    assert_eq!(holder.join(), Ok(()));
    assert_eq!(*mutex.try_lock().expect("free after holder exits"), 1);
}

#[test]
fn blocking_lock_waits_for_release() {
    let mutex = Arc::new(Mutex::with_kind(Vec::new(), MutexKind::ErrorCheck).unwrap());
    let guard = mutex.lock();

    let waiter = {
        let mutex = Arc::clone(&mutex);
        spawn(move || mutex.lock().push("waiter")).unwrap()
    };
    std::thread::sleep(Duration::from_millis(10));
    assert!(!waiter.is_finished());

    let mut guard = guard;
    guard.push("owner");
    MutexGuard::unlock(guard);

    assert_eq!(waiter.join(), Ok(()));
    assert_eq!(*mutex.lock(), vec!["owner", "waiter"]);
}

#[test]
#[should_panic(expected = "relocked")]
fn errorcheck_relock_panics() {
    let mutex = Mutex::with_kind(0_u8, MutexKind::ErrorCheck).unwrap();
    assert_eq!(mutex.kind(), MutexKind::ErrorCheck);
    let _first = mutex.lock();
    let _second = mutex.lock();
}

#[test]
fn errorcheck_try_lock_by_owner_is_busy() {
    let mutex = Mutex::with_kind(0_u8, MutexKind::ErrorCheck).unwrap();
    let _guard = mutex.lock();
    assert_eq!(
        held_lock_errno(MutexKind::ErrorCheck, MutexContractOp::TryLock),
        libc::EBUSY
    );
    assert!(mutex.try_lock().is_none());
}

#[test]
fn mutex_moves_after_creation() {
    let mutex = Mutex::with_kind(String::from("a"), MutexKind::Normal).unwrap();
    let boxed = Box::new(mutex);
    boxed.lock().push('b');
    let moved = *boxed;
    assert_eq!(moved.into_inner(), "ab");
}
