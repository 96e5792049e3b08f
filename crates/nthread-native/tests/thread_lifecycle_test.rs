use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use nthread_native::{
    CancelMode, Disposition, Mutex, MutexKind, ThreadBuilder, ThreadError, ThreadHandle,
    ThreadState, spawn,
};

const SENTINEL: u64 = 0xdead_beef;

fn wait_until(label: &str, timeout: Duration, mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        if start.elapsed() > timeout {
            panic!("timeout waiting for {label}");
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn looping_thread(mode: CancelMode) -> ThreadHandle<u32> {
    ThreadBuilder::new()
        .cancel_mode(mode)
        .spawn(|| -> u32 {
            loop {
                std::thread::sleep(Duration::from_millis(1));
            }
        })
        .unwrap()
}

#[test]
fn join_returns_routine_result() {
    let handle = spawn(|| {
        std::thread::sleep(Duration::from_millis(10));
        SENTINEL
    })
    .unwrap();
    assert_eq!(handle.join(), Ok(SENTINEL));
    assert_eq!(handle.state(), ThreadState::Joined(Disposition::Succeeded));
    assert!(handle.is_finished());
}

#[test]
fn join_twice_reports_same_outcome() {
    let handle = spawn(|| vec![1_u8, 2, 3]).unwrap();
    let first = handle.join();
    let second = handle.join();
    assert_eq!(first, Ok(vec![1, 2, 3]));
    assert_eq!(first, second);
    assert_eq!(handle.wait(), Ok(()));
}

#[test]
fn routine_receives_data_unchanged() {
    let handle = ThreadBuilder::new()
        .build(|words: Vec<&'static str>| words.join(" "), vec!["opaque", "data"])
        .unwrap();
    assert_eq!(handle.state(), ThreadState::Created);
    handle.spawn().unwrap();
    assert_eq!(handle.join().as_deref(), Ok("opaque data"));
}

#[test]
fn terminate_after_natural_finish_keeps_result() {
    let handle = spawn(|| SENTINEL).unwrap();
    wait_until("routine to finish", Duration::from_secs(5), || handle.is_finished());

    assert_eq!(handle.terminate(), Ok(()));
    assert_eq!(handle.state(), ThreadState::Terminated(Disposition::Succeeded));
    assert_eq!(handle.join(), Ok(SENTINEL));
    assert_eq!(handle.with_result(|v| *v), Some(SENTINEL));
}

#[test]
fn terminate_stops_looping_routine() {
    let handle = looping_thread(CancelMode::Asynchronous);
    std::thread::sleep(Duration::from_millis(5));

    assert_eq!(handle.terminate(), Ok(()));
    assert_eq!(handle.state(), ThreadState::Terminated(Disposition::Succeeded));
    assert!(!handle.is_finished());
    // No result exists and nothing is left to wait for.
    assert_eq!(handle.join(), Err(ThreadError::Terminated));
    assert_eq!(handle.terminate(), Ok(()));
    assert!(!handle.is_self());
}

#[test]
fn deferred_cancel_lands_at_cancellation_point() {
    let handle = looping_thread(CancelMode::Deferred);
    assert_eq!(handle.cancel_mode(), CancelMode::Deferred);
    assert_eq!(handle.terminate(), Ok(()));
    assert_eq!(handle.wait(), Err(ThreadError::Terminated));
}

#[test]
fn terminate_loses_to_returning_routine_and_join_collects() {
    let started = Arc::new(AtomicBool::new(false));
    let release = Arc::new(AtomicBool::new(false));
    let handle = {
        let started = Arc::clone(&started);
        let release = Arc::clone(&release);
        ThreadBuilder::new()
            .cancel_mode(CancelMode::Deferred)
            .spawn(move || {
                started.store(true, Ordering::Release);
                // Spins without reaching a cancellation point.
                while !release.load(Ordering::Acquire) {
                    std::hint::spin_loop();
                }
                7_u32
            })
            .unwrap()
    };
    wait_until("routine to start", Duration::from_secs(5), || started.load(Ordering::Acquire));
    let releaser = {
        let release = Arc::clone(&release);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            release.store(true, Ordering::Release);
        })
    };

    let lost = ThreadError::FinishedBeforeCancel;
    assert_eq!(handle.terminate(), Err(lost));
    assert_eq!(handle.state(), ThreadState::Terminated(Disposition::Failed(lost)));
    assert_eq!(handle.terminate(), Err(lost));

    // The stored result survives the failed terminate.
    assert_eq!(handle.join(), Ok(7));
    assert_eq!(handle.state(), ThreadState::Joined(Disposition::Succeeded));
    assert_eq!(handle.join(), Ok(7));
    assert_eq!(handle.terminate(), Ok(()));
    releaser.join().unwrap();
}

#[test]
fn terminate_after_join_keeps_joined_outcome() {
    let handle = spawn(|| {
        std::thread::sleep(Duration::from_millis(5));
        SENTINEL
    })
    .unwrap();
    assert!(handle.is_joinable());

    assert_eq!(handle.join(), Ok(SENTINEL));
    assert_eq!(handle.terminate(), Ok(()));
    assert_eq!(handle.state(), ThreadState::Joined(Disposition::Succeeded));
    assert_eq!(handle.join(), Ok(SENTINEL));
    assert!(!handle.is_self());
}

#[test]
fn join_on_never_spawned_handle_fails_fast() {
    let handle = ThreadBuilder::new().build(|()| 1_u8, ()).unwrap();
    assert_eq!(handle.join(), Err(ThreadError::NotSpawned));
    assert_eq!(handle.join(), Err(ThreadError::NotSpawned));
    assert_eq!(
        handle.state(),
        ThreadState::Joined(Disposition::Failed(ThreadError::NotSpawned))
    );
    assert_eq!(handle.spawn(), Err(ThreadError::AlreadySpawned));
}

#[test]
fn terminate_on_never_spawned_handle_succeeds() {
    let handle = ThreadBuilder::new().build(|()| 1_u8, ()).unwrap();
    assert_eq!(handle.terminate(), Ok(()));
    assert_eq!(handle.join(), Err(ThreadError::Terminated));
    assert!(!handle.is_self());
}

#[test]
fn second_spawn_is_rejected() {
    let runs = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&runs);
    let handle = ThreadBuilder::new()
        .build(
            move |()| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            (),
        )
        .unwrap();
    handle.spawn().unwrap();
    assert_eq!(handle.spawn(), Err(ThreadError::AlreadySpawned));
    assert_eq!(handle.join(), Ok(()));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn counter_increments_are_not_lost() {
    const THREADS: usize = 16;
    const ITERS: u64 = 1_000;

    let counter = Arc::new(Mutex::with_kind(0_u64, MutexKind::Normal).unwrap());
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let counter = Arc::clone(&counter);
            spawn(move || {
                for _ in 0..ITERS {
                    *counter.lock() += 1;
                }
            })
            .unwrap()
        })
        .collect();
    for handle in &handles {
        assert_eq!(handle.join(), Ok(()));
    }
    assert_eq!(*counter.lock(), THREADS as u64 * ITERS);
}

#[test]
fn concurrent_joiners_share_one_result() {
    let handle = spawn(|| {
        std::thread::sleep(Duration::from_millis(20));
        String::from("shared")
    })
    .unwrap();

    let results: Vec<_> = std::thread::scope(|scope| {
        let joiners: Vec<_> = (0..4).map(|_| scope.spawn(|| handle.join())).collect();
        joiners.into_iter().map(|j| j.join().unwrap()).collect()
    });
    for result in results {
        assert_eq!(result.as_deref(), Ok("shared"));
    }
    assert_eq!(handle.state(), ThreadState::Joined(Disposition::Succeeded));
}

#[test]
fn detached_thread_result_is_collected() {
    let handle = ThreadBuilder::new().joinable(false).spawn(|| 5_i32).unwrap();
    assert!(!handle.is_joinable());
    assert_eq!(handle.join(), Ok(5));
    assert_eq!(handle.terminate(), Ok(()));
}

#[test]
fn detached_thread_cannot_be_terminated() {
    let release = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&release);
    let handle = ThreadBuilder::new()
        .joinable(false)
        .spawn(move || {
            while !gate.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_millis(1));
            }
            9_u16
        })
        .unwrap();

    assert_eq!(handle.terminate(), Err(ThreadError::NotJoinable));
    assert_eq!(handle.terminate(), Err(ThreadError::NotJoinable));
    release.store(true, Ordering::Release);
    // The routine was never stopped, so a join still collects its result.
    assert_eq!(handle.join(), Ok(9));
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SelfReport {
    is_self: bool,
    join: Option<ThreadError>,
    terminate: Option<ThreadError>,
}

#[test]
fn thread_recognizes_itself_and_refuses_self_operations() {
    let slot: Arc<OnceLock<Arc<ThreadHandle<SelfReport>>>> = Arc::new(OnceLock::new());
    let inner = Arc::clone(&slot);
    let handle = Arc::new(
        ThreadBuilder::new()
            .build(
                move |()| {
                    let me = loop {
                        if let Some(handle) = inner.get() {
                            break Arc::clone(handle);
                        }
                        std::thread::sleep(Duration::from_millis(1));
                    };
                    SelfReport {
                        is_self: me.is_self(),
                        join: me.join().err(),
                        terminate: me.terminate().err(),
                    }
                },
                (),
            )
            .unwrap(),
    );
    assert!(slot.set(Arc::clone(&handle)).is_ok());
    handle.spawn().unwrap();

    assert!(!handle.is_self());
    let report = handle.join().unwrap();
    assert_eq!(
        report,
        SelfReport {
            is_self: true,
            join: Some(ThreadError::SelfDeadlock),
            terminate: Some(ThreadError::SelfDeadlock),
        }
    );
    // Self-operations recorded nothing.
    assert_eq!(handle.state(), ThreadState::Joined(Disposition::Succeeded));
}

#[test]
fn join_and_terminate_race_settles_consistently() {
    for round in 0..50_u64 {
        let handle = spawn(move || {
            let mut acc = round;
            for i in 0..(round * 500) {
                acc = std::hint::black_box(acc.wrapping_add(i));
            }
            round
        })
        .unwrap();

        let (joined, terminated) = std::thread::scope(|scope| {
            let joiner = scope.spawn(|| handle.join());
            let terminator = scope.spawn(|| handle.terminate());
            (joiner.join().unwrap(), terminator.join().unwrap())
        });

        assert_eq!(handle.join(), joined, "round {round}");
        match joined {
            Ok(value) => assert_eq!(value, round),
            Err(err) => assert_eq!(err, ThreadError::Terminated, "round {round}"),
        }
        match terminated {
            Ok(()) | Err(ThreadError::FinishedBeforeCancel) => {}
            Err(err) => panic!("round {round}: unexpected terminate error {err}"),
        }
        assert!(handle.state().is_terminal());
    }
}

#[test]
fn exit_ends_thread_without_touching_handle() {
    let reached = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&reached);
    let handle = ThreadBuilder::new()
        .joinable(false)
        .spawn(move || -> u32 {
            flag.store(true, Ordering::Release);
            // SAFETY: nothing between this routine and the thread entry catches unwinds.
            unsafe { nthread_native::exit() }
        })
        .unwrap();

    wait_until("routine to start", Duration::from_secs(5), || {
        reached.load(Ordering::Acquire)
    });
    std::thread::sleep(Duration::from_millis(10));
    assert!(!handle.is_finished());
    assert_eq!(handle.state(), ThreadState::Running);
}

#[test]
fn dropping_unjoined_handle_detaches() {
    let done = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&done);
    let handle = spawn(move || {
        std::thread::sleep(Duration::from_millis(5));
        flag.store(true, Ordering::Release);
    })
    .unwrap();
    drop(handle);
    wait_until("detached routine", Duration::from_secs(5), || {
        done.load(Ordering::Acquire)
    });
}

#[test]
fn debug_output_names_state() {
    let handle = ThreadBuilder::new().build(|()| 0_u8, ()).unwrap();
    let text = format!("{handle:?}");
    assert!(text.contains("Created"), "{text}");
}
