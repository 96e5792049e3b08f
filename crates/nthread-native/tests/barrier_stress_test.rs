use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use nthread_native::{mem_barrier, spawn};

const ROUNDS: u64 = 20_000;

/// One-slot mailbox: the producer publishes `payload` then bumps `seq`.
struct Mailbox {
    payload: AtomicU64,
    seq: AtomicU64,
}

#[test]
fn consumer_never_sees_stale_payload() {
    let mailbox = Arc::new(Mailbox {
        payload: AtomicU64::new(0),
        seq: AtomicU64::new(0),
    });

    let producer = {
        let mailbox = Arc::clone(&mailbox);
        spawn(move || {
            for round in 1..=ROUNDS {
                // Wait until the consumer drained the previous round.
                while mailbox.seq.load(Ordering::Relaxed) != (round - 1) * 2 {
                    std::hint::spin_loop();
                }
                mailbox.payload.store(round * 7, Ordering::Relaxed);
                mem_barrier();
                mailbox.seq.store(round * 2 - 1, Ordering::Relaxed);
            }
        })
        .unwrap()
    };

    let consumer = {
        let mailbox = Arc::clone(&mailbox);
        spawn(move || {
            let mut mismatches = 0_u64;
            for round in 1..=ROUNDS {
                while mailbox.seq.load(Ordering::Relaxed) != round * 2 - 1 {
                    std::hint::spin_loop();
                }
                mem_barrier();
                if mailbox.payload.load(Ordering::Relaxed) != round * 7 {
                    mismatches += 1;
                }
                mem_barrier();
                mailbox.seq.store(round * 2, Ordering::Relaxed);
            }
            mismatches
        })
        .unwrap()
    };

    assert_eq!(producer.join(), Ok(()));
    assert_eq!(consumer.join(), Ok(0));
    assert_eq!(mailbox.seq.load(Ordering::Relaxed), ROUNDS * 2);
}

#[test]
fn barrier_is_callable_from_many_threads() {
    let total = Arc::new(AtomicU64::new(0));
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let total = Arc::clone(&total);
            spawn(move || {
                for _ in 0..1_000 {
                    mem_barrier();
                    total.fetch_add(1, Ordering::Relaxed);
                }
            })
            .unwrap()
        })
        .collect();
    for worker in &workers {
        assert_eq!(worker.join(), Ok(()));
    }
    assert_eq!(total.load(Ordering::Relaxed), 8_000);
}
