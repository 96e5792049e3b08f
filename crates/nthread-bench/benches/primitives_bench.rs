//! Mutex, condition variable and memory barrier benchmarks.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use nthread_core::MutexKind;
use nthread_native::{Condvar, Mutex, mem_barrier};

fn bench_mutex_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutex_uncontended");

    for kind in [MutexKind::Normal, MutexKind::ErrorCheck] {
        let mutex = Mutex::with_kind(0_u64, kind).expect("mutex");
        group.bench_with_input(BenchmarkId::new("lock_unlock", kind.as_str()), &mutex, |b, m| {
            b.iter(|| {
                *m.lock() += 1;
            });
        });
        group.bench_with_input(BenchmarkId::new("try_lock", kind.as_str()), &mutex, |b, m| {
            b.iter(|| {
                criterion::black_box(m.try_lock().is_some());
            });
        });
    }
    group.finish();
}

fn bench_mutex_create(c: &mut Criterion) {
    c.bench_function("mutex_create_destroy", |b| {
        b.iter(|| {
            let m = Mutex::with_kind([0_u8; 16], MutexKind::Normal).expect("mutex");
            criterion::black_box(m);
        });
    });
}

fn bench_condvar(c: &mut Criterion) {
    let mut group = c.benchmark_group("condvar");
    let cv = Condvar::new().expect("condvar");
    group.bench_function("broadcast_no_waiters", |b| {
        b.iter(|| cv.broadcast());
    });
    let mutex = Mutex::with_kind(true, MutexKind::Normal).expect("mutex");
    group.bench_function("wait_while_satisfied", |b| {
        b.iter(|| {
            let guard = cv.wait_while(mutex.lock(), |ready| !*ready);
            criterion::black_box(*guard);
        });
    });
    group.finish();
}

fn bench_barrier(c: &mut Criterion) {
    c.bench_function("mem_barrier", |b| b.iter(mem_barrier));
}

criterion_group!(
    benches,
    bench_mutex_uncontended,
    bench_mutex_create,
    bench_condvar,
    bench_barrier
);
criterion_main!(benches);
