//! Timer and Store Benchmarks
//!
//! Measures virtual-time throughput of merged timers, registry cancellation,
//! and store action dispatch.
//!
//! Run with: `cargo bench`

#![allow(missing_docs)] // Benchmarks don't need extensive docs

use composable_effects_core::{Effect, Never, Reducer, SmallVec, Tick, smallvec};
use composable_effects_runtime::Store;
use composable_effects_testing::TestScheduler;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
struct BenchTimer(u64);

fn next_id() -> BenchTimer {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    BenchTimer(NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Advance one simulated minute of N merged one-second timers.
fn benchmark_merged_timers(c: &mut Criterion) {
    let mut group = c.benchmark_group("merged_timers");

    for timers in [1_u64, 10, 100] {
        group.throughput(Throughput::Elements(timers * 60));
        group.bench_with_input(BenchmarkId::from_parameter(timers), &timers, |b, &timers| {
            b.iter(|| {
                let scheduler = TestScheduler::new();
                let id = next_id();
                let ticks = Arc::new(AtomicU64::new(0));
                let sink = Arc::clone(&ticks);

                let merged = Effect::<Tick, Never>::merge(
                    (0..timers).map(|_| Effect::timer(id, Duration::from_secs(1), &scheduler)),
                );
                let subscription = merged.subscribe_next(move |_| {
                    sink.fetch_add(1, Ordering::Relaxed);
                });

                scheduler.advance(Duration::from_secs(60));
                subscription.dispose();
                black_box(ticks.load(Ordering::Relaxed))
            });
        });
    }

    group.finish();
}

/// Cancel a group of running timers through the registry.
fn benchmark_cancel_group(c: &mut Criterion) {
    let mut group = c.benchmark_group("cancel_group");
    group.throughput(Throughput::Elements(100));

    group.bench_function("cancel_100_timers", |b| {
        let scheduler = TestScheduler::new();
        b.iter(|| {
            let id = next_id();
            let subscriptions: Vec<_> = (0..100)
                .map(|_| Effect::<Tick, Never>::timer(id, Duration::from_secs(1), &scheduler).subscribe(|_| {}))
                .collect();
            Effect::<(), Never>::cancel(id).subscribe(|_| {});
            black_box(subscriptions.len())
        });
    });

    group.finish();
}

#[derive(Clone, Debug, Default)]
struct BenchState {
    counter: i64,
}

#[derive(Clone, Debug)]
enum BenchAction {
    Increment,
}

struct BenchReducer;

impl Reducer for BenchReducer {
    type State = BenchState;
    type Action = BenchAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            BenchAction::Increment => {
                state.counter += 1;
                smallvec![]
            },
        }
    }
}

/// Benchmark Store throughput (actions/sec)
fn benchmark_store_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_throughput");
    group.throughput(Throughput::Elements(1));

    group.bench_function("send_action", |b| {
        let store = Store::new(BenchState::default(), BenchReducer, ());
        b.iter(|| store.send(black_box(BenchAction::Increment)));
    });

    group.bench_function("send_with_observer", |b| {
        let store = Store::new(BenchState::default(), BenchReducer, ());
        let _observer = store.subscribe(|state| {
            black_box(state.counter);
        });
        b.iter(|| store.send(black_box(BenchAction::Increment)));
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_merged_timers,
    benchmark_cancel_group,
    benchmark_store_throughput
);
criterion_main!(benches);
