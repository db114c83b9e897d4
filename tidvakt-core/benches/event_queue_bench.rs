#[macro_use]
extern crate criterion;

use std::time::{Duration, UNIX_EPOCH};

use criterion::{black_box, Criterion};
use tidvakt_core::time::queue::EventQueue;
use tidvakt_core::{Simulator, TimeManager};

/// Push a batch of events at scattered fire times, then drain it in order.
fn benchmark_queue_push_pull(c: &mut Criterion) {
    let batch = 10_000u64;

    c.bench_function("event_queue_push_pull", |b| {
        b.iter(|| {
            let queue = EventQueue::new();
            for i in 0..batch {
                let at = UNIX_EPOCH + Duration::from_micros((i * 7_919) % batch);
                queue.push(at, |_, _| {});
            }
            for _ in 0..batch {
                let event = queue.pull();
                black_box(event.map(|event| event.at()));
            }
        })
    });
}

/// Round trip through the event loop: schedule, advance, wake the sleeper.
fn benchmark_simulated_sleep(c: &mut Criterion) {
    let sim = Simulator::new(UNIX_EPOCH);
    if sim.start().is_err() {
        return;
    }

    c.bench_function("simulator_sleep", |b| {
        b.iter(|| black_box(sim.sleep(Duration::from_millis(1))))
    });

    sim.stop();
}

criterion_group!(benches, benchmark_queue_push_pull, benchmark_simulated_sleep);
criterion_main!(benches);
