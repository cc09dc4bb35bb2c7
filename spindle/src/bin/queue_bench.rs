//! MPMC queue throughput benchmark.
//!
//! Usage:
//!     cargo run --release --bin queue_bench
//!
//! Environment variables:
//!     PRODUCERS=2      Producer threads (default: 2)
//!     CONSUMERS=2      Consumer threads (default: 2)
//!     CAPACITY=1024    Queue capacity (default: 1024)
//!     ITERATIONS=N     Values pushed per producer (default: 1 << 22)
//!     PIN_CPUS=1       Pin thread k to CPU k (default: off)

use std::env;
use std::hint;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use minstant::Instant;
use spindle::queue::Queue;

type Payload = u64;

#[derive(Debug, Clone, Copy)]
struct BenchConfig {
    producers: usize,
    consumers: usize,
    capacity: usize,
    iterations: usize,
    pin: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl BenchConfig {
    fn from_env() -> Self {
        Self {
            producers: env_or("PRODUCERS", 2).max(1),
            consumers: env_or("CONSUMERS", 2).max(1),
            capacity: env_or("CAPACITY", 1024),
            iterations: env_or("ITERATIONS", 1 << 22),
            pin: env_or("PIN_CPUS", 0u8) != 0,
        }
    }
}

fn pin_to_cpu(pin: bool, id: usize) {
    if pin {
        core_affinity::set_for_current(core_affinity::CoreId { id });
    }
}

/// Every producer pushes `iterations` values; consumers drain until all are seen.
fn bench_throughput(config: BenchConfig, blocking: bool) {
    let queue = match Queue::<Payload>::new(config.capacity) {
        Ok(q) => Arc::new(q),
        Err(e) => {
            eprintln!("cannot create queue: {e}");
            std::process::exit(1);
        }
    };

    let total = config.producers * config.iterations;
    let consumed = Arc::new(AtomicUsize::new(0));
    let ready = Arc::new(AtomicUsize::new(0));
    let go = Arc::new(AtomicBool::new(false));
    let threads = config.producers + config.consumers;

    let mut handles: Vec<thread::JoinHandle<Payload>> = Vec::with_capacity(threads);

    for p in 0..config.producers {
        let queue = Arc::clone(&queue);
        let ready = Arc::clone(&ready);
        let go = Arc::clone(&go);
        handles.push(thread::spawn(move || {
            pin_to_cpu(config.pin, p);
            ready.fetch_add(1, Ordering::AcqRel);
            while !go.load(Ordering::Acquire) {
                hint::spin_loop();
            }

            for i in 0..config.iterations as Payload {
                if blocking {
                    queue.push(i);
                } else {
                    let mut value = i;
                    while let Err(back) = queue.try_push(value) {
                        value = back;
                        hint::spin_loop();
                    }
                }
            }
            0
        }));
    }

    for c in 0..config.consumers {
        let queue = Arc::clone(&queue);
        let consumed = Arc::clone(&consumed);
        let ready = Arc::clone(&ready);
        let go = Arc::clone(&go);
        handles.push(thread::spawn(move || {
            pin_to_cpu(config.pin, config.producers + c);
            ready.fetch_add(1, Ordering::AcqRel);
            while !go.load(Ordering::Acquire) {
                hint::spin_loop();
            }

            let mut sum: Payload = 0;
            if blocking {
                // Fixed share per consumer, so no pop waits on a value that never comes.
                let share = total / config.consumers + usize::from(c < total % config.consumers);
                for _ in 0..share {
                    sum = sum.wrapping_add(queue.pop());
                }
                return sum;
            }

            while consumed.load(Ordering::Relaxed) < total {
                match queue.try_pop() {
                    Some(v) => {
                        sum = sum.wrapping_add(v);
                        consumed.fetch_add(1, Ordering::Relaxed);
                    }
                    None => hint::spin_loop(),
                }
            }
            sum
        }));
    }

    while ready.load(Ordering::Acquire) < threads {
        hint::spin_loop();
    }

    let start = Instant::now();
    go.store(true, Ordering::Release);

    let mut sum: Payload = 0;
    for h in handles {
        match h.join() {
            Ok(partial) => sum = sum.wrapping_add(partial),
            Err(_) => {
                eprintln!("benchmark thread panicked");
                std::process::exit(1);
            }
        }
    }
    let elapsed = start.elapsed();

    let n = config.iterations as Payload;
    let expected = (config.producers as Payload).wrapping_mul(n * n.saturating_sub(1) / 2);
    if sum != expected {
        eprintln!("Data corruption: expected sum {expected}, got {sum}");
        std::process::exit(1);
    }

    let ops_per_ms = total as u128 * 1_000_000 / elapsed.as_nanos().max(1);
    let mode = if blocking { "push/pop" } else { "try_push/try_pop" };
    println!("  {mode:<18} {ops_per_ms} ops/ms");
}

fn main() {
    spindle::init_tracing();

    let config = BenchConfig::from_env();
    println!(
        "spindle MPMC (producers={}, consumers={}, capacity={}, iters={}, pinned={}):",
        config.producers, config.consumers, config.capacity, config.iterations, config.pin
    );

    bench_throughput(config, false);
    bench_throughput(config, true);
}
