//! Cross-thread wake-up tests for the condition-gated values.

use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use spindle::gate::{Barrier, Counter, Notify, NotifyValue};
use spindle::pool::Pool;

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        spindle::init_tracing();
    });
}

#[test]
fn counter_latch_for_pool_tasks() {
    init_test_tracing();

    const TASKS: i64 = 64;
    let pool = Pool::new(4).unwrap();
    let remaining = Arc::new(Counter::new(TASKS));

    for _ in 0..TASKS {
        let remaining = Arc::clone(&remaining);
        pool.push(move |_| {
            remaining.dec();
        })
        .unwrap();
    }

    assert_eq!(remaining.wait_eq(0), 0);
}

#[test]
fn waiters_never_see_a_violating_value() {
    init_test_tracing();

    let counter = Arc::new(Counter::new(0));

    let waiters: Vec<_> = (1..=8)
        .map(|k: i64| {
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                let seen = counter.wait(|&v| v % 10 == 0 && v >= k * 10);
                assert!(seen % 10 == 0 && seen >= k * 10, "waiter {k} saw {seen}");
                seen
            })
        })
        .collect();

    for _ in 0..100 {
        counter.inc();
        thread::yield_now();
    }

    for w in waiters {
        assert!(w.join().unwrap() >= 10);
    }
}

#[test]
fn barrier_opens_on_transition() {
    init_test_tracing();

    let ready = Arc::new(Barrier::new(0u32, |n: &u32| *n >= 3));

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let ready = Arc::clone(&ready);
            thread::spawn(move || ready.wait_value())
        })
        .collect();

    for _ in 0..3 {
        thread::sleep(Duration::from_millis(5));
        ready.update(|n| *n += 1);
    }

    for w in waiters {
        assert!(w.join().unwrap() >= 3);
    }
    assert!(ready.is_open());
}

#[test]
fn notify_one_hands_values_to_waiters() {
    init_test_tracing();

    let slot = Arc::new(NotifyValue::with_mode(None::<u32>, Notify::One));

    let waiter = {
        let slot = Arc::clone(&slot);
        thread::spawn(move || slot.wait(|v| v.is_some()))
    };

    thread::sleep(Duration::from_millis(10));
    slot.set(Some(5));

    assert_eq!(waiter.join().unwrap(), Some(5));
}

#[test]
fn timed_wait_gives_up() {
    init_test_tracing();

    let counter = Counter::new(0);
    assert_eq!(counter.wait_for(|&v| v > 0, Duration::from_millis(20)), None);

    counter.set(1);
    assert_eq!(counter.wait_for(|&v| v > 0, Duration::from_millis(20)), Some(1));
}
