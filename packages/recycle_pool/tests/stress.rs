//! Multithreaded stress tests for the pool and its storage backends.
//!
//! Each test hammers a shared instance from many threads and then checks that nothing was
//! lost, duplicated or stored beyond capacity.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use recycle_pool::{BackendKind, Capacity, Pool, Queue, Stack, StoreError};
use testing::{run_on_threads, with_watchdog};

const THREADS: usize = 8;
const ITERATIONS: usize = 2_000;

fn unique_id_pool(kind: BackendKind, capacity: Capacity) -> Pool<u64> {
    let next = AtomicU64::new(0);

    Pool::builder()
        .backend(kind)
        .capacity(capacity)
        .cleaner(false)
        .build(move || next.fetch_add(1, Ordering::Relaxed))
}

/// No object may be handed to two holders at once or stored twice.
fn exercise_exclusive_ownership(kind: BackendKind, capacity: Capacity) {
    let pool = Arc::new(unique_id_pool(kind, capacity));

    run_on_threads(THREADS, {
        let pool = Arc::clone(&pool);
        move |_| {
            for _ in 0..ITERATIONS {
                let a = pool.get();
                let b = pool.get();
                assert_ne!(a, b, "the same object was handed out twice");

                pool.put(a);
                pool.put(b);
            }
        }
    });

    let stats = pool.stats();
    assert_eq!(stats.in_use, 0);

    let in_pool = usize::try_from(stats.in_pool).unwrap();

    if let Some(limit) = capacity.limit() {
        assert!(in_pool <= limit);
    }

    let drained = (0..in_pool).map(|_| pool.get()).collect::<HashSet<_>>();
    assert_eq!(drained.len(), in_pool, "an object was stored twice");
}

#[cfg_attr(miri, ignore)]
#[test]
fn stack_pool_exclusive_ownership() {
    with_watchdog(|| exercise_exclusive_ownership(BackendKind::Stack, Capacity::Bounded(16)));
}

#[cfg_attr(miri, ignore)]
#[test]
fn unbounded_stack_pool_exclusive_ownership() {
    with_watchdog(|| exercise_exclusive_ownership(BackendKind::Stack, Capacity::Unbounded));
}

#[cfg_attr(miri, ignore)]
#[test]
fn queue_pool_exclusive_ownership() {
    with_watchdog(|| exercise_exclusive_ownership(BackendKind::Queue, Capacity::Bounded(16)));
}

#[cfg_attr(miri, ignore)]
#[test]
fn unbounded_queue_pool_exclusive_ownership() {
    with_watchdog(|| exercise_exclusive_ownership(BackendKind::Queue, Capacity::Unbounded));
}

#[cfg_attr(miri, ignore)]
#[test]
fn buffered_pool_exclusive_ownership() {
    with_watchdog(|| exercise_exclusive_ownership(BackendKind::Buffered, Capacity::Bounded(16)));
}

#[cfg_attr(miri, ignore)]
#[test]
fn bounded_stack_never_exceeds_capacity() {
    with_watchdog(|| {
        const CAPACITY: usize = 32;

        let stack = Arc::new(Stack::new(Capacity::Bounded(CAPACITY)));

        let accepted = run_on_threads(THREADS, {
            let stack = Arc::clone(&stack);
            move |thread_index| {
                let mut accepted = 0_usize;

                for i in 0..ITERATIONS {
                    match stack.put(thread_index * ITERATIONS + i) {
                        Ok(()) => accepted += 1,
                        Err(StoreError::Full) => {}
                        Err(other) => panic!("unexpected signal {other}"),
                    }

                    assert!(stack.len() <= CAPACITY);

                    if i % 3 == 0 {
                        _ = stack.get();
                    }
                }

                accepted
            }
        });

        assert!(accepted.iter().sum::<usize>() >= CAPACITY);
        assert!(stack.len() <= CAPACITY);
    });
}

#[cfg_attr(miri, ignore)]
#[test]
fn queue_transfers_every_value_exactly_once() {
    with_watchdog(|| {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 5_000;

        let queue = Arc::new(Queue::new(Capacity::Unbounded));

        // Half the threads produce, half consume until they have seen their share.
        let results = run_on_threads(PRODUCERS * 2, {
            let queue = Arc::clone(&queue);
            move |thread_index| {
                if thread_index < PRODUCERS {
                    for i in 0..PER_PRODUCER {
                        queue.put(thread_index * PER_PRODUCER + i).unwrap();
                    }

                    Vec::new()
                } else {
                    let mut received = Vec::with_capacity(PER_PRODUCER);

                    while received.len() < PER_PRODUCER {
                        match queue.get() {
                            Ok(value) => received.push(value),
                            Err(StoreError::Empty) => std::thread::yield_now(),
                            Err(other) => panic!("unexpected signal {other}"),
                        }
                    }

                    received
                }
            }
        });

        let all = results.into_iter().flatten().collect::<HashSet<_>>();
        assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
        assert!(queue.is_empty());
    });
}

#[cfg_attr(miri, ignore)]
#[test]
fn close_during_use_is_observed_by_all_threads() {
    with_watchdog(|| {
        let pool = Arc::new(unique_id_pool(BackendKind::Stack, Capacity::Bounded(64)));

        run_on_threads(THREADS, {
            let pool = Arc::clone(&pool);
            move |thread_index| {
                // Every thread keeps cycling objects until it runs into the closed pool.
                for i in 0.. {
                    if thread_index == 0 && i == ITERATIONS {
                        pool.close();
                    }

                    let Ok(value) = pool.try_get() else {
                        return;
                    };

                    if pool.try_put(value).is_err() {
                        return;
                    }
                }
            }
        });

        assert!(pool.is_closed());
        assert_eq!(pool.stats().in_pool, 0);
    });
}
