#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // Test support code, not tested itself.

//! Private helpers for tests, benchmarks and examples in the `recycle_pool` workspace.

use std::panic;
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::Duration;

/// How long a test may run before the watchdog gives up on it.
const TIMEOUT: Duration = Duration::from_secs(10);

/// Miri executes thread synchronization far slower, so it gets more time.
const MIRI_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs `test_fn` on a separate thread and fails the test if it does not finish in time.
///
/// Pool tests involve background threads and lock-free retry loops. A bug in either tends to
/// show up as a hang rather than a failure, and a hang would stall the whole test run.
///
/// Setting the `MUTATION_TESTING` environment variable to `1` disables the watchdog so that
/// mutation testing tools can detect hangs with their own timeouts.
///
/// # Panics
///
/// Panics if the test does not finish in time. If `test_fn` panics, the panic is propagated.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// let answer = with_watchdog(|| 6 * 7);
/// assert_eq!(answer, 42);
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let timeout = if cfg!(miri) { MIRI_TIMEOUT } else { TIMEOUT };

    let (tx, rx) = mpsc::channel();

    let worker = thread::spawn(move || {
        // If the receiver gave up waiting, nobody wants the result any more.
        _ = tx.send(test_fn());
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            worker.join().expect("test thread finished after sending its result");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("test did not finish within {timeout:?}");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match worker.join() {
            Ok(()) => panic!("test thread exited without producing a result"),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

/// Runs `f` on `thread_count` threads at once and collects the results in thread order.
///
/// The threads wait on a shared barrier before calling `f`, so they start as close to
/// simultaneously as the platform allows. Each call receives its thread index.
///
/// # Panics
///
/// Propagates a panic from any of the threads.
pub fn run_on_threads<F, R>(thread_count: usize, f: F) -> Vec<R>
where
    F: Fn(usize) -> R + Send + Sync + 'static,
    R: Send + 'static,
{
    let f = Arc::new(f);
    let barrier = Arc::new(Barrier::new(thread_count));

    let handles = (0..thread_count)
        .map(|index| {
            let f = Arc::clone(&f);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                barrier.wait();
                f(index)
            })
        })
        .collect::<Vec<_>>();

    handles
        .into_iter()
        .map(|handle| match handle.join() {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        })
        .collect()
}

/// Whether two floating point values are within `tolerance` of each other.
#[must_use]
pub fn approx_eq(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}
