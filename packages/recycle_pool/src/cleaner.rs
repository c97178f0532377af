//! Background thread that keeps the demand estimate current and shrinks oversized pools.

use std::panic;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace};

use crate::{CleanerConfig, PoolCore};

/// Handle to a running cleaner thread.
///
/// The thread stops when the handle's stop sender is dropped. [`stop()`][Self::stop] does
/// that and waits for the thread to exit.
#[derive(Debug)]
pub(crate) struct Cleaner {
    // Nothing is ever sent. Dropping the sender disconnects the channel, which is the stop
    // signal observed by the thread.
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl Cleaner {
    pub(crate) fn start<T>(core: Arc<PoolCore<T>>, config: CleanerConfig) -> Self
    where
        T: Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);

        let thread = thread::Builder::new()
            .name("recycle-pool-cleaner".to_string())
            .spawn(move || {
                debug!(tick_interval = ?config.tick_interval, "cleaner thread started");
                cleaner_loop(&core, &config, &stop_rx);
                debug!("cleaner thread exiting");
            })
            .expect("failed to spawn cleaner thread: thread spawning failure is not supported");

        Self {
            stop: stop_tx,
            thread,
        }
    }

    /// Signals the thread to stop and blocks until it has exited.
    ///
    /// The thread checks for the signal between ticks, so this takes at most one tick plus
    /// the duration of an in-progress cleaning pass.
    pub(crate) fn stop(self) {
        let Self { stop, thread } = self;

        drop(stop);

        if let Err(payload) = thread.join() {
            // The cleaner only touches atomics and the backend. A panic there means the pool
            // is in an unknown state, which the owner must hear about.
            panic::resume_unwind(payload);
        }
    }
}

#[cfg_attr(test, mutants::skip)] // Mutations cause the thread to never exit, hanging tests.
fn cleaner_loop<T>(core: &PoolCore<T>, config: &CleanerConfig, stop: &Receiver<()>) {
    let mut schedule = Schedule::new(config);
    let update_period = config.update_period();

    loop {
        match stop.recv_timeout(config.tick_interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }

        let due = schedule.advance();

        if due.update {
            core.update_estimate(update_period);
        }

        if due.clean {
            let removed = core.clean(config);
            trace!(removed, "cleaning pass finished");
        }
    }
}

/// What the cleaner has to do on a given tick.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct Due {
    update: bool,
    clean: bool,
}

/// Counts ticks and decides which periodic actions fall on each one.
#[derive(Debug)]
struct Schedule {
    ticks: u64,
    update_every: u64,
    clean_every: u64,
}

impl Schedule {
    fn new(config: &CleanerConfig) -> Self {
        Self {
            ticks: 0,
            update_every: u64::from(config.update_every.get()),
            clean_every: u64::from(config.clean_every.get()),
        }
    }

    #[expect(
        clippy::arithmetic_side_effects,
        reason = "the divisors come from NonZero values and a u64 tick count cannot overflow"
    )]
    fn advance(&mut self) -> Due {
        self.ticks += 1;

        Due {
            update: self.ticks % self.update_every == 0,
            clean: self.ticks % self.clean_every == 0,
        }
    }
}
