//! Pool facade and the state it shares with the cleaner thread.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use nm::Event;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::metrics::{CLEANER_REMOVED, DISCARDED_ON_PUT, FACTORY_CREATIONS};
use crate::{
    BackendKind, Capacity, Cleaner, CleanerConfig, EwmaTracker, PoolBuilder, Pooled, Result,
    StorageBackend, StoreError,
};

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// State shared between a [`Pool`] and its cleaner thread.
pub(crate) struct PoolCore<T> {
    backend: Box<dyn StorageBackend<T>>,
    factory: Factory<T>,

    // Signed so that a momentary imbalance between concurrent increments and decrements can
    // never wrap around.
    in_use: AtomicI64,
    in_pool: AtomicI64,
    peak_in_use: AtomicI64,

    ewma: Mutex<EwmaTracker>,
}

impl<T> PoolCore<T> {
    pub(crate) fn new(
        backend: Box<dyn StorageBackend<T>>,
        factory: Factory<T>,
        ewma: EwmaTracker,
    ) -> Self {
        Self {
            backend,
            factory,
            in_use: AtomicI64::new(0),
            in_pool: AtomicI64::new(0),
            peak_in_use: AtomicI64::new(0),
            ewma: Mutex::new(ewma),
        }
    }

    fn get(&self) -> Result<T> {
        match self.backend.get() {
            Ok(value) => {
                self.in_pool.fetch_sub(1, Ordering::Relaxed);
                self.record_checkout();
                Ok(value)
            }
            Err(StoreError::Empty) => {
                FACTORY_CREATIONS.with(Event::observe_once);
                let value = (self.factory)();
                self.record_checkout();
                Ok(value)
            }
            Err(signal) => Err(signal.into()),
        }
    }

    fn put(&self, value: T) -> Result<()> {
        match self.backend.put(value) {
            Ok(()) => {
                self.in_pool.fetch_add(1, Ordering::Relaxed);
                self.in_use.fetch_sub(1, Ordering::Relaxed);
                Ok(())
            }
            Err(StoreError::Full) => {
                DISCARDED_ON_PUT.with(Event::observe_once);
                self.in_use.fetch_sub(1, Ordering::Relaxed);
                Ok(())
            }
            Err(signal) => {
                // The object is dropped either way, so it no longer counts as in use.
                self.in_use.fetch_sub(1, Ordering::Relaxed);
                Err(signal.into())
            }
        }
    }

    fn record_checkout(&self) {
        let in_use = self.in_use.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        self.peak_in_use.fetch_max(in_use, Ordering::Relaxed);
    }

    /// Feeds the peak usage since the previous update into the demand estimate and advances
    /// the estimate's clock by `elapsed`.
    pub(crate) fn update_estimate(&self, elapsed: Duration) {
        let peak = self.peak_in_use.swap(0, Ordering::Relaxed);

        let mut ewma = self.ewma.lock();
        ewma.update(as_f64(peak));
        ewma.tick(elapsed);

        trace!(peak, estimate = ewma.rate(), "demand estimate updated");
    }

    /// Releases idle objects if the pool accounts for more objects than recent demand
    /// justifies. Returns how many were released.
    pub(crate) fn clean(&self, config: &CleanerConfig) -> usize {
        let estimate = self.ewma.lock().rate();

        let current = self
            .in_pool
            .load(Ordering::Relaxed)
            .saturating_add(self.in_use.load(Ordering::Relaxed));

        if as_f64(current) <= estimate * config.overshoot_ratio {
            return 0;
        }

        let cap = config.removal_cap(self.backend.capacity());

        let mut removed = 0_usize;
        while removed < cap && self.backend.remove_one() {
            self.in_pool.fetch_sub(1, Ordering::Relaxed);
            removed = removed.saturating_add(1);
        }

        CLEANER_REMOVED.with(|e| e.observe(removed));
        debug!(
            current,
            estimate,
            removed,
            "pool exceeded demand estimate, released idle objects"
        );

        removed
    }

    /// Drops every idle object. Returns how many were dropped.
    fn release_idle(&self) -> usize {
        let mut released = 0_usize;

        while self.backend.remove_one() {
            self.in_pool.fetch_sub(1, Ordering::Relaxed);
            released = released.saturating_add(1);
        }

        released
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            in_use: self.in_use.load(Ordering::Relaxed),
            in_pool: self.in_pool.load(Ordering::Relaxed),
            peak_in_use: self.peak_in_use.load(Ordering::Relaxed),
            estimated_demand: self.ewma.lock().rate(),
        }
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "object counts stay far below 2^52, and the estimate is a heuristic anyway"
)]
fn as_f64(value: i64) -> f64 {
    value as f64
}

/// A thread-safe pool of reusable objects.
///
/// Callers take objects with [`get()`][Self::get] and hand them back with
/// [`put()`][Self::put]. When no idle object is available, the pool creates a new one with
/// the factory it was built with, so `get()` always succeeds on an open pool. When the pool
/// is at capacity, returned objects are dropped, so `put()` always succeeds too.
///
/// A background cleaner thread tracks the peak number of objects in use and releases idle
/// objects when the pool holds noticeably more than recent demand needs. See
/// [`CleanerConfig`] for how it decides.
///
/// # Lifetime
///
/// [`close()`][Self::close] (called automatically on drop) stops the cleaner, stops the
/// pool from accepting objects and drops every idle object. Taking objects from or returning
/// objects to a closed pool is a usage error: the `try_` variants report it as
/// [`Error::Closed`][crate::Error::Closed] and the plain variants panic.
///
/// # Example
///
/// ```rust
/// use recycle_pool::Pool;
///
/// let pool = Pool::with_capacity(|| String::with_capacity(64), 8_usize);
///
/// let mut message = pool.get();
/// message.push_str("hello");
/// message.clear();
/// pool.put(message);
///
/// assert_eq!(pool.stats().in_pool, 1);
/// ```
pub struct Pool<T> {
    core: Arc<PoolCore<T>>,
    backend: BackendKind,
    closed: AtomicBool,

    // Taken on close. `None` if the pool was built without a cleaner.
    cleaner: Mutex<Option<Cleaner>>,
}

impl<T> Pool<T>
where
    T: Send + 'static,
{
    /// Creates a pool that retains up to [`Capacity::DEFAULT`] idle objects in no particular
    /// order.
    #[must_use]
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::builder().build(factory)
    }

    /// Creates a pool that retains up to `capacity` idle objects in no particular order.
    ///
    /// A negative signed capacity means no limit.
    #[must_use]
    pub fn with_capacity<F>(factory: F, capacity: impl Into<Capacity>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::builder().capacity(capacity).build(factory)
    }

    /// Creates an unbounded pool that reuses the most recently returned object first.
    #[must_use]
    pub fn with_stack<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::builder().stack().build(factory)
    }

    /// Creates a pool that retains up to `capacity` idle objects and reuses the most
    /// recently returned object first.
    #[must_use]
    pub fn with_stack_capacity<F>(factory: F, capacity: impl Into<Capacity>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::builder().stack().capacity(capacity).build(factory)
    }

    /// Creates an unbounded pool that reuses objects in the order they were returned.
    #[must_use]
    pub fn with_queue<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::builder().queue().build(factory)
    }

    /// Creates a pool that retains up to `capacity` idle objects and reuses them in the
    /// order they were returned.
    #[must_use]
    pub fn with_queue_capacity<F>(factory: F, capacity: impl Into<Capacity>) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::builder().queue().capacity(capacity).build(factory)
    }

    /// Creates a builder for configuring the pool.
    pub fn builder() -> PoolBuilder<T> {
        PoolBuilder::new()
    }
}

impl<T> Pool<T> {
    pub(crate) fn from_parts(
        core: Arc<PoolCore<T>>,
        backend: BackendKind,
        cleaner: Option<Cleaner>,
    ) -> Self {
        Self {
            core,
            backend,
            closed: AtomicBool::new(false),
            cleaner: Mutex::new(cleaner),
        }
    }

    /// Takes an idle object from the pool, or creates a new one if none is idle.
    ///
    /// # Panics
    ///
    /// Panics if the pool has been closed and holds no more objects.
    #[must_use]
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(e) => panic!("cannot take an object from the pool: {e}"),
        }
    }

    /// Takes an idle object from the pool, or creates a new one if none is idle.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`][crate::Error::Closed] if the pool has been closed and holds no more
    /// objects.
    pub fn try_get(&self) -> Result<T> {
        self.core.get()
    }

    /// Returns an object to the pool. If the pool is at capacity, the object is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the pool has been closed.
    pub fn put(&self, value: T) {
        if let Err(e) = self.try_put(value) {
            panic!("cannot return an object to the pool: {e}");
        }
    }

    /// Returns an object to the pool. If the pool is at capacity, the object is dropped.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`][crate::Error::Closed] if the pool has been closed. The object is
    /// dropped.
    pub fn try_put(&self, value: T) -> Result<()> {
        self.core.put(value)
    }

    /// Takes an object like [`get()`][Self::get] and wraps it in a guard that returns it to
    /// the pool when dropped.
    ///
    /// # Panics
    ///
    /// Panics if the pool has been closed and holds no more objects.
    #[must_use]
    pub fn checkout(&self) -> Pooled<'_, T> {
        Pooled::new(self, self.get())
    }

    /// A snapshot of the pool's counters.
    ///
    /// The counters are updated independently of each other, so under concurrent use the
    /// snapshot may be momentarily inconsistent.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.core.stats()
    }

    /// The storage backend the pool was built on.
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.backend
    }

    /// The maximum number of idle objects the pool retains.
    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.core.backend.capacity()
    }

    /// Stops the cleaner, stops accepting returned objects and drops every idle object.
    ///
    /// Blocks until the cleaner thread has exited. Calling this more than once has no
    /// further effect.
    ///
    /// Objects must not be returned concurrently with `close()`. A `put()` that races with it
    /// may still store its object after the idle objects have been dropped, in which case the
    /// object stays in the pool until the pool itself is dropped.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Taken out of the mutex before joining so that nothing is held while we block.
        let cleaner = self.cleaner.lock().take();
        if let Some(cleaner) = cleaner {
            cleaner.stop();
        }

        self.core.backend.close();
        let released = self.core.release_idle();

        debug!(released, "pool closed");
    }

    /// Whether [`close()`][Self::close] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn core(&self) -> &PoolCore<T> {
        &self.core
    }
}

impl<T> Drop for Pool<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("backend", &self.core.backend)
            .field("stats", &self.stats())
            .field("closed", &self.is_closed())
            .field("cleaner", &self.cleaner.lock().is_some())
            .finish_non_exhaustive()
    }
}

/// A snapshot of a [`Pool`]'s counters, obtained from [`Pool::stats()`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct PoolStats {
    /// Objects handed out by the pool and not yet returned.
    pub in_use: i64,

    /// Idle objects held by the pool.
    pub in_pool: i64,

    /// Highest `in_use` observed since the cleaner last sampled it.
    pub peak_in_use: i64,

    /// The cleaner's smoothed estimate of how many objects are needed.
    pub estimated_demand: f64,
}
