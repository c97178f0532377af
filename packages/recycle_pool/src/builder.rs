use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZero;
use std::sync::Arc;
use std::time::Duration;

use new_zealand::nz;

use crate::{BackendKind, Capacity, Cleaner, DEFAULT_HALF_LIFE, EwmaTracker, Pool, PoolCore};

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_UPDATE_EVERY: NonZero<u32> = nz!(5_u32);
const DEFAULT_CLEAN_EVERY: NonZero<u32> = nz!(10_u32);
const DEFAULT_OVERSHOOT_RATIO: f64 = 1.1;
const DEFAULT_SHRINK_PERCENT: u32 = 10;
const DEFAULT_UNBOUNDED_REMOVAL_CAP: usize = 1;
const DEFAULT_WALL_CLOCK_UPDATES: bool = false;

/// Builder for configuring a [`Pool`].
///
/// Obtained from [`Pool::builder()`]. Every setting has a default, so the smallest possible
/// configuration is just a factory:
///
/// ```rust
/// use recycle_pool::Pool;
///
/// let pool = Pool::builder()
///     .stack()
///     .capacity(16_usize)
///     .build(|| Vec::<u8>::with_capacity(4096));
///
/// let buffer = pool.get();
/// assert!(buffer.capacity() >= 4096);
/// pool.put(buffer);
/// ```
#[must_use]
pub struct PoolBuilder<T> {
    backend: BackendKind,
    capacity: Option<Capacity>,
    half_life: Duration,
    cleaner: Option<CleanerConfig>,

    _item: PhantomData<fn() -> T>,
}

impl<T> PoolBuilder<T> {
    pub(crate) fn new() -> Self {
        Self {
            backend: BackendKind::default(),
            capacity: None,
            half_life: DEFAULT_HALF_LIFE,
            cleaner: Some(CleanerConfig::default()),
            _item: PhantomData,
        }
    }

    /// Selects the storage backend. Defaults to [`BackendKind::Buffered`].
    pub fn backend(mut self, kind: BackendKind) -> Self {
        self.backend = kind;
        self
    }

    /// Shorthand for `backend(BackendKind::Stack)`.
    pub fn stack(self) -> Self {
        self.backend(BackendKind::Stack)
    }

    /// Shorthand for `backend(BackendKind::Queue)`.
    pub fn queue(self) -> Self {
        self.backend(BackendKind::Queue)
    }

    /// Limits how many idle objects the pool retains. Objects returned beyond this limit are
    /// dropped.
    ///
    /// If not set, the buffered backend holds up to [`Capacity::DEFAULT`] objects while the
    /// stack and queue backends are unbounded.
    pub fn capacity(mut self, capacity: impl Into<Capacity>) -> Self {
        self.capacity = Some(capacity.into());
        self
    }

    /// Sets how quickly the demand estimate forgets past usage. Defaults to
    /// [`DEFAULT_HALF_LIFE`].
    ///
    /// # Panics
    ///
    /// Panics if `half_life` is zero.
    pub fn half_life(mut self, half_life: Duration) -> Self {
        assert!(
            !half_life.is_zero(),
            "EWMA half-life must be greater than zero"
        );

        self.half_life = half_life;
        self
    }

    /// Enables or disables the background cleaner. Enabled by default.
    ///
    /// Without a cleaner the pool never releases idle objects on its own; they are only
    /// released when the pool is closed.
    pub fn cleaner(mut self, enabled: bool) -> Self {
        self.cleaner = if enabled {
            Some(self.cleaner.unwrap_or_default())
        } else {
            None
        };
        self
    }

    /// Enables the background cleaner with custom tuning.
    pub fn cleaner_config(mut self, config: CleanerConfig) -> Self {
        self.cleaner = Some(config);
        self
    }

    fn effective_capacity(&self) -> Capacity {
        self.capacity.unwrap_or(match self.backend {
            BackendKind::Stack | BackendKind::Queue => Capacity::Unbounded,
            BackendKind::Buffered => Capacity::DEFAULT,
        })
    }
}

impl<T> PoolBuilder<T>
where
    T: Send + 'static,
{
    /// Builds the pool. `factory` is called whenever a caller asks for an object and no idle
    /// one is available.
    ///
    /// If the cleaner is enabled, this starts its background thread.
    pub fn build<F>(self, factory: F) -> Pool<T>
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let capacity = self.effective_capacity();

        let core = Arc::new(PoolCore::new(
            self.backend.build(capacity),
            Box::new(factory),
            EwmaTracker::new(self.half_life),
        ));

        let cleaner = self
            .cleaner
            .map(|config| Cleaner::start(Arc::clone(&core), config));

        Pool::from_parts(core, self.backend, cleaner)
    }
}

impl<T> fmt::Debug for PoolBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("backend", &self.backend)
            .field("capacity", &self.effective_capacity())
            .field("half_life", &self.half_life)
            .field("cleaner", &self.cleaner)
            .finish_non_exhaustive()
    }
}

/// Tuning for the background cleaner that releases idle objects when the pool holds more
/// than recent demand justifies.
///
/// The cleaner wakes up once per tick. Every `update_every` ticks it samples the peak number
/// of objects in use since the previous sample and feeds it to the demand estimate. Every
/// `clean_every` ticks it compares the total number of objects the pool accounts for (idle
/// plus in use) with that estimate and, if the total exceeds the estimate by more than
/// `overshoot_ratio`, releases some idle objects.
///
/// At most `shrink_percent` percent of the capacity is released in one pass for a bounded
/// pool, or `unbounded_removal_cap` objects for an unbounded one.
///
/// Each update advances the estimate's clock by one tick. With
/// [`wall_clock_updates()`][Self::wall_clock_updates] enabled it advances by the time between
/// two updates instead, which shortens the effective half-life by a factor of `update_every`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[must_use]
pub struct CleanerConfig {
    pub(crate) tick_interval: Duration,
    pub(crate) update_every: NonZero<u32>,
    pub(crate) clean_every: NonZero<u32>,
    pub(crate) overshoot_ratio: f64,
    pub(crate) shrink_percent: u32,
    pub(crate) unbounded_removal_cap: usize,
    pub(crate) wall_clock_updates: bool,
}

impl CleanerConfig {
    /// Creates the default tuning: one-second ticks, an estimate update every 5 ticks, a
    /// cleaning pass every 10 ticks, a 10% overshoot allowance and at most 10% of the
    /// capacity (or 1 object, if unbounded) released per pass.
    pub fn new() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            update_every: DEFAULT_UPDATE_EVERY,
            clean_every: DEFAULT_CLEAN_EVERY,
            overshoot_ratio: DEFAULT_OVERSHOOT_RATIO,
            shrink_percent: DEFAULT_SHRINK_PERCENT,
            unbounded_removal_cap: DEFAULT_UNBOUNDED_REMOVAL_CAP,
            wall_clock_updates: DEFAULT_WALL_CLOCK_UPDATES,
        }
    }

    /// Sets the period of the cleaner's clock.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        assert!(
            !interval.is_zero(),
            "cleaner tick interval must be greater than zero"
        );

        self.tick_interval = interval;
        self
    }

    /// Sets how many ticks pass between demand estimate updates.
    pub fn update_every(mut self, ticks: NonZero<u32>) -> Self {
        self.update_every = ticks;
        self
    }

    /// Sets how many ticks pass between cleaning passes.
    pub fn clean_every(mut self, ticks: NonZero<u32>) -> Self {
        self.clean_every = ticks;
        self
    }

    /// Sets how far the pool may exceed the demand estimate before it is shrunk.
    ///
    /// A ratio of 1.1 tolerates 10% more objects than the estimate.
    ///
    /// # Panics
    ///
    /// Panics if `ratio` is negative or not finite.
    pub fn overshoot_ratio(mut self, ratio: f64) -> Self {
        assert!(
            ratio.is_finite() && ratio >= 0.0,
            "overshoot ratio must be a finite non-negative number, got {ratio}"
        );

        self.overshoot_ratio = ratio;
        self
    }

    /// Sets the share of a bounded pool's capacity that one pass may release, in percent.
    ///
    /// # Panics
    ///
    /// Panics if `percent` is greater than 100.
    pub fn shrink_percent(mut self, percent: u32) -> Self {
        assert!(
            percent <= 100,
            "shrink percentage must be at most 100, got {percent}"
        );

        self.shrink_percent = percent;
        self
    }

    /// Sets how many objects one pass may release from an unbounded pool.
    pub fn unbounded_removal_cap(mut self, count: usize) -> Self {
        self.unbounded_removal_cap = count;
        self
    }

    /// Makes each update advance the demand estimate by `tick_interval * update_every`, the
    /// time that actually passed since the previous update, instead of by one tick.
    /// Disabled by default.
    pub fn wall_clock_updates(mut self, enabled: bool) -> Self {
        self.wall_clock_updates = enabled;
        self
    }

    /// Time the demand estimate advances by on each update.
    pub(crate) fn update_period(&self) -> Duration {
        if self.wall_clock_updates {
            self.tick_interval.saturating_mul(self.update_every.get())
        } else {
            self.tick_interval
        }
    }

    /// Most objects one cleaning pass may release from a pool of the given capacity.
    #[expect(
        clippy::integer_division,
        reason = "rounding down is intended, small pools never shrink by a fraction of an object"
    )]
    pub(crate) fn removal_cap(&self, capacity: Capacity) -> usize {
        match capacity {
            Capacity::Bounded(limit) => limit.saturating_mul(self.shrink_percent as usize) / 100,
            Capacity::Unbounded => self.unbounded_removal_cap,
        }
    }
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self::new()
    }
}
