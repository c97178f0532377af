//! Metrics for the object pool.
//!
//! The events use per-thread instances to minimize contention on the hot path.

use nm::{Event, Magnitude};

/// Histogram buckets for the number of idle objects released by one cleaning pass.
///
/// Passes are capped at a tenth of the pool size (or a single object for unbounded pools),
/// so we expect small numbers here.
const CLEANER_REMOVED_BUCKETS: &[Magnitude] = &[0, 1, 2, 5, 10, 20, 50, 100, 500];

thread_local! {
    /// A `get()` found the backend empty and had to call the factory.
    pub(crate) static FACTORY_CREATIONS: Event = Event::builder()
        .name("recycle_pool_factory_creations")
        .build();

    /// A `put()` found the backend full and dropped the object.
    pub(crate) static DISCARDED_ON_PUT: Event = Event::builder()
        .name("recycle_pool_discarded_on_put")
        .build();

    /// Number of idle objects released by a cleaning pass that decided to shrink.
    pub(crate) static CLEANER_REMOVED: Event = Event::builder()
        .name("recycle_pool_cleaner_removed")
        .histogram(CLEANER_REMOVED_BUCKETS)
        .build();
}
