//! Thread-safe pool of reusable objects that shrinks itself when demand drops.
//!
//! A [`Pool`] hands out idle objects when it has them and creates new ones with a
//! caller-supplied factory when it does not. Returned objects are kept for reuse, up to the
//! pool's capacity. A background cleaner tracks how many objects are actually in use and
//! releases idle ones once the pool holds noticeably more than recent demand needs.
//!
//! # Quick start
//!
//! ```rust
//! use recycle_pool::Pool;
//!
//! let pool = Pool::with_capacity(|| Vec::<u8>::with_capacity(1024), 32_usize);
//!
//! let mut buffer = pool.get();
//! buffer.extend_from_slice(b"some payload");
//! buffer.clear();
//! pool.put(buffer);
//!
//! // Or let a guard return the object automatically.
//! {
//!     let mut buffer = pool.checkout();
//!     buffer.push(42);
//! }
//!
//! assert_eq!(pool.stats().in_use, 0);
//! ```
//!
//! # Storage backends
//!
//! Idle objects are held by a [`StorageBackend`], selected via [`BackendKind`]:
//!
//! - [`BufferedStore`] (the default) is a channel buffer with no ordering guarantee.
//! - [`Stack`] is a lock-free last-in-first-out stack. The most recently returned object is
//!   reused first.
//! - [`Queue`] is a lock-free first-in-first-out queue. Objects are reused in return order.
//!
//! The backends can also be used on their own as bounded or unbounded concurrent stores.
//!
//! # Shrinking
//!
//! Every tick (one second by default) the cleaner thread wakes up. Every 5th tick it feeds
//! the peak number of objects in use since the last sample into an [`EwmaTracker`]. Every
//! 10th tick, if the pool accounts for more than 110% of the smoothed estimate, it releases
//! idle objects: up to 10% of the capacity for a bounded pool or a single object for an
//! unbounded one. [`CleanerConfig`] adjusts all of these numbers.
//!
//! # Closing
//!
//! [`Pool::close()`] (also called on drop) stops the cleaner thread, stops the pool from
//! accepting objects and drops every idle object. Using a closed pool is a programming error:
//! [`Pool::try_get()`] and [`Pool::try_put()`] report it as [`Error::Closed`], while
//! [`Pool::get()`] and [`Pool::put()`] panic.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod backend;
mod buffered;
mod builder;
mod capacity;
mod cell;
mod cleaner;
mod error;
mod ewma;
mod metrics;
mod pool;
mod pooled;
mod queue;
mod stack;

pub use backend::*;
pub use buffered::*;
pub use builder::*;
pub use capacity::Capacity;
pub(crate) use capacity::Occupancy;
pub(crate) use cell::Cell;
pub(crate) use cleaner::Cleaner;
pub use error::*;
pub use ewma::*;
pub use pool::{Pool, PoolStats};
pub(crate) use pool::PoolCore;
pub use pooled::*;
pub use queue::*;
pub use stack::*;
