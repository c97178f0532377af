use std::fmt::Debug;

use crate::{BufferedStore, Capacity, Queue, Stack, StoreError};

/// The storage capability a [`Pool`][crate::Pool] is written against.
///
/// Implementations hold idle objects on behalf of the pool. Every operation is non-blocking
/// and safe to call concurrently from any number of threads:
///
/// * [`get()`][Self::get] hands out one stored value or reports [`StoreError::Empty`]
///   (nothing stored) or [`StoreError::Closed`] (closed and drained).
/// * [`put()`][Self::put] stores a value or reports [`StoreError::Full`] or
///   [`StoreError::Closed`]. A rejected value is dropped.
/// * [`close()`][Self::close] stops accepting values. Values still stored can be taken out
///   until the backend is drained. Closing twice has no further effect.
/// * [`remove_one()`][Self::remove_one] discards one stored value, if any.
///
/// # Example
///
/// ```rust
/// use recycle_pool::{Capacity, Stack, StorageBackend, StoreError};
///
/// let backend: Box<dyn StorageBackend<u32>> = Box::new(Stack::new(Capacity::Bounded(1)));
///
/// backend.put(1).unwrap();
/// assert_eq!(backend.put(2), Err(StoreError::Full));
/// assert!(backend.remove_one());
/// assert_eq!(backend.get(), Err(StoreError::Empty));
/// ```
pub trait StorageBackend<T>: Debug + Send + Sync {
    /// Takes one stored value out of the backend.
    ///
    /// # Errors
    ///
    /// [`StoreError::Empty`] if nothing is stored, [`StoreError::Closed`] if nothing is
    /// stored and the backend has been closed.
    fn get(&self) -> Result<T, StoreError>;

    /// Stores a value in the backend.
    ///
    /// # Errors
    ///
    /// [`StoreError::Full`] if the backend is at capacity, [`StoreError::Closed`] if the
    /// backend has been closed. In both cases the value is dropped.
    fn put(&self, value: T) -> Result<(), StoreError>;

    /// Stops the backend from accepting new values.
    fn close(&self);

    /// Takes one stored value out of the backend and drops it.
    ///
    /// Returns `true` if a value was discarded, `false` if there was nothing to discard.
    fn remove_one(&self) -> bool;

    /// The number of values currently stored.
    ///
    /// Under concurrent use this is a momentary snapshot.
    fn len(&self) -> usize;

    /// Whether no values are currently stored.
    fn is_empty(&self) -> bool;

    /// The maximum number of values the backend can hold.
    fn capacity(&self) -> Capacity;
}

/// Selects which [`StorageBackend`] a [`Pool`][crate::Pool] is built on.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum BackendKind {
    /// A lock-free last-in-first-out [`Stack`]. Recently returned objects are reused first,
    /// which tends to keep them warm in processor caches.
    Stack,

    /// A lock-free first-in-first-out [`Queue`]. Objects are reused in the order they were
    /// returned.
    Queue,

    /// A channel-backed [`BufferedStore`] with no ordering guarantee. This is the default and
    /// the cheapest choice when ordering does not matter.
    #[default]
    Buffered,
}

impl BackendKind {
    /// Creates an empty backend of this kind.
    pub(crate) fn build<T>(self, capacity: Capacity) -> Box<dyn StorageBackend<T>>
    where
        T: Send + 'static,
    {
        match self {
            Self::Stack => Box::new(Stack::new(capacity)),
            Self::Queue => Box::new(Queue::new(capacity)),
            Self::Buffered => Box::new(BufferedStore::new(capacity)),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn exercise(kind: BackendKind) {
        let backend = kind.build::<String>(Capacity::Bounded(2));

        assert!(backend.is_empty());
        assert_eq!(backend.capacity(), Capacity::Bounded(2));
        assert_eq!(backend.get(), Err(StoreError::Empty));

        backend.put("a".to_string()).unwrap();
        backend.put("b".to_string()).unwrap();
        assert_eq!(backend.put("c".to_string()), Err(StoreError::Full));
        assert_eq!(backend.len(), 2);
        assert!(!backend.is_empty());

        assert!(backend.remove_one());
        assert_eq!(backend.len(), 1);

        backend.close();
        assert_eq!(backend.put("d".to_string()), Err(StoreError::Closed));

        assert!(backend.get().is_ok());
        assert_eq!(backend.get(), Err(StoreError::Closed));
        assert!(!backend.remove_one());
    }

    #[test]
    fn stack_honors_contract() {
        exercise(BackendKind::Stack);
    }

    #[test]
    fn queue_honors_contract() {
        exercise(BackendKind::Queue);
    }

    #[test]
    fn buffered_honors_contract() {
        exercise(BackendKind::Buffered);
    }

    #[test]
    fn default_kind_is_buffered() {
        assert_eq!(BackendKind::default(), BackendKind::Buffered);
    }
}
