use std::fmt;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::RwLock;

use crate::{Capacity, StorageBackend, StoreError};

/// A bounded store backed by a channel buffer, with no ordering guarantee promised.
///
/// This is the simplest backend: the channel provides concurrent-safe non-blocking
/// enqueue/dequeue on its own, with no linked structure to maintain. Closing drops the
/// sending side, after which gets drain what is left and then report
/// [`StoreError::Closed`] rather than [`StoreError::Empty`].
///
/// # Example
///
/// ```rust
/// use recycle_pool::{BufferedStore, Capacity, StoreError};
///
/// let store = BufferedStore::new(Capacity::Bounded(1));
///
/// store.close();
///
/// assert_eq!(store.get(), Err::<u32, _>(StoreError::Closed));
/// ```
pub struct BufferedStore<T> {
    /// Wrapped in `RwLock<Option>` to allow dropping the sender to signal closing.
    sender: RwLock<Option<Sender<T>>>,
    receiver: Receiver<T>,
    capacity: Capacity,
}

impl<T> BufferedStore<T> {
    /// Creates an empty store that holds at most `capacity` values.
    ///
    /// A zero capacity store never accepts a value.
    #[must_use]
    pub fn new(capacity: Capacity) -> Self {
        let (sender, receiver) = match capacity {
            Capacity::Bounded(limit) => channel::bounded(limit),
            Capacity::Unbounded => channel::unbounded(),
        };

        Self {
            sender: RwLock::new(Some(sender)),
            receiver,
            capacity,
        }
    }

    /// Stores a value if there is a free slot.
    ///
    /// # Errors
    ///
    /// [`StoreError::Full`] if every slot is occupied, [`StoreError::Closed`] if the store has
    /// been closed. The value is dropped in both cases.
    pub fn put(&self, value: T) -> Result<(), StoreError> {
        let sender = self.sender.read();

        let Some(sender) = sender.as_ref() else {
            return Err(StoreError::Closed);
        };

        sender.try_send(value).map_err(|e| match e {
            TrySendError::Full(_) => StoreError::Full,
            // We hold the receiver ourselves, so this cannot actually happen.
            TrySendError::Disconnected(_) => StoreError::Closed,
        })
    }

    /// Takes one stored value.
    ///
    /// # Errors
    ///
    /// [`StoreError::Empty`] if nothing is stored, [`StoreError::Closed`] if nothing is
    /// stored and the store has been closed.
    pub fn get(&self) -> Result<T, StoreError> {
        self.receiver.try_recv().map_err(|e| match e {
            TryRecvError::Empty => StoreError::Empty,
            TryRecvError::Disconnected => StoreError::Closed,
        })
    }

    /// Takes one stored value and drops it.
    ///
    /// Returns `true` if a value was discarded.
    pub fn remove_one(&self) -> bool {
        self.receiver.try_recv().is_ok()
    }

    /// Stops the store from accepting new values. Values already stored can still be taken.
    pub fn close(&self) {
        *self.sender.write() = None;
    }

    /// Whether [`close()`][Self::close] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// The number of values currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether the store holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// The maximum number of values the store can hold.
    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.capacity
    }
}

impl<T> fmt::Debug for BufferedStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferedStore")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<T: Send> StorageBackend<T> for BufferedStore<T> {
    fn get(&self) -> Result<T, StoreError> {
        Self::get(self)
    }

    fn put(&self, value: T) -> Result<(), StoreError> {
        Self::put(self, value)
    }

    fn close(&self) {
        Self::close(self);
    }

    fn remove_one(&self) -> bool {
        Self::remove_one(self)
    }

    fn len(&self) -> usize {
        Self::len(self)
    }

    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }

    fn capacity(&self) -> Capacity {
        self.capacity
    }
}
