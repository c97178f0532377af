use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::epoch::{self, Atomic, Guard, Owned, Shared};
use crossbeam::utils::CachePadded;

use crate::{Capacity, Cell, Occupancy, StorageBackend, StoreError};

/// A bounded, lock-free first-in-first-out store.
///
/// The queue is a Michael-Scott linked queue. `head` always points at a sentinel cell whose
/// value has already been consumed (or never existed); the oldest stored value lives in the
/// sentinel's successor. `tail` points at the last cell or, transiently, at its predecessor.
///
/// Enqueueing takes two steps: link the new cell after the last one, then swing `tail`. Any
/// thread that finds `tail` lagging behind helps advance it before retrying, so the window
/// between the two steps never exposes an inconsistent chain. Unlinked cells are reclaimed
/// through epoch-based garbage collection.
///
/// # Example
///
/// ```rust
/// use recycle_pool::{Capacity, Queue, StoreError};
///
/// let queue = Queue::new(Capacity::Unbounded);
///
/// for letter in ["a", "b", "c"] {
///     queue.put(letter).unwrap();
/// }
///
/// assert_eq!(queue.get(), Ok("a"));
/// assert_eq!(queue.get(), Ok("b"));
/// assert_eq!(queue.get(), Ok("c"));
/// assert_eq!(queue.get(), Err(StoreError::Empty));
/// ```
pub struct Queue<T> {
    head: CachePadded<Atomic<Cell<T>>>,
    tail: CachePadded<Atomic<Cell<T>>>,
    occupancy: Occupancy,
    closed: AtomicBool,
}

impl<T> Queue<T> {
    /// Creates an empty queue that holds at most `capacity` values.
    #[must_use]
    pub fn new(capacity: Capacity) -> Self {
        let queue = Self {
            head: CachePadded::new(Atomic::null()),
            tail: CachePadded::new(Atomic::null()),
            occupancy: Occupancy::new(capacity),
            closed: AtomicBool::new(false),
        };

        // SAFETY: The queue is not shared yet, nobody else can observe the sentinel.
        let guard = unsafe { epoch::unprotected() };
        let sentinel = Owned::new(Cell::sentinel()).into_shared(guard);
        queue.head.store(sentinel, Ordering::Relaxed);
        queue.tail.store(sentinel, Ordering::Relaxed);

        queue
    }

    /// Appends a value at the back of the queue.
    ///
    /// # Errors
    ///
    /// [`StoreError::Full`] if the queue is at capacity, [`StoreError::Closed`] if the queue
    /// has been closed. The value is dropped in both cases and the queue is left unchanged.
    pub fn put(&self, value: T) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }

        if !self.occupancy.try_reserve() {
            return Err(StoreError::Full);
        }

        let guard = epoch::pin();
        let cell = Owned::new(Cell::new(value)).into_shared(&guard);

        loop {
            let tail = self.tail.load(Ordering::Acquire, &guard);

            if self.try_link_after(tail, cell, &guard) {
                return Ok(());
            }
        }
    }

    /// Removes the oldest value from the front of the queue.
    ///
    /// # Errors
    ///
    /// [`StoreError::Empty`] if the queue holds nothing, [`StoreError::Closed`] if it holds
    /// nothing and has been closed.
    pub fn get(&self) -> Result<T, StoreError> {
        let guard = epoch::pin();

        self.pop(&guard).ok_or_else(|| self.exhausted_signal())
    }

    /// Removes and drops the oldest value.
    ///
    /// Returns `true` if a value was discarded.
    pub fn remove_one(&self) -> bool {
        let guard = epoch::pin();

        self.pop(&guard).is_some()
    }

    /// Stops the queue from accepting new values. Values already stored can still be taken.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`close()`][Self::close] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The number of values currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.occupancy.len()
    }

    /// Whether the queue holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();
        let head = self.head.load(Ordering::Acquire, &guard);

        // SAFETY: `head` is never null - there is always a sentinel - and the guard keeps it
        // from being reclaimed while we look at it.
        let sentinel = unsafe { head.deref() };

        sentinel.next.load(Ordering::Acquire, &guard).is_null()
    }

    /// The maximum number of values the queue can hold.
    #[must_use]
    pub fn capacity(&self) -> Capacity {
        self.occupancy.capacity()
    }

    fn exhausted_signal(&self) -> StoreError {
        if self.is_closed() {
            StoreError::Closed
        } else {
            StoreError::Empty
        }
    }

    /// Attempts to link `cell` after `onto`, which the caller observed as the tail.
    ///
    /// Returns `false` if `onto` turned out not to be the last cell, after helping the tail
    /// catch up so the next attempt can make progress.
    fn try_link_after<'g>(
        &self,
        onto: Shared<'g, Cell<T>>,
        cell: Shared<'g, Cell<T>>,
        guard: &'g Guard,
    ) -> bool {
        // SAFETY: The tail is never null and the guard keeps it alive.
        let last = unsafe { onto.deref() };
        let next = last.next.load(Ordering::Acquire, guard);

        if !next.is_null() {
            // Someone linked a cell but has not swung the tail yet. Help them.
            drop(
                self.tail
                    .compare_exchange(onto, next, Ordering::Release, Ordering::Relaxed, guard),
            );
            return false;
        }

        // Release publishes the new cell's value to the consumer that takes it.
        let linked = last
            .next
            .compare_exchange(
                Shared::null(),
                cell,
                Ordering::Release,
                Ordering::Relaxed,
                guard,
            )
            .is_ok();

        if linked {
            // Failure is fine - another thread already helped the tail forward.
            drop(
                self.tail
                    .compare_exchange(onto, cell, Ordering::Release, Ordering::Relaxed, guard),
            );
        }

        linked
    }

    fn pop(&self, guard: &Guard) -> Option<T> {
        loop {
            let head = self.head.load(Ordering::Acquire, guard);

            // SAFETY: The head is never null and the guard keeps it alive.
            let sentinel = unsafe { head.deref() };
            let next = sentinel.next.load(Ordering::Acquire, guard);

            // SAFETY: The guard keeps the successor alive, if there is one.
            let first = unsafe { next.as_ref() }?;

            if self
                .head
                .compare_exchange(head, next, Ordering::Release, Ordering::Relaxed, guard)
                .is_err()
            {
                continue;
            }

            // The tail must never point at a retired cell, so move it off the old sentinel.
            let tail = self.tail.load(Ordering::Relaxed, guard);
            if head == tail {
                drop(
                    self.tail
                        .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed, guard),
                );
            }

            self.occupancy.release();

            // SAFETY: Our CAS made `first` the new sentinel, so we are the only thread that
            // will ever read its value. Later pops only look at its successor.
            let value = unsafe { first.take_value() };

            // SAFETY: The old sentinel is unlinked and holds no value. Pinned readers that
            // loaded it earlier delay the destruction until they unpin.
            unsafe {
                guard.defer_destroy(head);
            }

            return Some(value);
        }
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        // SAFETY: We have exclusive access, so no other thread can be holding cell pointers
        // and there is no need to defer destruction.
        let guard = unsafe { epoch::unprotected() };

        while let Some(value) = self.pop(guard) {
            drop(value);
        }

        let sentinel = self.head.load(Ordering::Relaxed, guard);

        // SAFETY: The sentinel is the last remaining cell, it is owned by the queue and its
        // value (if it ever had one) has already been taken.
        drop(unsafe { sentinel.into_owned() });
    }
}

// SAFETY: Values are only ever moved in and out, never shared between threads, so `T: Send`
// is sufficient for the queue to be used from any thread.
unsafe impl<T: Send> Send for Queue<T> {}
// SAFETY: All shared state is atomic and each value is handed to exactly one thread.
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<T: Send> StorageBackend<T> for Queue<T> {
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
        Self::capacity(self)
    }
}
