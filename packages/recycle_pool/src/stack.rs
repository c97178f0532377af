use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::epoch::{self, Atomic, Guard, Owned};

use crate::{Capacity, Cell, Occupancy, StorageBackend, StoreError};

/// A bounded, lock-free last-in-first-out store.
///
/// This is a Treiber stack: the only shared mutable location is the `top` pointer, which is
/// swung with a single compare-and-swap per operation. Unlinked cells are reclaimed through
/// epoch-based garbage collection, so a thread that lost a race never dereferences freed
/// memory and a recycled address cannot make a stale CAS succeed.
///
/// Operations never block. Under contention a thread retries its CAS until it wins.
///
/// # Example
///
/// ```rust
/// use recycle_pool::{Capacity, Stack, StoreError};
///
/// let stack = Stack::new(Capacity::Bounded(2));
///
/// stack.put(1).unwrap();
/// stack.put(2).unwrap();
/// assert_eq!(stack.put(3), Err(StoreError::Full));
///
/// assert_eq!(stack.get(), Ok(2));
/// assert_eq!(stack.get(), Ok(1));
/// assert_eq!(stack.get(), Err(StoreError::Empty));
/// ```
pub struct Stack<T> {
    top: Atomic<Cell<T>>,
    occupancy: Occupancy,
    closed: AtomicBool,
}

impl<T> Stack<T> {
    /// Creates an empty stack that holds at most `capacity` values.
    #[must_use]
    pub fn new(capacity: Capacity) -> Self {
        Self {
            top: Atomic::null(),
            occupancy: Occupancy::new(capacity),
            closed: AtomicBool::new(false),
        }
    }

    /// Pushes a value on top of the stack.
    ///
    /// # Errors
    ///
    /// [`StoreError::Full`] if the stack is at capacity, [`StoreError::Closed`] if the stack
    /// has been closed. The value is dropped in both cases and the stack is left unchanged.
    pub fn put(&self, value: T) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }

        if !self.occupancy.try_reserve() {
            return Err(StoreError::Full);
        }

        let mut cell = Owned::new(Cell::new(value));
        let guard = epoch::pin();

        loop {
            let top = self.top.load(Ordering::Relaxed, &guard);
            cell.next.store(top, Ordering::Relaxed);

            // Release publishes the value and the link to whoever pops this cell.
            match self
                .top
                .compare_exchange(top, cell, Ordering::Release, Ordering::Relaxed, &guard)
            {
                Ok(_) => return Ok(()),
                Err(e) => cell = e.new,
            }
        }
    }

    /// Pops the most recently pushed value.
    ///
    /// # Errors
    ///
    /// [`StoreError::Empty`] if the stack holds nothing, [`StoreError::Closed`] if it holds
    /// nothing and has been closed.
    pub fn get(&self) -> Result<T, StoreError> {
        let guard = epoch::pin();

        self.pop(&guard).ok_or_else(|| self.exhausted_signal())
    }

    /// Pops and drops the most recently pushed value.
    ///
    /// Returns `true` if a value was discarded.
    pub fn remove_one(&self) -> bool {
        let guard = epoch::pin();

        self.pop(&guard).is_some()
    }

    /// Stops the stack from accepting new values. Values already stored can still be popped.
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

    /// Whether the stack holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let guard = epoch::pin();

        self.top.load(Ordering::Acquire, &guard).is_null()
    }

    /// The maximum number of values the stack can hold.
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

    fn pop(&self, guard: &Guard) -> Option<T> {
        loop {
            // Acquire pairs with the Release in put(), making the cell contents visible.
            let top = self.top.load(Ordering::Acquire, guard);

            // SAFETY: The guard keeps any cell we can still observe from being reclaimed.
            let cell = unsafe { top.as_ref() }?;

            let below = cell.next.load(Ordering::Relaxed, guard);

            if self
                .top
                .compare_exchange(top, below, Ordering::Relaxed, Ordering::Relaxed, guard)
                .is_ok()
            {
                self.occupancy.release();

                // SAFETY: Our CAS unlinked the cell, so no other thread can reach it anymore
                // and we are the only one that takes its value.
                let value = unsafe { cell.take_value() };

                // SAFETY: The cell is unlinked and its value has been moved out. Readers that
                // loaded the pointer before the unlink are pinned, so destruction waits for
                // them. Dropping the cell does not touch the (moved-out) value.
                unsafe {
                    guard.defer_destroy(top);
                }

                return Some(value);
            }
        }
    }
}

impl<T> Drop for Stack<T> {
    fn drop(&mut self) {
        // SAFETY: We have exclusive access, so no other thread can be holding cell pointers
        // and there is no need to defer destruction.
        let guard = unsafe { epoch::unprotected() };

        while let Some(value) = self.pop(guard) {
            drop(value);
        }
    }
}

// SAFETY: Values are only ever moved in and out, never shared between threads, so `T: Send`
// is sufficient for the stack to be used from any thread.
unsafe impl<T: Send> Send for Stack<T> {}
// SAFETY: All shared state is atomic and each value is handed to exactly one thread.
unsafe impl<T: Send> Sync for Stack<T> {}

impl<T> fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl<T: Send> StorageBackend<T> for Stack<T> {
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

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Stack<u32>: Send, Sync, fmt::Debug);
    // Values only need to be Send - they are never shared.
    assert_impl_all!(Stack<std::cell::Cell<u32>>: Send, Sync);

    #[test]
    fn bounded_scenario() {
        let stack = Stack::new(Capacity::Bounded(2));

        assert_eq!(stack.put(1), Ok(()));
        assert_eq!(stack.put(2), Ok(()));
        assert_eq!(stack.put(3), Err(StoreError::Full));
        assert_eq!(stack.len(), 2);

        assert_eq!(stack.get(), Ok(2));
        assert_eq!(stack.get(), Ok(1));
        assert_eq!(stack.get(), Err(StoreError::Empty));
        assert_eq!(stack.len(), 0);
    }

    #[test]
    fn sequential_use_is_lifo() {
        let stack = Stack::new(Capacity::Unbounded);

        for i in 0..100 {
            stack.put(i).unwrap();
        }

        for expected in (0..100).rev() {
            assert_eq!(stack.get(), Ok(expected));
        }

        assert!(stack.is_empty());
    }

    #[test]
    fn put_then_get_round_trips() {
        let stack = Stack::new(Capacity::Bounded(1));

        stack.put("x".to_string()).unwrap();
        assert_eq!(stack.get().as_deref(), Ok("x"));
    }

    #[test]
    fn zero_capacity_is_always_full() {
        let stack = Stack::new(Capacity::Bounded(0));

        assert_eq!(stack.put(1), Err(StoreError::Full));
        assert!(stack.is_empty());
    }

    #[test]
    fn full_put_leaves_structure_untouched() {
        let stack = Stack::new(Capacity::Bounded(1));

        stack.put(10).unwrap();
        assert_eq!(stack.put(20), Err(StoreError::Full));

        assert_eq!(stack.get(), Ok(10));
        assert_eq!(stack.get(), Err(StoreError::Empty));
    }

    #[test]
    fn remove_one_discards_top() {
        let stack = Stack::new(Capacity::Unbounded);

        stack.put(1).unwrap();
        stack.put(2).unwrap();

        assert!(stack.remove_one());
        assert_eq!(stack.get(), Ok(1));
        assert!(!stack.remove_one());
    }

    #[test]
    fn close_rejects_puts_but_drains() {
        let stack = Stack::new(Capacity::Unbounded);

        stack.put(1).unwrap();
        stack.close();
        stack.close();

        assert!(stack.is_closed());
        assert_eq!(stack.put(2), Err(StoreError::Closed));
        assert_eq!(stack.get(), Ok(1));
        assert_eq!(stack.get(), Err(StoreError::Closed));
    }

    #[test]
    fn drop_releases_stored_values() {
        let tracked = Arc::new(());

        {
            let stack = Stack::new(Capacity::Unbounded);
            for _ in 0..10 {
                stack.put(Arc::clone(&tracked)).unwrap();
            }
            assert_eq!(Arc::strong_count(&tracked), 11);
        }

        assert_eq!(Arc::strong_count(&tracked), 1);
    }

    #[test]
    fn rejected_value_is_dropped() {
        let tracked = Arc::new(());
        let stack = Stack::new(Capacity::Bounded(0));

        assert_eq!(stack.put(Arc::clone(&tracked)), Err(StoreError::Full));
        assert_eq!(Arc::strong_count(&tracked), 1);
    }

    #[cfg_attr(miri, ignore)] // Too slow under Miri.
    #[test]
    fn concurrent_producers_and_consumers_lose_nothing() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 2_000;

        let stack = Arc::new(Stack::new(Capacity::Unbounded));

        let handles = (0..THREADS)
            .map(|t| {
                let stack = Arc::clone(&stack);
                thread::spawn(move || {
                    let mut taken = Vec::new();

                    for i in 0..PER_THREAD {
                        stack.put(t * PER_THREAD + i).unwrap();

                        if i % 2 == 0 {
                            if let Ok(value) = stack.get() {
                                taken.push(value);
                            }
                        }
                    }

                    taken
                })
            })
            .collect::<Vec<_>>();

        let mut seen = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(stack.len(), THREADS * PER_THREAD - seen.len());

        while let Ok(value) = stack.get() {
            seen.push(value);
        }

        seen.sort_unstable();
        assert_eq!(seen, (0..THREADS * PER_THREAD).collect::<Vec<_>>());
    }

    #[cfg_attr(miri, ignore)] // Too slow under Miri.
    #[test]
    fn concurrent_puts_never_exceed_capacity() {
        const CAPACITY: usize = 64;

        let stack = Arc::new(Stack::new(Capacity::Bounded(CAPACITY)));

        let accepted = (0..8)
            .map(|_| {
                let stack = Arc::clone(&stack);
                thread::spawn(move || (0..100).filter(|&i| stack.put(i).is_ok()).count())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap())
            .sum::<usize>();

        assert_eq!(accepted, CAPACITY);
        assert_eq!(stack.len(), CAPACITY);
    }
}
