use std::mem::MaybeUninit;

use crossbeam::epoch::Atomic;

/// One link in the [`Stack`][crate::Stack] or [`Queue`][crate::Queue] chain.
///
/// The value is kept in `MaybeUninit` because a cell does not always own one: the queue keeps
/// a value-less sentinel at its head, and once a value has been moved out of an unlinked cell,
/// the cell itself is retired later through the epoch collector without dropping it again.
///
/// A cell is owned by exactly one party at a time: the backend's chain while linked, then the
/// thread whose CAS unlinked it, which hands it to the collector.
pub(crate) struct Cell<T> {
    value: MaybeUninit<T>,

    /// For the stack, the cell below this one. For the queue, the cell enqueued after this one.
    pub(crate) next: Atomic<Self>,
}

impl<T> Cell<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            value: MaybeUninit::new(value),
            next: Atomic::null(),
        }
    }

    pub(crate) fn sentinel() -> Self {
        Self {
            value: MaybeUninit::uninit(),
            next: Atomic::null(),
        }
    }

    /// Moves the value out of the cell.
    ///
    /// # Safety
    ///
    /// The cell must have been created with a value, and the caller must be the single party
    /// entitled to that value (the thread whose CAS unlinked the cell or, for the queue, made
    /// it the new sentinel). The value must not be taken again afterwards.
    pub(crate) unsafe fn take_value(&self) -> T {
        // SAFETY: Forwarding the caller's guarantee that the value is initialized and that
        // nobody else will read it.
        unsafe { self.value.assume_init_read() }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use crossbeam::epoch;

    use super::*;

    #[test]
    fn take_value_moves_out_without_double_drop() {
        let tracked = Arc::new(());
        let cell = Cell::new(Arc::clone(&tracked));

        assert_eq!(Arc::strong_count(&tracked), 2);

        // SAFETY: The cell was created with a value and we take it exactly once.
        let value = unsafe { cell.take_value() };
        drop(cell);

        assert_eq!(Arc::strong_count(&tracked), 2);
        drop(value);
        assert_eq!(Arc::strong_count(&tracked), 1);
    }

    #[test]
    fn sentinel_has_no_successor() {
        let cell = Cell::<u32>::sentinel();

        // SAFETY: The cell is not shared, so an unprotected guard is fine.
        let guard = unsafe { epoch::unprotected() };
        assert!(cell.next.load(Ordering::Relaxed, guard).is_null());
    }
}
