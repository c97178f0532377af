use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The maximum number of values a storage backend may hold at once.
///
/// Signed integers convert with the convention that any negative number means "no bound":
///
/// ```rust
/// use recycle_pool::Capacity;
///
/// assert_eq!(Capacity::from(-1_i64), Capacity::Unbounded);
/// assert_eq!(Capacity::from(16_i64), Capacity::Bounded(16));
/// assert_eq!(Capacity::from(16_usize), Capacity::Bounded(16));
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Capacity {
    /// At most this many values may be stored.
    Bounded(usize),

    /// The backend grows as long as values keep arriving.
    Unbounded,
}

impl Capacity {
    /// Capacity used by the pool constructors that do not take an explicit size.
    pub const DEFAULT: Self = Self::Bounded(128);

    /// The bound, if there is one.
    #[must_use]
    pub fn limit(self) -> Option<usize> {
        match self {
            Self::Bounded(limit) => Some(limit),
            Self::Unbounded => None,
        }
    }

    /// Whether the capacity is finite.
    #[must_use]
    pub fn is_bounded(self) -> bool {
        matches!(self, Self::Bounded(_))
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<usize> for Capacity {
    fn from(limit: usize) -> Self {
        Self::Bounded(limit)
    }
}

impl From<i64> for Capacity {
    fn from(value: i64) -> Self {
        // Negative values mean unbounded. Positive values too large for the address space
        // could never be reached anyway, so they are unbounded as well.
        usize::try_from(value).map_or(Self::Unbounded, Self::Bounded)
    }
}

impl From<i32> for Capacity {
    fn from(value: i32) -> Self {
        Self::from(i64::from(value))
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(limit) => write!(f, "{limit}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Occupancy accounting shared by the linked backends.
///
/// A slot is reserved before a cell is linked in and released after a cell is unlinked, so
/// the count may briefly include a value that is not yet (or no longer) reachable, but it
/// never exceeds the bound.
pub(crate) struct Occupancy {
    capacity: Capacity,
    count: AtomicUsize,
}

impl Occupancy {
    pub(crate) fn new(capacity: Capacity) -> Self {
        Self {
            capacity,
            count: AtomicUsize::new(0),
        }
    }

    pub(crate) fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Reserves a slot for one more value. Returns `false` if the backend is at capacity,
    /// in which case nothing was changed.
    pub(crate) fn try_reserve(&self) -> bool {
        match self.capacity {
            Capacity::Unbounded => {
                // Relaxed is enough, the count carries no other data with it.
                self.count.fetch_add(1, Ordering::Relaxed);
                true
            }
            Capacity::Bounded(limit) => self
                .count
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                    if count < limit {
                        count.checked_add(1)
                    } else {
                        None
                    }
                })
                .is_ok(),
        }
    }

    /// Returns a previously reserved slot.
    pub(crate) fn release(&self) {
        let previous = self.count.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(previous > 0, "released more slots than were reserved");
    }

    pub(crate) fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Occupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Occupancy")
            .field("capacity", &self.capacity)
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn negative_means_unbounded() {
        assert_eq!(Capacity::from(-1_i64), Capacity::Unbounded);
        assert_eq!(Capacity::from(i64::MIN), Capacity::Unbounded);
        assert_eq!(Capacity::from(-5_i32), Capacity::Unbounded);
    }

    #[test]
    fn non_negative_means_bounded() {
        assert_eq!(Capacity::from(0_i64), Capacity::Bounded(0));
        assert_eq!(Capacity::from(42_i32), Capacity::Bounded(42));
        assert_eq!(Capacity::from(7_usize).limit(), Some(7));
        assert!(Capacity::from(7_usize).is_bounded());
        assert!(!Capacity::Unbounded.is_bounded());
    }

    #[test]
    fn default_is_128() {
        assert_eq!(Capacity::default(), Capacity::Bounded(128));
    }

    #[test]
    fn display() {
        assert_eq!(Capacity::Bounded(3).to_string(), "3");
        assert_eq!(Capacity::Unbounded.to_string(), "unbounded");
    }

    #[test]
    fn reserve_stops_at_limit() {
        let occupancy = Occupancy::new(Capacity::Bounded(2));

        assert!(occupancy.try_reserve());
        assert!(occupancy.try_reserve());
        assert!(!occupancy.try_reserve());
        assert_eq!(occupancy.len(), 2);

        occupancy.release();
        assert_eq!(occupancy.len(), 1);
        assert!(occupancy.try_reserve());
        assert!(!occupancy.try_reserve());
    }

    #[test]
    fn zero_capacity_never_reserves() {
        let occupancy = Occupancy::new(Capacity::Bounded(0));

        assert!(!occupancy.try_reserve());
        assert_eq!(occupancy.len(), 0);
    }

    #[test]
    fn unbounded_always_reserves() {
        let occupancy = Occupancy::new(Capacity::Unbounded);

        for _ in 0..1000 {
            assert!(occupancy.try_reserve());
        }

        assert_eq!(occupancy.len(), 1000);
    }
}
