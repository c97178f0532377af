use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::Pool;

/// An object checked out of a [`Pool`] that goes back to the pool when dropped.
///
/// Obtained from [`Pool::checkout()`]. Use [`into_inner()`][Self::into_inner] to keep the
/// object instead.
///
/// If the pool has been closed by the time the guard is dropped, the object is dropped with
/// it.
///
/// # Example
///
/// ```rust
/// use recycle_pool::Pool;
///
/// let pool = Pool::with_stack(Vec::<u8>::new);
///
/// {
///     let mut buffer = pool.checkout();
///     buffer.extend_from_slice(b"scratch");
/// }
///
/// // The buffer went back to the pool, contents and all.
/// assert_eq!(pool.get(), b"scratch");
/// ```
pub struct Pooled<'a, T> {
    pool: &'a Pool<T>,

    // Only `None` after `into_inner()` has taken the value, which also consumes the guard.
    value: Option<T>,
}

impl<'a, T> Pooled<'a, T> {
    pub(crate) fn new(pool: &'a Pool<T>, value: T) -> Self {
        Self {
            pool,
            value: Some(value),
        }
    }

    /// Detaches the object from the pool. It will not be returned when dropped.
    ///
    /// The pool still counts the object as in use.
    #[must_use]
    pub fn into_inner(mut self) -> T {
        self.value
            .take()
            .expect("value is present until the guard is consumed")
    }
}

impl<T> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
            .as_ref()
            .expect("value is present until the guard is consumed")
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
            .as_mut()
            .expect("value is present until the guard is consumed")
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            // A closed pool rejects the value and drops it, which is all we can do here.
            _ = self.pool.try_put(value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}
