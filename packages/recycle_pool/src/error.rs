use thiserror::Error;

/// Signals reported by a [`StorageBackend`][crate::StorageBackend].
///
/// `Empty` and `Full` are ordinary outcomes of non-blocking operations and are absorbed by
/// [`Pool`][crate::Pool]. `Closed` means the backend has stopped serving.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum StoreError {
    /// The backend has no stored value to hand out.
    #[error("storage backend is empty")]
    Empty,

    /// The backend has no room for another value.
    #[error("storage backend is full")]
    Full,

    /// The backend has been closed and holds no more values.
    #[error("storage backend is closed")]
    Closed,
}

/// Fatal conditions surfaced by [`Pool`][crate::Pool] operations.
///
/// These indicate a violation of the pool's usage contract (e.g. use after close), not a
/// transient state. Retrying will not help.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The pool has been closed and can no longer serve or accept objects.
    #[error("object pool is closed")]
    Closed,

    /// The storage backend reported a signal that the pool has no recovery for.
    #[error("unexpected storage backend signal: {0}")]
    UnexpectedSignal(StoreError),
}

impl From<StoreError> for Error {
    fn from(signal: StoreError) -> Self {
        match signal {
            StoreError::Closed => Self::Closed,
            other => Self::UnexpectedSignal(other),
        }
    }
}

/// A specialized `Result` type for pool operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
