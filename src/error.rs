//! Error types for the optimistic store.

use thiserror::Error;

/// Errors raised by the store itself, independent of any remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Key already has a mutation in flight: {0}")]
    KeyPending(String),

    #[error("Key already present in collection: {0}")]
    DuplicateKey(String),

    #[error("Record has no identity value")]
    MissingIdentity,

    #[error("Patch would change the identity of record: {0}")]
    IdentityChanged(String),
}

/// Outcome of a failed mutation.
///
/// `Remote` carries the error returned by the caller's remote operation
/// untouched; by the time it is observed the optimistic overlay has already
/// been rolled back. `Store` means the store refused the mutation before the
/// remote operation was started.
#[derive(Debug, Error)]
pub enum MutationError<E> {
    #[error("Remote operation failed: {0}")]
    Remote(E),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl<E> MutationError<E> {
    /// The remote error, if the remote operation ran and failed.
    pub fn remote(&self) -> Option<&E> {
        match self {
            MutationError::Remote(e) => Some(e),
            MutationError::Store(_) => None,
        }
    }

    /// Unwrap into the remote error, handing back `self` otherwise.
    pub fn into_remote(self) -> std::result::Result<E, Self> {
        match self {
            MutationError::Remote(e) => Ok(e),
            other => Err(other),
        }
    }

    /// True if the store refused the mutation without running it.
    pub fn is_refused(&self) -> bool {
        matches!(self, MutationError::Store(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
