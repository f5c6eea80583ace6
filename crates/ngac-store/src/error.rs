//! Store error types.

use ngac_types::ElementKey;
use thiserror::Error;

/// Errors raised by storage adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key does not name an element persisted in this store.
    #[error("element {0} is not persisted in this store")]
    NotPersisted(ElementKey),

    /// An element with the same identifier already exists in the machine.
    #[error("element {0} already exists")]
    DuplicateElement(ElementKey),

    /// The adapter does not implement the requested capability.
    #[error("operation not supported by this adapter: {0}")]
    Unsupported(&'static str),

    /// A lock guarding adapter state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
