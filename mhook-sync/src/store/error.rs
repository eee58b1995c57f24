//! Errors reported by object-store backends.

use thiserror::Error;

/// A failure at the object-store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object under `key`.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// The store refused the operation.
    #[error("access denied to {key}: {message}")]
    AccessDenied { key: String, message: String },

    /// Transport failure; `retryable` tells decorators whether to try again.
    #[error("network error: {message}")]
    Network { message: String, retryable: bool },

    /// Local I/O underneath the store, or the caller's sink/source failing.
    #[error("I/O error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The key cannot be represented by this backend.
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("{message}")]
    Other { message: String },
}

impl StoreError {
    /// Whether a transport-level retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Network { retryable, .. } => *retryable,
            StoreError::NotFound { .. }
            | StoreError::AccessDenied { .. }
            | StoreError::Io { .. }
            | StoreError::InvalidKey { .. }
            | StoreError::Other { .. } => false,
        }
    }
}

pub(crate) fn store_io(key: &str, source: std::io::Error) -> StoreError {
    StoreError::Io {
        key: key.to_owned(),
        source,
    }
}
