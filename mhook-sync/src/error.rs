//! Error types for mhook-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use mhook_core::CoordinateError;

use crate::store::StoreError;
use crate::transfer::TransferOutcome;

/// All errors that can arise from resolution and transfer operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed coordinate; never retried.
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(#[from] CoordinateError),

    /// The destination directory is missing or cannot take a temp file.
    /// Raised before any bytes are requested from the store.
    #[error("destination {path} is not writable: {source}")]
    DestinationNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store reported a failure for `key`.
    #[error("transfer of {key} failed: {source}")]
    TransferFailed {
        key: String,
        #[source]
        source: StoreError,
    },

    /// A local I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source directory walk failed (permission denied, loop, …).
    #[error("walking {path} failed: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// `key` did not appear within `timeout`.
    #[error("timed out after {timeout:?} waiting for {key}")]
    WaitTimeout { key: String, timeout: Duration },

    /// An object in a tree transfer failed. Objects in `completed` are
    /// already in place (on disk or in the store) and stay there.
    #[error(
        "tree transfer stopped at {key} after {count} completed object(s): {source}",
        count = .completed.len()
    )]
    PartialTreeFailure {
        key: String,
        completed: Vec<TransferOutcome>,
        #[source]
        source: Box<SyncError>,
    },

    /// The HEAD marker body is not a UTF-8 commit id.
    #[error("HEAD marker {key} does not hold a UTF-8 commit id")]
    MalformedHead { key: String },

    /// A progress callback or cancel flag stopped the operation.
    #[error("operation on {key} cancelled")]
    Cancelled { key: String },
}

impl SyncError {
    /// The key a tree transfer stopped at, if this is a tree failure.
    pub fn failed_key(&self) -> Option<&str> {
        match self {
            SyncError::PartialTreeFailure { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::TransferFailed`].
pub(crate) fn transfer_err(key: &str, source: StoreError) -> SyncError {
    SyncError::TransferFailed {
        key: key.to_owned(),
        source,
    }
}
