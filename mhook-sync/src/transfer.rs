//! Single-object transfer.
//!
//! ## Download protocol
//!
//! 1. Check the destination's parent directory exists and takes a temp file.
//! 2. Fingerprint the current destination (if any).
//! 3. Conditional `get` into `.mhook-*` in the same directory.
//! 4. "Not modified" → drop the temp file, leave the destination untouched.
//! 5. Store error → drop the temp file, propagate.
//! 6. Success → fsync, then rename onto the destination (atomic on POSIX).
//!
//! The temp file is a `tempfile::NamedTempFile`, removed on drop, so every
//! exit path except the final rename cleans it up.
//!
//! Uploads stream the file straight into `put`; nothing is buffered whole.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{io_err, transfer_err, SyncError};
use crate::fingerprint;
use crate::progress::{ProgressCallback, ProgressReader, ProgressWriter};
use crate::store::{GetOutcome, ObjectStore};

/// Name prefix of in-flight temporary files.
pub const TEMP_PREFIX: &str = ".mhook-";

/// Which way a job moves bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

/// One object to move between the store and the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    /// Store key (no leading `/`).
    pub key: String,
    pub local: PathBuf,
    pub expected_size: Option<u64>,
    pub direction: Direction,
}

impl TransferJob {
    pub fn run(
        &self,
        store: &dyn ObjectStore,
        progress: &dyn ProgressCallback,
    ) -> Result<TransferOutcome, SyncError> {
        match self.direction {
            Direction::Download => {
                download_object(store, &self.key, &self.local, self.expected_size, progress)
            }
            Direction::Upload => upload_object(store, &self.local, &self.key, progress),
        }
    }
}

/// Outcome of an individual object transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// New content was renamed onto `path`.
    Downloaded { key: String, path: PathBuf, bytes: u64 },
    /// The store answered "not modified"; `path` was left as it was.
    Unchanged { key: String, path: PathBuf },
    /// `path` was streamed to `key`.
    Uploaded { key: String, path: PathBuf, bytes: u64 },
}

impl TransferOutcome {
    pub fn key(&self) -> &str {
        match self {
            TransferOutcome::Downloaded { key, .. }
            | TransferOutcome::Unchanged { key, .. }
            | TransferOutcome::Uploaded { key, .. } => key,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            TransferOutcome::Downloaded { path, .. }
            | TransferOutcome::Unchanged { path, .. }
            | TransferOutcome::Uploaded { path, .. } => path,
        }
    }

    /// Bytes that crossed the wire (zero for an unchanged object).
    pub fn bytes(&self) -> u64 {
        match self {
            TransferOutcome::Downloaded { bytes, .. } | TransferOutcome::Uploaded { bytes, .. } => {
                *bytes
            }
            TransferOutcome::Unchanged { .. } => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// Download `key` onto `dest` atomically, skipping the transfer when the
/// store reports the local copy current.
pub fn download_object(
    store: &dyn ObjectStore,
    key: &str,
    dest: &Path,
    expected_size: Option<u64>,
    progress: &dyn ProgressCallback,
) -> Result<TransferOutcome, SyncError> {
    let dir = parent_dir(dest);
    ensure_writable_dir(dir)?;
    if dest.is_dir() {
        return Err(SyncError::DestinationNotWritable {
            path: dest.to_path_buf(),
            source: io::Error::other("destination is a directory"),
        });
    }

    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| SyncError::DestinationNotWritable {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let precondition =
        fingerprint::precondition(store.fingerprint_algorithm(), fingerprint::local_fingerprint(dest));

    let (result, cancelled) = {
        let mut writer = ProgressWriter::new(temp.as_file_mut(), key, expected_size, progress);
        let result = store.get(key, precondition.as_ref(), &mut writer);
        (result, writer.cancelled)
    };
    progress.on_finish(key);

    let bytes = match result {
        Ok(GetOutcome::Fetched { bytes }) => bytes,
        Ok(GetOutcome::NotModified) => {
            tracing::info!("using local copy for {}", dest.display());
            return Ok(TransferOutcome::Unchanged {
                key: key.to_owned(),
                path: dest.to_path_buf(),
            });
        }
        Err(_) if cancelled => {
            return Err(SyncError::Cancelled {
                key: key.to_owned(),
            })
        }
        Err(e) => return Err(transfer_err(key, e)),
    };

    temp.as_file()
        .sync_all()
        .map_err(|e| io_err(temp.path(), e))?;
    temp.persist(dest).map_err(|e| io_err(dest, e.error))?;

    tracing::info!("downloaded {}", dest.display());
    Ok(TransferOutcome::Downloaded {
        key: key.to_owned(),
        path: dest.to_path_buf(),
        bytes,
    })
}

/// Fail with [`SyncError::DestinationNotWritable`] unless `dir` is an
/// existing directory.
///
/// Writability itself is proven by creating the temp file in it.
pub fn ensure_writable_dir(dir: &Path) -> Result<(), SyncError> {
    let not_writable = |source| SyncError::DestinationNotWritable {
        path: dir.to_path_buf(),
        source,
    };
    let meta = fs::metadata(dir).map_err(not_writable)?;
    if !meta.is_dir() {
        return Err(not_writable(io::Error::other("not a directory")));
    }
    if meta.permissions().readonly() {
        return Err(not_writable(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "directory is read-only",
        )));
    }
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// Stream the file at `source` to `key`.
pub fn upload_object(
    store: &dyn ObjectStore,
    source: &Path,
    key: &str,
    progress: &dyn ProgressCallback,
) -> Result<TransferOutcome, SyncError> {
    let file = File::open(source).map_err(|e| io_err(source, e))?;
    let size = file.metadata().map_err(|e| io_err(source, e))?.len();

    let (result, cancelled) = {
        let mut reader = ProgressReader::new(BufReader::new(file), key, Some(size), progress);
        let result = store.put(key, &mut reader, size);
        (result, reader.cancelled)
    };
    progress.on_finish(key);

    match result {
        Ok(()) => {}
        Err(_) if cancelled => {
            return Err(SyncError::Cancelled {
                key: key.to_owned(),
            })
        }
        Err(e) => return Err(transfer_err(key, e)),
    }

    tracing::info!("uploaded {} -> {key}", source.display());
    Ok(TransferOutcome::Uploaded {
        key: key.to_owned(),
        path: source.to_path_buf(),
        bytes: size,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
