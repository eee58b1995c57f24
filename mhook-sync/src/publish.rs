//! Version publisher: HEAD marker and `latest` alias.
//!
//! `publish` writes HEAD first and then copies the tree under `latest/`.
//! A reader racing a publish can therefore see a HEAD naming a commit whose
//! `latest` tree is still being copied; `latest` is only eventually
//! consistent with HEAD. Concurrent publishers are last-writer-wins.

use std::path::Path;

use mhook_core::{
    keys::{resolve_head, resolve_object},
    ArtifactCoordinate, CoordinateError, ObjectKey, LATEST,
};

use crate::error::{transfer_err, SyncError};
use crate::progress::ProgressCallback;
use crate::store::ObjectStore;
use crate::tree::{plan_upload, run_jobs, TreeOptions, TreeReport};

/// Overwrite the HEAD marker for `coord`'s project/branch with its commit id.
pub fn write_head(
    store: &dyn ObjectStore,
    coord: &ArtifactCoordinate,
) -> Result<ObjectKey, SyncError> {
    require_commit(coord)?;
    let key = resolve_head(coord)?;
    let body = coord.commit.0.as_bytes();
    store
        .put(key.store_path(), &mut &body[..], body.len() as u64)
        .map_err(|e| transfer_err(key.store_path(), e))?;
    tracing::info!("{key} -> {}", coord.commit);
    Ok(key)
}

/// Point HEAD at `coord.commit` and copy `source` under the `latest` alias
/// (at `coord.target`, like the commit upload).
///
/// The source is walked before HEAD is touched, so a bad source leaves the
/// published state unchanged.
pub fn publish(
    store: &dyn ObjectStore,
    coord: &ArtifactCoordinate,
    source: &Path,
    options: TreeOptions,
    progress: &dyn ProgressCallback,
) -> Result<TreeReport, SyncError> {
    require_commit(coord)?;
    let latest_prefix = resolve_object(&coord.to_latest())?;
    let jobs = plan_upload(source, &latest_prefix)?;

    write_head(store, coord)?;

    let mut completed = Vec::new();
    run_jobs(store, &jobs, options, progress, &mut completed)?;
    tracing::info!(
        "published {} object(s) under {latest_prefix}",
        completed.len()
    );
    Ok(TreeReport {
        outcomes: completed,
    })
}

fn require_commit(coord: &ArtifactCoordinate) -> Result<(), SyncError> {
    if coord.commit.is_latest() {
        return Err(CoordinateError::ReservedAlias { alias: LATEST }.into());
    }
    Ok(())
}
