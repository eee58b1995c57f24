//! [`Mhook`]: the operations exposed to the CLI and other callers.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mhook_core::{
    keys::{resolve_head, resolve_object},
    ArtifactCoordinate, CommitId, CoordinateError, LATEST,
};

use crate::error::{transfer_err, SyncError};
use crate::progress::{NoProgress, ProgressCallback};
use crate::publish;
use crate::store::{ObjectStore, StoreError};
use crate::tree::{self, TreeOptions, TreeReport};
use crate::wait::{self, CancelFlag};

/// Artifact resolution and transfer over one store.
pub struct Mhook<S> {
    store: S,
    options: TreeOptions,
    progress: Arc<dyn ProgressCallback>,
}

impl<S: ObjectStore> Mhook<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            options: TreeOptions::default(),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_options(mut self, options: TreeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: impl ProgressCallback + 'static) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Download the object or tree at `coord` into `destination`.
    ///
    /// Fails with a not-found transfer error when nothing lives under the
    /// coordinate.
    pub fn download(
        &self,
        coord: &ArtifactCoordinate,
        destination: &Path,
    ) -> Result<TreeReport, SyncError> {
        let key = resolve_object(coord)?;
        tracing::debug!("downloading {key} into {}", destination.display());
        let report = tree::download_tree(
            &self.store,
            &key,
            destination,
            self.options,
            self.progress.as_ref(),
        )?;
        if report.is_empty() {
            return Err(transfer_err(
                key.store_path(),
                StoreError::NotFound {
                    key: key.store_path().to_owned(),
                },
            ));
        }
        Ok(report)
    }

    /// Upload `source` under `coord` (commit tree, at `coord.target`).
    pub fn upload(
        &self,
        coord: &ArtifactCoordinate,
        source: &Path,
    ) -> Result<TreeReport, SyncError> {
        let key = resolve_object(coord)?;
        tracing::debug!("uploading {} to {key}", source.display());
        tree::upload_tree(
            &self.store,
            source,
            &key,
            self.options,
            self.progress.as_ref(),
        )
    }

    /// Upload `source` under the commit, then point HEAD at it and copy the
    /// tree under `latest`.
    pub fn publish_latest(
        &self,
        coord: &ArtifactCoordinate,
        source: &Path,
    ) -> Result<TreeReport, SyncError> {
        if coord.commit.is_latest() {
            return Err(CoordinateError::ReservedAlias { alias: LATEST }.into());
        }
        let mut report = self.upload(coord, source)?;
        report.extend(publish::publish(
            &self.store,
            coord,
            source,
            self.options,
            self.progress.as_ref(),
        )?);
        Ok(report)
    }

    /// The commit id currently recorded in HEAD for `coord`'s branch.
    pub fn head(&self, coord: &ArtifactCoordinate) -> Result<CommitId, SyncError> {
        let key = resolve_head(coord)?;
        let mut body = Vec::new();
        self.store
            .get(key.store_path(), None, &mut body)
            .map_err(|e| transfer_err(key.store_path(), e))?;
        let commit = String::from_utf8(body).map_err(|_| SyncError::MalformedHead {
            key: key.to_string(),
        })?;
        Ok(CommitId::from(commit.trim()))
    }

    /// Block until the object at `coord` exists.
    pub fn wait(
        &self,
        coord: &ArtifactCoordinate,
        timeout: Duration,
        cancel: &CancelFlag,
    ) -> Result<(), SyncError> {
        let key = resolve_object(coord)?;
        wait::wait_for(&self.store, &key, timeout, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn coord() -> ArtifactCoordinate {
        ArtifactCoordinate::new("app", "main", "abc123")
    }

    #[test]
    fn head_reads_trimmed_commit() {
        let store = MemoryStore::new();
        store.insert("app/main/HEAD", "abc123\n");
        let mhook = Mhook::new(store);
        assert_eq!(mhook.head(&coord()).unwrap(), CommitId::from("abc123"));
    }

    #[test]
    fn head_missing_is_transfer_failure() {
        let mhook = Mhook::new(MemoryStore::new());
        let err = mhook.head(&coord()).unwrap_err();
        assert!(
            matches!(
                err,
                SyncError::TransferFailed {
                    source: StoreError::NotFound { .. },
                    ..
                }
            ),
            "got: {err}"
        );
    }

    #[test]
    fn head_with_binary_body_is_malformed() {
        let store = MemoryStore::new();
        store.insert("app/main/HEAD", vec![0xff, 0xfe]);
        let err = Mhook::new(store).head(&coord()).unwrap_err();
        assert!(matches!(err, SyncError::MalformedHead { .. }), "got: {err}");
    }

    #[test]
    fn download_of_nothing_is_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mhook = Mhook::new(MemoryStore::new());
        let err = mhook
            .download(&coord().with_target("bin/server"), &tmp.path().join("server"))
            .unwrap_err();
        assert!(matches!(err, SyncError::TransferFailed { .. }), "got: {err}");
    }

    #[test]
    fn invalid_coordinate_is_rejected_before_io() {
        let mhook = Mhook::new(MemoryStore::new());
        let err = mhook
            .head(&ArtifactCoordinate::new("", "main", "latest"))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidCoordinate(_)), "got: {err}");
        assert_eq!(mhook.store().stats().gets, 0);
    }
}
