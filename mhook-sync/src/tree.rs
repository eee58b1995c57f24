//! Tree transfer: fan a key prefix or a directory out into single-object
//! transfers.
//!
//! Jobs live in an arena and are claimed by index. With the default
//! concurrency of 1 they run in order on the calling thread and the first
//! failure stops everything after it. With more workers, no job is claimed
//! after a failure is seen and the lowest-index failure is the one reported.
//! Either way objects that completed before the failure stay in place and
//! are listed in [`SyncError::PartialTreeFailure`]. When nothing completed
//! the failure is returned as is.

use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use walkdir::WalkDir;

use mhook_core::ObjectKey;

use crate::error::{io_err, transfer_err, SyncError};
use crate::progress::ProgressCallback;
use crate::store::{ObjectMeta, ObjectStore};
use crate::transfer::{Direction, TransferJob, TransferOutcome};

/// Tuning for tree transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    /// Number of objects in flight at once; 1 means strictly sequential.
    pub concurrency: usize,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// Per-object outcomes of a completed tree transfer, in job order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeReport {
    pub outcomes: Vec<TransferOutcome>,
}

impl TreeReport {
    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Downloaded { .. }))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Unchanged { .. }))
    }

    pub fn uploaded(&self) -> usize {
        self.count(|o| matches!(o, TransferOutcome::Uploaded { .. }))
    }

    /// Bytes that crossed the wire.
    pub fn bytes(&self) -> u64 {
        self.outcomes.iter().map(TransferOutcome::bytes).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn extend(&mut self, other: TreeReport) {
        self.outcomes.extend(other.outcomes);
    }

    fn count(&self, pred: impl Fn(&TransferOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

// ---------------------------------------------------------------------------
// Download
// ---------------------------------------------------------------------------

/// Download every object under `prefix` into `dest`.
///
/// Each object's local path is its key with the prefix stripped, joined onto
/// `dest`; an object whose key equals the prefix lands on `dest` itself.
/// Listing pages are processed as they arrive.
pub fn download_tree(
    store: &dyn ObjectStore,
    prefix: &ObjectKey,
    dest: &Path,
    options: TreeOptions,
    progress: &dyn ProgressCallback,
) -> Result<TreeReport, SyncError> {
    let prefix = prefix.store_path();
    let mut completed = Vec::new();
    let mut continuation: Option<String> = None;

    loop {
        let page = match store.list_page(prefix, continuation.as_deref()) {
            Ok(page) => page,
            Err(e) if completed.is_empty() => return Err(transfer_err(prefix, e)),
            Err(e) => {
                return Err(SyncError::PartialTreeFailure {
                    key: prefix.to_owned(),
                    completed,
                    source: Box::new(transfer_err(prefix, e)),
                })
            }
        };
        tracing::debug!("listed {} object(s) under {prefix}", page.objects.len());

        let jobs: Vec<TransferJob> = page
            .objects
            .into_iter()
            .filter_map(|meta| download_job(meta, prefix, dest))
            .collect();
        run_jobs(store, &jobs, options, progress, &mut completed)?;

        match page.next {
            Some(next) => continuation = Some(next),
            None => break,
        }
    }

    Ok(TreeReport {
        outcomes: completed,
    })
}

fn download_job(meta: ObjectMeta, prefix: &str, dest: &Path) -> Option<TransferJob> {
    let rest = meta.key.strip_prefix(prefix)?;
    let relative = if prefix.is_empty() || prefix.ends_with('/') || rest.is_empty() {
        rest
    } else {
        // `bin/server2` is not part of `bin/server`.
        rest.strip_prefix('/')?
    };

    let mut local = dest.to_path_buf();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            tracing::warn!("skipping {}: unsafe path segment", meta.key);
            return None;
        }
        local.push(segment);
    }
    Some(TransferJob {
        key: meta.key,
        local,
        expected_size: Some(meta.size),
        direction: Direction::Download,
    })
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// Upload `source` under `prefix`.
///
/// A regular file goes to `prefix/<file name>`; a directory is walked
/// recursively and each regular file goes to `prefix/<relative path>`.
pub fn upload_tree(
    store: &dyn ObjectStore,
    source: &Path,
    prefix: &ObjectKey,
    options: TreeOptions,
    progress: &dyn ProgressCallback,
) -> Result<TreeReport, SyncError> {
    let jobs = plan_upload(source, prefix)?;
    let mut completed = Vec::new();
    run_jobs(store, &jobs, options, progress, &mut completed)?;
    Ok(TreeReport {
        outcomes: completed,
    })
}

/// Walk `source` and build upload jobs without transferring anything.
///
/// Any walk error aborts the plan, so a failed walk uploads nothing.
pub fn plan_upload(source: &Path, prefix: &ObjectKey) -> Result<Vec<TransferJob>, SyncError> {
    let meta = fs::metadata(source).map_err(|e| io_err(source, e))?;
    if meta.is_file() {
        let name = utf8_name(source, source.file_name())?;
        return Ok(vec![upload_job(source.to_path_buf(), prefix.join(name), meta.len())]);
    }

    let mut jobs = Vec::new();
    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| SyncError::Walk {
            path: e.path().unwrap_or(source).to_path_buf(),
            source: e,
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        if !entry.file_type().is_file() {
            tracing::debug!("skipping non-regular file {}", entry.path().display());
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| io_err(entry.path(), std::io::Error::other("path escapes source")))?;
        let mut parts = Vec::new();
        for component in relative.components() {
            parts.push(utf8_name(entry.path(), Some(component.as_os_str()))?);
        }
        let size = entry
            .metadata()
            .map_err(|e| SyncError::Walk {
                path: entry.path().to_path_buf(),
                source: e,
            })?
            .len();
        jobs.push(upload_job(
            entry.path().to_path_buf(),
            prefix.join(&parts.join("/")),
            size,
        ));
    }
    Ok(jobs)
}

fn upload_job(local: PathBuf, key: ObjectKey, size: u64) -> TransferJob {
    TransferJob {
        key: key.store_path().to_owned(),
        local,
        expected_size: Some(size),
        direction: Direction::Upload,
    }
}

fn utf8_name<'a>(
    path: &Path,
    name: Option<&'a std::ffi::OsStr>,
) -> Result<&'a str, SyncError> {
    name.and_then(|n| n.to_str()).ok_or_else(|| {
        io_err(
            path,
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "file name is not valid UTF-8",
            ),
        )
    })
}

// ---------------------------------------------------------------------------
// Job runner
// ---------------------------------------------------------------------------

/// Run `jobs`, appending successes to `completed`.
///
/// On failure `completed` is moved into the returned
/// [`SyncError::PartialTreeFailure`], unless it is empty.
pub(crate) fn run_jobs(
    store: &dyn ObjectStore,
    jobs: &[TransferJob],
    options: TreeOptions,
    progress: &dyn ProgressCallback,
    completed: &mut Vec<TransferOutcome>,
) -> Result<(), SyncError> {
    if options.concurrency <= 1 || jobs.len() <= 1 {
        for job in jobs {
            match execute(store, job, progress) {
                Ok(outcome) => completed.push(outcome),
                Err(e) => return Err(partial(&job.key, completed, e)),
            }
        }
        return Ok(());
    }

    let next = AtomicUsize::new(0);
    let failed = AtomicBool::new(false);
    let slots: Vec<Mutex<Option<Result<TransferOutcome, SyncError>>>> =
        jobs.iter().map(|_| Mutex::new(None)).collect();

    thread::scope(|scope| {
        for _ in 0..options.concurrency.min(jobs.len()) {
            scope.spawn(|| {
                while !failed.load(Ordering::SeqCst) {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(job) = jobs.get(index) else {
                        break;
                    };
                    let result = execute(store, job, progress);
                    if result.is_err() {
                        failed.store(true, Ordering::SeqCst);
                    }
                    let mut slot = slots[index].lock().unwrap_or_else(|p| p.into_inner());
                    *slot = Some(result);
                }
            });
        }
    });

    let mut first_failure = None;
    for (slot, job) in slots.into_iter().zip(jobs) {
        match slot.into_inner().unwrap_or_else(|p| p.into_inner()) {
            Some(Ok(outcome)) => completed.push(outcome),
            Some(Err(e)) if first_failure.is_none() => first_failure = Some((job, e)),
            Some(Err(e)) => tracing::debug!("also failed: {}: {e}", job.key),
            None => {}
        }
    }
    match first_failure {
        Some((job, e)) => Err(partial(&job.key, completed, e)),
        None => Ok(()),
    }
}

fn execute(
    store: &dyn ObjectStore,
    job: &TransferJob,
    progress: &dyn ProgressCallback,
) -> Result<TransferOutcome, SyncError> {
    if job.direction == Direction::Download {
        if let Some(parent) = job.local.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SyncError::DestinationNotWritable {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }
    job.run(store, progress)
}

fn partial(key: &str, completed: &mut Vec<TransferOutcome>, source: SyncError) -> SyncError {
    tracing::debug!("tree transfer stopped at {key}: {source}");
    if completed.is_empty() {
        return source;
    }
    SyncError::PartialTreeFailure {
        key: key.to_owned(),
        completed: mem::take(completed),
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mhook_core::{keys::resolve_object, ArtifactCoordinate};
    use tempfile::TempDir;

    fn meta(key: &str) -> ObjectMeta {
        ObjectMeta {
            key: key.to_owned(),
            size: 1,
            etag: None,
        }
    }

    #[test]
    fn tree_prefix_maps_to_relative_paths() {
        let job = download_job(meta("app/main/abc/lib/a.so"), "app/main/abc/", Path::new("out"))
            .expect("job");
        assert_eq!(job.local, Path::new("out").join("lib").join("a.so"));
    }

    #[test]
    fn exact_key_maps_to_destination_itself() {
        let job = download_job(
            meta("app/main/abc/bin/server"),
            "app/main/abc/bin/server",
            Path::new("server"),
        )
        .expect("job");
        assert_eq!(job.local, PathBuf::from("server"));
    }

    #[test]
    fn sibling_with_shared_prefix_is_skipped() {
        let prefix = "app/main/abc/bin/server";
        assert!(download_job(meta("app/main/abc/bin/server2"), prefix, Path::new("d")).is_none());
        assert!(download_job(meta("app/main/abc/bin/server/x"), prefix, Path::new("d")).is_some());
    }

    #[test]
    fn unsafe_segments_are_skipped() {
        assert!(download_job(meta("p/../../etc/passwd"), "p/", Path::new("d")).is_none());
    }

    #[test]
    fn plan_upload_uses_relative_keys_in_order() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("lib")).unwrap();
        fs::write(tmp.path().join("lib").join("a.so"), "a").unwrap();
        fs::write(tmp.path().join("server"), "s").unwrap();

        let prefix = resolve_object(&ArtifactCoordinate::new("app", "main", "abc")).unwrap();
        let jobs = plan_upload(tmp.path(), &prefix).unwrap();
        let keys: Vec<_> = jobs.iter().map(|j| j.key.as_str()).collect();
        assert_eq!(keys, ["app/main/abc/lib/a.so", "app/main/abc/server"]);
    }

    #[test]
    fn plan_upload_of_single_file_uses_basename() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("server");
        fs::write(&file, "s").unwrap();

        let coord = ArtifactCoordinate::new("app", "main", "abc").with_target("bin");
        let jobs = plan_upload(&file, &resolve_object(&coord).unwrap()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].key, "app/main/abc/bin/server");
        assert_eq!(jobs[0].expected_size, Some(1));
    }

    #[test]
    fn plan_upload_of_missing_source_fails() {
        let tmp = TempDir::new().unwrap();
        let prefix = resolve_object(&ArtifactCoordinate::new("app", "main", "abc")).unwrap();
        let err = plan_upload(&tmp.path().join("absent"), &prefix).unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }), "got: {err}");
    }

    #[test]
    fn report_counts_by_kind() {
        let report = TreeReport {
            outcomes: vec![
                TransferOutcome::Downloaded {
                    key: "a".into(),
                    path: "a".into(),
                    bytes: 3,
                },
                TransferOutcome::Unchanged {
                    key: "b".into(),
                    path: "b".into(),
                },
            ],
        };
        assert_eq!(report.downloaded(), 1);
        assert_eq!(report.unchanged(), 1);
        assert_eq!(report.uploaded(), 0);
        assert_eq!(report.bytes(), 3);
    }
}
