//! Existence waiter.
//!
//! Prefers the store's native wait, called in short slices so the
//! [`CancelFlag`] is honoured. Stores without one are polled with `head`
//! under exponential backoff. A key ending in `/` names a tree and is
//! polled with a listing until any object exists below it. No path sleeps
//! past the deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use mhook_core::ObjectKey;

use crate::error::{transfer_err, SyncError};
use crate::progress::{ProgressCallback, TransferProgress};
use crate::store::{NativeWait, ObjectStore, StoreError};

const NATIVE_SLICE: Duration = Duration::from_millis(250);
const SLEEP_SLICE: Duration = Duration::from_millis(50);
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Shared flag that interrupts a wait when set.
///
/// Also usable as a [`ProgressCallback`], so the same flag stops transfers
/// in flight.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl ProgressCallback for CancelFlag {
    fn on_progress(&self, _progress: &TransferProgress) -> bool {
        !self.is_cancelled()
    }
}

/// Block until `key` exists, `timeout` elapses, or `cancel` is set.
///
/// For a tree key, "exists" means at least one object below it.
pub fn wait_for(
    store: &dyn ObjectStore,
    key: &ObjectKey,
    timeout: Duration,
    cancel: &CancelFlag,
) -> Result<(), SyncError> {
    let path = key.store_path();
    let deadline = Instant::now() + timeout;
    tracing::debug!("waiting up to {timeout:?} for {key}");

    if key.is_prefix() {
        let any_below = || -> Result<bool, StoreError> {
            Ok(!store.list_page(path, None)?.objects.is_empty())
        };
        return poll(any_below, path, deadline, timeout, cancel);
    }
    let exists = || -> Result<bool, StoreError> { Ok(store.head(path)?.is_some()) };

    loop {
        check_cancel(cancel, path)?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let outcome = store
            .wait_exists(path, remaining.min(NATIVE_SLICE))
            .map_err(|e| transfer_err(path, e))?;
        match outcome {
            NativeWait::Appeared => return Ok(()),
            NativeWait::TimedOut if Instant::now() >= deadline => {
                return Err(timed_out(path, timeout))
            }
            NativeWait::TimedOut => continue,
            NativeWait::Unsupported => return poll(exists, path, deadline, timeout, cancel),
        }
    }
}

fn poll(
    exists: impl Fn() -> Result<bool, StoreError>,
    path: &str,
    deadline: Instant,
    timeout: Duration,
    cancel: &CancelFlag,
) -> Result<(), SyncError> {
    let mut delay = INITIAL_BACKOFF;
    loop {
        check_cancel(cancel, path)?;
        if exists().map_err(|e| transfer_err(path, e))? {
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out(path, timeout));
        }
        sleep_cancellable(delay.min(deadline - now), cancel);
        delay = (delay * 2).min(MAX_BACKOFF);
    }
}

fn sleep_cancellable(total: Duration, cancel: &CancelFlag) {
    let until = Instant::now() + total;
    loop {
        let now = Instant::now();
        if now >= until || cancel.is_cancelled() {
            return;
        }
        thread::sleep((until - now).min(SLEEP_SLICE));
    }
}

fn check_cancel(cancel: &CancelFlag, path: &str) -> Result<(), SyncError> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled {
            key: path.to_owned(),
        });
    }
    Ok(())
}

fn timed_out(path: &str, timeout: Duration) -> SyncError {
    SyncError::WaitTimeout {
        key: path.to_owned(),
        timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DirStore, MemoryStore};
    use mhook_core::{keys::resolve_object, ArtifactCoordinate};
    use tempfile::TempDir;

    fn key() -> ObjectKey {
        resolve_object(&ArtifactCoordinate::new("app", "main", "abc").with_target("done")).unwrap()
    }

    #[test]
    fn existing_key_returns_immediately() {
        let store = MemoryStore::new();
        store.insert("app/main/abc/done", "");
        wait_for(&store, &key(), Duration::from_secs(5), &CancelFlag::new()).unwrap();
    }

    #[test]
    fn polling_fallback_times_out() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let started = Instant::now();
        let err = wait_for(&store, &key(), Duration::from_millis(300), &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, SyncError::WaitTimeout { .. }), "got: {err}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn cancelled_flag_stops_wait() {
        let store = MemoryStore::new();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = wait_for(&store, &key(), Duration::from_secs(60), &cancel).unwrap_err();
        assert!(matches!(err, SyncError::Cancelled { .. }), "got: {err}");
    }

    #[test]
    fn tree_key_waits_for_any_object_below_it() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let tree = resolve_object(&ArtifactCoordinate::new("app", "main", "abc").with_target("dist/"))
            .unwrap();
        let writer = {
            let root = tmp.path().to_path_buf();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                let dir = root.join("app/main/abc/dist");
                std::fs::create_dir_all(&dir).unwrap();
                std::fs::write(dir.join("bundle.js"), "js").unwrap();
            })
        };
        wait_for(&store, &tree, Duration::from_secs(10), &CancelFlag::new()).unwrap();
        writer.join().unwrap();
    }

    #[test]
    fn whole_commit_tree_wait_times_out_cleanly() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let tree = resolve_object(&ArtifactCoordinate::new("app", "main", "abc")).unwrap();
        let err = wait_for(&store, &tree, Duration::from_millis(300), &CancelFlag::new())
            .unwrap_err();
        assert!(matches!(err, SyncError::WaitTimeout { .. }), "got: {err}");
    }

    #[test]
    fn cancel_flag_as_progress_stops_after_cancel() {
        let flag = CancelFlag::new();
        let progress = TransferProgress {
            key: "app/main/abc/done".into(),
            bytes_done: 1,
            bytes_total: None,
        };
        assert!(flag.on_progress(&progress));
        flag.cancel();
        assert!(!flag.on_progress(&progress));
    }

    #[test]
    fn cancel_from_another_thread_interrupts_polling() {
        let tmp = TempDir::new().unwrap();
        let store = DirStore::new(tmp.path());
        let cancel = CancelFlag::new();
        let canceller = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                cancel.cancel();
            })
        };
        let started = Instant::now();
        let err = wait_for(&store, &key(), Duration::from_secs(60), &cancel).unwrap_err();
        canceller.join().unwrap();
        assert!(matches!(err, SyncError::Cancelled { .. }), "got: {err}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
