//! In-process bucket.
//!
//! Used by tests and by callers that want a scratch store. Besides the
//! [`ObjectStore`] operations it counts transfers and can inject faults so
//! partial-failure behaviour can be exercised deterministically.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{paginate, store_io, GetOutcome, ListPage, NativeWait, ObjectMeta, ObjectStore};
use super::{StoreError, DEFAULT_PAGE_SIZE};
use crate::fingerprint::{Fingerprint, FingerprintAlgorithm};

/// An injected failure for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `get` streams this many bytes, then fails with a network error.
    GetInterrupted { after_bytes: usize },
    /// `put` consumes the body, then fails with a network error.
    PutRejected,
}

/// Transfer counters, for asserting how much work a call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub gets: u64,
    pub not_modified: u64,
    pub bytes_served: u64,
    pub puts: u64,
    pub bytes_stored: u64,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, Vec<u8>>,
    faults: HashMap<String, Fault>,
    stats: MemoryStats,
}

/// Mutex-guarded in-memory [`ObjectStore`] with a native existence wait.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    changed: Condvar,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            changed: Condvar::new(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Store `bytes` under `key` directly, bypassing counters and faults.
    pub fn insert(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        let mut inner = self.lock();
        inner.objects.insert(normalize(key).to_owned(), bytes.into());
        self.changed.notify_all();
    }

    /// Current body of `key`, if present.
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(normalize(key)).cloned()
    }

    /// All keys in order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    pub fn inject(&self, key: &str, fault: Fault) {
        self.lock().faults.insert(normalize(key).to_owned(), fault);
    }

    pub fn stats(&self) -> MemoryStats {
        self.lock().stats
    }

    pub fn reset_stats(&self) {
        self.lock().stats = MemoryStats::default();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Poisoning is ignored: no critical section leaves the map half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn normalize(key: &str) -> &str {
    key.trim_start_matches('/')
}

fn interrupted(key: &str) -> StoreError {
    StoreError::Network {
        message: format!("connection reset while transferring {key}"),
        retryable: false,
    }
}

impl ObjectStore for MemoryStore {
    fn get(
        &self,
        key: &str,
        if_none_match: Option<&Fingerprint>,
        sink: &mut dyn Write,
    ) -> Result<GetOutcome, StoreError> {
        let key = normalize(key);
        let (body, fault) = {
            let mut inner = self.lock();
            inner.stats.gets += 1;
            let Some(body) = inner.objects.get(key).cloned() else {
                return Err(StoreError::NotFound {
                    key: key.to_owned(),
                });
            };
            if let Some(expected) = if_none_match {
                if Fingerprint::sha256_of(&body) == *expected {
                    inner.stats.not_modified += 1;
                    return Ok(GetOutcome::NotModified);
                }
            }
            (body, inner.faults.get(key).copied())
        };

        // Stream without holding the lock; sinks may report progress.
        if let Some(Fault::GetInterrupted { after_bytes }) = fault {
            let partial = &body[..after_bytes.min(body.len())];
            sink.write_all(partial).map_err(|e| store_io(key, e))?;
            self.lock().stats.bytes_served += partial.len() as u64;
            return Err(interrupted(key));
        }
        for chunk in body.chunks(8 * 1024) {
            sink.write_all(chunk).map_err(|e| store_io(key, e))?;
        }
        let mut inner = self.lock();
        inner.stats.bytes_served += body.len() as u64;
        Ok(GetOutcome::Fetched {
            bytes: body.len() as u64,
        })
    }

    fn put(&self, key: &str, body: &mut dyn Read, size: u64) -> Result<(), StoreError> {
        let key = normalize(key);
        if key.is_empty() {
            return Err(StoreError::InvalidKey {
                key: key.to_owned(),
                reason: "empty key".to_owned(),
            });
        }
        let mut bytes = Vec::with_capacity(size as usize);
        body.read_to_end(&mut bytes).map_err(|e| store_io(key, e))?;
        if bytes.len() as u64 != size {
            return Err(StoreError::Other {
                message: format!(
                    "short body for {key}: expected {size} bytes, got {}",
                    bytes.len()
                ),
            });
        }

        let mut inner = self.lock();
        inner.stats.puts += 1;
        if inner.faults.get(key) == Some(&Fault::PutRejected) {
            return Err(interrupted(key));
        }
        inner.stats.bytes_stored += size;
        inner.objects.insert(key.to_owned(), bytes);
        self.changed.notify_all();
        Ok(())
    }

    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        let key = normalize(key);
        Ok(self.lock().objects.get(key).map(|body| ObjectMeta {
            key: key.to_owned(),
            size: body.len() as u64,
            etag: Some(Fingerprint::sha256_of(body).hex),
        }))
    }

    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let prefix = normalize(prefix);
        let inner = self.lock();
        let matching = inner
            .objects
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, body)| ObjectMeta {
                key: k.clone(),
                size: body.len() as u64,
                etag: Some(Fingerprint::sha256_of(body).hex),
            });
        Ok(paginate(matching, continuation, self.page_size))
    }

    fn wait_exists(&self, key: &str, timeout: Duration) -> Result<NativeWait, StoreError> {
        let key = normalize(key);
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if inner.objects.contains_key(key) {
                return Ok(NativeWait::Appeared);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(NativeWait::TimedOut);
            }
            inner = self
                .changed
                .wait_timeout(inner, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    fn fingerprint_algorithm(&self) -> Option<FingerprintAlgorithm> {
        Some(FingerprintAlgorithm::Sha256)
    }
}
