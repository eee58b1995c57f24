//! Transport-level retries as a store decorator.
//!
//! The engine never retries on its own. Wrapping a backend in
//! [`RetryingStore`] makes every retry happen, and get logged, at the store
//! boundary. A `get` or `put` is only retried while no body bytes have moved;
//! once the sink or source has been touched the error is returned as-is.

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use super::{GetOutcome, ListPage, NativeWait, ObjectMeta, ObjectStore, StoreError};
use crate::fingerprint::{Fingerprint, FingerprintAlgorithm};

const BASE_DELAY: Duration = Duration::from_millis(100);
const MAX_DELAY: Duration = Duration::from_secs(5);

/// Retries [`StoreError::is_retryable`] failures with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryingStore<S> {
    inner: S,
    max_retries: u32,
    base_delay: Duration,
}

impl<S: ObjectStore> RetryingStore<S> {
    pub fn new(inner: S, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            base_delay: BASE_DELAY,
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn run<T>(
        &self,
        op: &str,
        key: &str,
        mut attempt_fn: impl FnMut() -> Result<T, StoreError>,
        mut may_retry: impl FnMut() -> bool,
    ) -> Result<T, StoreError> {
        let mut delay = self.base_delay;
        let mut attempt = 0;
        loop {
            match attempt_fn() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries && may_retry() => {
                    attempt += 1;
                    tracing::warn!(
                        "{op} {key} failed: {e}; retry {attempt}/{} in {delay:?}",
                        self.max_retries
                    );
                    thread::sleep(delay);
                    delay = (delay * 2).min(MAX_DELAY);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

struct CountingWriter<'a> {
    inner: &'a mut dyn Write,
    written: u64,
}

impl Write for CountingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct CountingReader<'a> {
    inner: &'a mut dyn Read,
    read: u64,
}

impl Read for CountingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        Ok(n)
    }
}

impl<S: ObjectStore> ObjectStore for RetryingStore<S> {
    fn get(
        &self,
        key: &str,
        if_none_match: Option<&Fingerprint>,
        sink: &mut dyn Write,
    ) -> Result<GetOutcome, StoreError> {
        let mut counting = CountingWriter {
            inner: sink,
            written: 0,
        };
        let counting = std::cell::RefCell::new(&mut counting);
        self.run(
            "get",
            key,
            || {
                let mut guard = counting.borrow_mut();
                self.inner.get(key, if_none_match, &mut **guard)
            },
            || counting.borrow().written == 0,
        )
    }

    fn put(&self, key: &str, body: &mut dyn Read, size: u64) -> Result<(), StoreError> {
        let mut counting = CountingReader {
            inner: body,
            read: 0,
        };
        let counting = std::cell::RefCell::new(&mut counting);
        self.run(
            "put",
            key,
            || {
                let mut guard = counting.borrow_mut();
                self.inner.put(key, &mut **guard, size)
            },
            || counting.borrow().read == 0,
        )
    }

    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        self.run("head", key, || self.inner.head(key), || true)
    }

    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        self.run(
            "list",
            prefix,
            || self.inner.list_page(prefix, continuation),
            || true,
        )
    }

    fn wait_exists(&self, key: &str, timeout: Duration) -> Result<NativeWait, StoreError> {
        self.inner.wait_exists(key, timeout)
    }

    fn fingerprint_algorithm(&self) -> Option<FingerprintAlgorithm> {
        self.inner.fingerprint_algorithm()
    }
}
