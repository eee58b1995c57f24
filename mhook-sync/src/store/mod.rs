//! Object-store collaborator.
//!
//! The engine never talks to a concrete store; it consumes [`ObjectStore`].
//! Keys passed here are store paths (no leading `/`), as returned by
//! [`mhook_core::ObjectKey::store_path`] and by listings.

mod dir;
mod error;
mod memory;
mod retry;
mod s3;

use std::io::{Read, Write};
use std::time::Duration;

pub use dir::DirStore;
pub use error::StoreError;
pub(crate) use error::store_io;
pub use memory::{Fault, MemoryStats, MemoryStore};
pub use retry::RetryingStore;
pub use s3::S3Store;

use crate::fingerprint::{Fingerprint, FingerprintAlgorithm};

/// Metadata for one stored object, from `head` or a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    /// The store's freshness token, if it exposes one.
    pub etag: Option<String>,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ObjectMeta>,
    /// Continuation token for the next page; `None` on the last page.
    pub next: Option<String>,
}

/// Result of a (possibly conditional) retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetOutcome {
    /// The body was streamed into the sink.
    Fetched { bytes: u64 },
    /// The precondition matched; nothing was written to the sink.
    NotModified,
}

/// Result of a store-native existence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeWait {
    Appeared,
    TimedOut,
    /// The store has no native primitive; callers poll `head` instead.
    Unsupported,
}

/// Blocking object-store operations used by the transfer engine.
pub trait ObjectStore: Send + Sync {
    /// Stream `key` into `sink`.
    ///
    /// When `if_none_match` is given and equals the stored object's
    /// freshness token, returns [`GetOutcome::NotModified`] without writing.
    fn get(
        &self,
        key: &str,
        if_none_match: Option<&Fingerprint>,
        sink: &mut dyn Write,
    ) -> Result<GetOutcome, StoreError>;

    /// Stream `size` bytes from `body` into `key`, replacing any object there.
    fn put(&self, key: &str, body: &mut dyn Read, size: u64) -> Result<(), StoreError>;

    /// Object metadata, or `None` if `key` does not exist.
    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError>;

    /// One page of objects whose key starts with `prefix`, in key order.
    fn list_page(&self, prefix: &str, continuation: Option<&str>)
        -> Result<ListPage, StoreError>;

    /// Block up to `timeout` for `key` to exist, if the store can do so natively.
    fn wait_exists(&self, _key: &str, _timeout: Duration) -> Result<NativeWait, StoreError> {
        Ok(NativeWait::Unsupported)
    }

    /// Algorithm behind this store's freshness tokens, when known.
    fn fingerprint_algorithm(&self) -> Option<FingerprintAlgorithm> {
        None
    }
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn get(
        &self,
        key: &str,
        if_none_match: Option<&Fingerprint>,
        sink: &mut dyn Write,
    ) -> Result<GetOutcome, StoreError> {
        (**self).get(key, if_none_match, sink)
    }

    fn put(&self, key: &str, body: &mut dyn Read, size: u64) -> Result<(), StoreError> {
        (**self).put(key, body, size)
    }

    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        (**self).head(key)
    }

    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        (**self).list_page(prefix, continuation)
    }

    fn wait_exists(&self, key: &str, timeout: Duration) -> Result<NativeWait, StoreError> {
        (**self).wait_exists(key, timeout)
    }

    fn fingerprint_algorithm(&self) -> Option<FingerprintAlgorithm> {
        (**self).fingerprint_algorithm()
    }
}

impl<S: ObjectStore + ?Sized> ObjectStore for Box<S> {
    fn get(
        &self,
        key: &str,
        if_none_match: Option<&Fingerprint>,
        sink: &mut dyn Write,
    ) -> Result<GetOutcome, StoreError> {
        (**self).get(key, if_none_match, sink)
    }

    fn put(&self, key: &str, body: &mut dyn Read, size: u64) -> Result<(), StoreError> {
        (**self).put(key, body, size)
    }

    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        (**self).head(key)
    }

    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        (**self).list_page(prefix, continuation)
    }

    fn wait_exists(&self, key: &str, timeout: Duration) -> Result<NativeWait, StoreError> {
        (**self).wait_exists(key, timeout)
    }

    fn fingerprint_algorithm(&self) -> Option<FingerprintAlgorithm> {
        (**self).fingerprint_algorithm()
    }
}

/// Page size used by backends that do not override it.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Shared pagination over a sorted key list: objects strictly after
/// `continuation`, at most `page_size` of them.
pub(crate) fn paginate(
    sorted: impl Iterator<Item = ObjectMeta>,
    continuation: Option<&str>,
    page_size: usize,
) -> ListPage {
    let page_size = page_size.max(1);
    let mut objects: Vec<ObjectMeta> = sorted
        .filter(|o| continuation.map_or(true, |after| o.key.as_str() > after))
        .take(page_size + 1)
        .collect();
    let next = if objects.len() > page_size {
        objects.truncate(page_size);
        objects.last().map(|o| o.key.clone())
    } else {
        None
    };
    ListPage { objects, next }
}
