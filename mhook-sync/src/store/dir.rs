//! A bucket backed by a local directory.
//!
//! Object `a/b/c` lives at `<root>/a/b/c`. Writes go through a `.mhook-*`
//! temporary file in the target directory and are renamed into place, so a
//! reader never observes a half-written object. Freshness tokens are
//! SHA-256 digests computed on demand.

use std::fs::{self, File};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{paginate, store_io, GetOutcome, ListPage, ObjectMeta, ObjectStore, StoreError};
use super::DEFAULT_PAGE_SIZE;
use crate::fingerprint::{Fingerprint, FingerprintAlgorithm};
use crate::transfer::TEMP_PREFIX;

/// Directory-backed [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
    page_size: usize,
}

impl DirStore {
    /// Bucket rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Bucket `bucket` under a root holding one directory per bucket.
    pub fn for_bucket(store_root: &Path, bucket: &str) -> Self {
        Self::new(store_root.join(bucket))
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let trimmed = key.trim_start_matches('/');
        let invalid = |reason: &str| StoreError::InvalidKey {
            key: key.to_owned(),
            reason: reason.to_owned(),
        };
        if trimmed.is_empty() {
            return Err(invalid("empty key"));
        }
        let mut path = self.root.clone();
        for segment in trimmed.split('/') {
            match segment {
                "" => return Err(invalid("empty path segment")),
                "." | ".." => return Err(invalid("relative path segment")),
                s if s.starts_with(TEMP_PREFIX) => return Err(invalid("reserved name")),
                s => path.push(s),
            }
        }
        Ok(path)
    }

    fn open(&self, key: &str) -> Result<File, StoreError> {
        let path = self.path_for(key)?;
        match File::open(&path) {
            Ok(file) if path.is_file() => Ok(file),
            Ok(_) => Err(StoreError::NotFound {
                key: key.to_owned(),
            }),
            Err(e) => Err(map_open_err(key, e)),
        }
    }
}

impl ObjectStore for DirStore {
    fn get(
        &self,
        key: &str,
        if_none_match: Option<&Fingerprint>,
        sink: &mut dyn Write,
    ) -> Result<GetOutcome, StoreError> {
        if let Some(expected) = if_none_match {
            if expected.algorithm == FingerprintAlgorithm::Sha256 {
                let mut file = self.open(key)?;
                let current =
                    Fingerprint::sha256_from_reader(&mut file).map_err(|e| store_io(key, e))?;
                if current == *expected {
                    return Ok(GetOutcome::NotModified);
                }
            }
        }

        let mut file = self.open(key)?;
        let bytes = io::copy(&mut file, sink).map_err(|e| store_io(key, e))?;
        Ok(GetOutcome::Fetched { bytes })
    }

    fn put(&self, key: &str, body: &mut dyn Read, size: u64) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let Some(dir) = path.parent() else {
            return Err(StoreError::InvalidKey {
                key: key.to_owned(),
                reason: "no parent directory".to_owned(),
            });
        };
        fs::create_dir_all(dir).map_err(|e| store_io(key, e))?;

        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)
            .map_err(|e| store_io(key, e))?;
        let written = io::copy(body, temp.as_file_mut()).map_err(|e| store_io(key, e))?;
        if written != size {
            return Err(StoreError::Other {
                message: format!("short body for {key}: expected {size} bytes, got {written}"),
            });
        }
        temp.as_file().sync_all().map_err(|e| store_io(key, e))?;
        temp.persist(&path).map_err(|e| store_io(key, e.error))?;
        Ok(())
    }

    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        let mut file = match self.open(key) {
            Ok(file) => file,
            Err(StoreError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let size = file.metadata().map_err(|e| store_io(key, e))?.len();
        let etag = Fingerprint::sha256_from_reader(&mut file).map_err(|e| store_io(key, e))?;
        Ok(Some(ObjectMeta {
            key: key.trim_start_matches('/').to_owned(),
            size,
            etag: Some(etag.hex),
        }))
    }

    fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let prefix = prefix.trim_start_matches('/');
        if !self.root.exists() {
            return Ok(ListPage::default());
        }

        let mut objects = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| StoreError::Io {
                key: prefix.to_owned(),
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("filesystem loop")),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if !key.starts_with(prefix) {
                continue;
            }
            let size = entry.metadata().map_err(|e| StoreError::Io {
                key: key.clone(),
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("metadata unavailable")),
            })?;
            objects.push(ObjectMeta {
                key,
                size: size.len(),
                etag: None,
            });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(paginate(objects.into_iter(), continuation, self.page_size))
    }

    fn fingerprint_algorithm(&self) -> Option<FingerprintAlgorithm> {
        Some(FingerprintAlgorithm::Sha256)
    }
}

fn map_open_err(key: &str, e: io::Error) -> StoreError {
    match e.kind() {
        ErrorKind::NotFound => StoreError::NotFound {
            key: key.to_owned(),
        },
        ErrorKind::PermissionDenied => StoreError::AccessDenied {
            key: key.to_owned(),
            message: e.to_string(),
        },
        _ => store_io(key, e),
    }
}
