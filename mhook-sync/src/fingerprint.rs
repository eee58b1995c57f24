//! Freshness oracle.
//!
//! A [`Fingerprint`] is a SHA-256 content digest used only to decide whether
//! a transfer is needed. The comparison is pushed to the store: the local
//! fingerprint travels as an `if-none-match` precondition and a
//! "not modified" answer means the local copy is current.
//!
//! That only works when the store's freshness token is computed with the
//! same algorithm. [`precondition`] therefore fails open: unless the store
//! declares a matching algorithm, no precondition is sent and the object is
//! transferred unconditionally.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::store::ObjectMeta;

/// Digest algorithm behind a fingerprint or a store's freshness token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FingerprintAlgorithm {
    Sha256,
}

/// Lowercase hex content digest plus the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub algorithm: FingerprintAlgorithm,
    pub hex: String,
}

impl Fingerprint {
    pub fn sha256_of(bytes: &[u8]) -> Self {
        Self {
            algorithm: FingerprintAlgorithm::Sha256,
            hex: hex::encode(Sha256::digest(bytes)),
        }
    }

    /// Stream `reader` through SHA-256.
    pub fn sha256_from_reader(reader: &mut dyn Read) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        io::copy(reader, &mut hasher)?;
        Ok(Self {
            algorithm: FingerprintAlgorithm::Sha256,
            hex: hex::encode(hasher.finalize()),
        })
    }

    /// Whether a store token (possibly quoted, as HTTP ETags are) names the
    /// same content.
    pub fn matches_token(&self, token: &str) -> bool {
        token.trim_matches('"').eq_ignore_ascii_case(&self.hex)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.hex.fmt(f)
    }
}

/// Fingerprint of the file at `path`.
///
/// Missing or unreadable files yield `None`, not an error, so the caller
/// simply transfers unconditionally.
pub fn local_fingerprint(path: &Path) -> Option<Fingerprint> {
    let mut file = File::open(path).ok()?;
    match Fingerprint::sha256_from_reader(&mut file) {
        Ok(fp) => Some(fp),
        Err(e) => {
            tracing::debug!("cannot fingerprint {}: {e}", path.display());
            None
        }
    }
}

/// The precondition to attach to a conditional retrieval, if any.
///
/// Returns `None` (always transfer) when the store's token algorithm is
/// unknown or differs from the local one.
pub fn precondition(
    store_algorithm: Option<FingerprintAlgorithm>,
    local: Option<Fingerprint>,
) -> Option<Fingerprint> {
    let local = local?;
    if store_algorithm == Some(local.algorithm) {
        Some(local)
    } else {
        tracing::debug!("store freshness token algorithm unknown or different; transferring");
        None
    }
}

/// Explicit local-vs-remote comparison, for callers that already hold the
/// remote metadata. Fails open the same way as [`precondition`].
pub fn should_transfer(
    local: Option<&Fingerprint>,
    remote: &ObjectMeta,
    store_algorithm: Option<FingerprintAlgorithm>,
) -> bool {
    let (Some(local), Some(token)) = (local, remote.etag.as_deref()) else {
        return true;
    };
    if store_algorithm != Some(local.algorithm) {
        return true;
    }
    !local.matches_token(token)
}
