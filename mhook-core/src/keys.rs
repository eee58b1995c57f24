//! MUFL key resolution.
//!
//! ```text
//! /{project}/{branch}/HEAD                 current commit id
//! /{project}/{branch}/latest/{target...}   most recently published tree
//! /{project}/{branch}/{commit}/{target...} tree at a specific commit
//! ```
//!
//! Everything here is pure: no I/O, no shared state.

use std::fmt;

use crate::error::CoordinateError;
use crate::types::ArtifactCoordinate;

/// Name of the per-branch marker object holding the published commit id.
pub const HEAD_MARKER: &str = "HEAD";

/// A fully-qualified object key, always rendered with a leading `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// The key as written in the layout, e.g. `/app/main/HEAD`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key without its leading `/`; the form stores use and list.
    pub fn store_path(&self) -> &str {
        &self.0[1..]
    }

    /// Whether this names a tree (ends in `/`) rather than one object.
    pub fn is_prefix(&self) -> bool {
        self.0.ends_with('/')
    }

    /// Append a relative path (already `/`-separated) to this key.
    pub fn join(&self, relative: &str) -> ObjectKey {
        let relative = relative.trim_start_matches('/');
        if self.0.ends_with('/') {
            ObjectKey(format!("{}{relative}", self.0))
        } else {
            ObjectKey(format!("{}/{relative}", self.0))
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// `/{project}/{branch}/HEAD`
pub fn resolve_head(coord: &ArtifactCoordinate) -> Result<ObjectKey, CoordinateError> {
    let project = segment("project", &coord.project.0)?;
    let branch = segment("branch", &coord.branch.0)?;
    Ok(ObjectKey(format!("/{project}/{branch}/{HEAD_MARKER}")))
}

/// `/{project}/{branch}/{commit}/{target}`
///
/// An empty target yields the prefix of the whole commit tree, ending in `/`.
pub fn resolve_object(coord: &ArtifactCoordinate) -> Result<ObjectKey, CoordinateError> {
    let project = segment("project", &coord.project.0)?;
    let branch = segment("branch", &coord.branch.0)?;
    let commit = segment("commit", &coord.commit.0)?;
    let target = normalize_target(&coord.target)?;
    Ok(ObjectKey(format!("/{project}/{branch}/{commit}/{target}")))
}

fn segment<'a>(field: &'static str, value: &'a str) -> Result<&'a str, CoordinateError> {
    if value.is_empty() {
        return Err(CoordinateError::Empty { field });
    }
    if value.contains('/') {
        return Err(CoordinateError::Separator {
            field,
            value: value.to_owned(),
        });
    }
    Ok(value)
}

fn normalize_target(target: &str) -> Result<&str, CoordinateError> {
    let target = target.trim_start_matches('/');
    if target.split('/').any(|s| s == "." || s == "..") {
        return Err(CoordinateError::RelativeSegment {
            target: target.to_owned(),
        });
    }
    Ok(target)
}
