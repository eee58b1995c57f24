//! Domain types for MUFL artifact coordinates.
//!
//! Coordinates are plain data; validation happens when a coordinate is
//! resolved to a key (see [`crate::keys`]).

use std::fmt;

use serde::{Deserialize, Serialize};

/// The reserved commit alias for the most recently published tree.
pub const LATEST: &str = "latest";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed project name (first key segment).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectName(pub String);

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ProjectName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed branch name (second key segment).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchName(pub String);

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for BranchName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BranchName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A commit identifier, or the [`LATEST`] alias.
///
/// Identifiers are opaque; nothing here assumes a git SHA shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommitId(pub String);

impl CommitId {
    /// The `latest` alias.
    pub fn latest() -> Self {
        Self(LATEST.to_owned())
    }

    pub fn is_latest(&self) -> bool {
        self.0 == LATEST
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CommitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Coordinate
// ---------------------------------------------------------------------------

/// A logical request for an artifact: which project, branch, commit and
/// path under the commit tree.
///
/// An empty `target` addresses the whole commit tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactCoordinate {
    pub project: ProjectName,
    pub branch: BranchName,
    pub commit: CommitId,
    #[serde(default)]
    pub target: String,
}

impl ArtifactCoordinate {
    /// Coordinate for the whole tree at `commit`.
    pub fn new(
        project: impl Into<ProjectName>,
        branch: impl Into<BranchName>,
        commit: impl Into<CommitId>,
    ) -> Self {
        Self {
            project: project.into(),
            branch: branch.into(),
            commit: commit.into(),
            target: String::new(),
        }
    }

    /// Same project/branch/commit, different target path.
    pub fn with_target(&self, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..self.clone()
        }
    }

    /// Same coordinate with the commit replaced by the `latest` alias.
    pub fn to_latest(&self) -> Self {
        Self {
            commit: CommitId::latest(),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(ProjectName::from("app").to_string(), "app");
        assert_eq!(BranchName::from("main").to_string(), "main");
        assert_eq!(CommitId::from("abc123").to_string(), "abc123");
    }

    #[test]
    fn to_latest_keeps_target() {
        let coord = ArtifactCoordinate::new("app", "main", "abc123").with_target("bin/server");
        let latest = coord.to_latest();
        assert!(latest.commit.is_latest());
        assert_eq!(latest.target, "bin/server");
        assert_eq!(latest.project, coord.project);
    }

    #[test]
    fn coordinate_yaml_roundtrip_defaults_target() {
        let yaml = "project: app\nbranch: main\ncommit: abc123\n";
        let coord: ArtifactCoordinate = serde_yaml::from_str(yaml).expect("deserialize");
        assert_eq!(coord, ArtifactCoordinate::new("app", "main", "abc123"));
    }
}
