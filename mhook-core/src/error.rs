//! Error types for mhook-core.

use std::path::PathBuf;

use thiserror::Error;

/// A coordinate that cannot be mapped onto the MUFL key layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    /// A required component (project, branch or commit) is empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A single-segment component contains a `/`.
    #[error("{field} '{value}' must not contain '/'")]
    Separator { field: &'static str, value: String },

    /// The `latest` alias was used where a concrete commit id is required.
    #[error("commit '{alias}' is a reserved alias; a commit id is required")]
    ReservedAlias { alias: &'static str },

    /// The target contains a `.` or `..` path segment.
    #[error("target '{target}' contains a relative path segment")]
    RelativeSegment { target: String },
}

/// All errors that can arise while loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file path.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A setting with no default was not supplied by flag, env or file.
    #[error("{0} is not configured")]
    Missing(&'static str),

    /// The configured project/branch/commit do not form a valid coordinate.
    #[error("invalid coordinate: {0}")]
    Coordinate(#[from] CoordinateError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
