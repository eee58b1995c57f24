//! mhook core library: artifact coordinates, MUFL key resolution, config.
//!
//! - [`types`]: newtypes and [`ArtifactCoordinate`]
//! - [`keys`]: pure mapping from coordinates to object-store keys
//! - [`config`]: resolved configuration and the optional YAML config file
//! - [`error`]: [`CoordinateError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod keys;
pub mod types;

pub use config::{ConfigFile, MhookConfig, StoreLocation};
pub use error::{ConfigError, CoordinateError};
pub use keys::{resolve_head, resolve_object, ObjectKey};
pub use types::{ArtifactCoordinate, BranchName, CommitId, ProjectName, LATEST};
