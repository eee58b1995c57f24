//! Configuration: an optional YAML file layered under CLI flags and env.
//!
//! # Storage layout
//!
//! ```text
//! ~/.mhook/
//!   config.yaml   (optional; every field may be omitted)
//! ```
//!
//! Layers are plain [`ConfigFile`] values merged with [`ConfigFile::merge`];
//! [`ConfigFile::resolve`] applies defaults and produces a [`MhookConfig`].
//! As elsewhere, `fn_at(home, …)` takes an explicit home for tests.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::keys;
use crate::types::{ArtifactCoordinate, BranchName, CommitId, ProjectName, LATEST};

pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MAX_RETRIES: u32 = 10;
const S3_SCHEME: &str = "s3://";

/// One configuration layer. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// `s3` (the default) or a directory holding one subdirectory per bucket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
}

/// Where the bucket's objects live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Amazon S3 in the configured region.
    S3,
    /// A local directory tree; the bucket is a subdirectory of this root.
    Dir(PathBuf),
}

impl StoreLocation {
    /// `s3` and any `s3://` URL select S3; anything else is a directory.
    pub fn parse(value: &str) -> StoreLocation {
        if value == "s3" || value.starts_with(S3_SCHEME) {
            StoreLocation::S3
        } else {
            StoreLocation::Dir(PathBuf::from(value))
        }
    }
}

/// Fully-resolved configuration handed to the transfer engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MhookConfig {
    pub bucket: String,
    pub project: ProjectName,
    pub branch: BranchName,
    pub commit: CommitId,
    pub region: String,
    pub max_retries: u32,
    pub store: StoreLocation,
}

impl MhookConfig {
    /// Coordinate of the whole commit tree described by this config.
    pub fn coordinate(&self) -> ArtifactCoordinate {
        ArtifactCoordinate::new(
            self.project.clone(),
            self.branch.clone(),
            self.commit.clone(),
        )
    }
}

impl ConfigFile {
    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(self, other: ConfigFile) -> ConfigFile {
        ConfigFile {
            bucket: other.bucket.or(self.bucket),
            project: other.project.or(self.project),
            branch: other.branch.or(self.branch),
            commit: other.commit.or(self.commit),
            region: other.region.or(self.region),
            max_retries: other.max_retries.or(self.max_retries),
            store: other.store.or(self.store),
        }
    }

    /// Apply defaults and validate.
    ///
    /// Empty strings count as unset, so `--bucket ""` is rejected the same
    /// way as a missing bucket. A bucket given as `s3://name` selects S3
    /// regardless of the store layer.
    pub fn resolve(self) -> Result<MhookConfig, ConfigError> {
        let bucket = non_empty(self.bucket).ok_or(ConfigError::Missing("bucket"))?;
        let (bucket, store) = match bucket.strip_prefix(S3_SCHEME) {
            Some(name) => (name.trim_end_matches('/').to_owned(), StoreLocation::S3),
            None => (
                bucket,
                non_empty(self.store)
                    .as_deref()
                    .map(StoreLocation::parse)
                    .unwrap_or(StoreLocation::S3),
            ),
        };
        if bucket.is_empty() {
            return Err(ConfigError::Missing("bucket"));
        }
        let project = non_empty(self.project).ok_or(ConfigError::Missing("project"))?;

        let config = MhookConfig {
            bucket,
            project: ProjectName::from(project),
            branch: BranchName::from(
                non_empty(self.branch).unwrap_or_else(|| DEFAULT_BRANCH.to_owned()),
            ),
            commit: CommitId::from(non_empty(self.commit).unwrap_or_else(|| LATEST.to_owned())),
            region: non_empty(self.region).unwrap_or_else(|| DEFAULT_REGION.to_owned()),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            store,
        };
        keys::resolve_object(&config.coordinate())?;
        Ok(config)
    }

    /// The layer as it would be written to disk.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// `<home>/.mhook/config.yaml` (pure, no I/O).
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".mhook").join("config.yaml")
}

/// Load `<home>/.mhook/config.yaml`, or an empty layer if it does not exist.
pub fn load_at(home: &Path) -> Result<ConfigFile, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(ConfigFile::default());
    }
    load_from(&path)
}

/// Load an explicitly named config file; a missing file is an error.
pub fn load_from(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Save `<home>/.mhook/config.yaml` atomically.
pub fn save_at(home: &Path, config: &ConfigFile) -> Result<(), ConfigError> {
    save_to(&config_path_at(home), config)
}

/// Save to an explicit path atomically (`.tmp` + rename).
pub fn save_to(path: &Path, config: &ConfigFile) -> Result<(), ConfigError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid config path")));
    };
    if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }

    let yaml = config.to_yaml()?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
