//! Subcommands and the flags, config and output helpers they share.

pub mod config;
pub mod download;
pub mod head;
pub mod upload;
pub mod wait;

use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use mhook_core::{ConfigFile, MhookConfig, StoreLocation};
use mhook_sync::{
    CancelFlag, DirStore, Mhook, ObjectStore, ProgressCallback, RetryingStore, S3Store,
    TransferOutcome, TransferProgress, TreeOptions, TreeReport,
};

/// Seconds `wait` and `download --wait` block before giving up (20 × 5 s).
pub const DEFAULT_WAIT_SECS: u64 = 100;

pub type Engine = Mhook<Box<dyn ObjectStore>>;

// ---------------------------------------------------------------------------
// Global flags
// ---------------------------------------------------------------------------

/// Flags accepted by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Bucket holding the artifacts.
    #[arg(long, short = 'b', env = "MHOOK_BUCKET", global = true)]
    pub bucket: Option<String>,

    /// Project name.
    #[arg(long, short = 'p', env = "MHOOK_PROJECT", global = true)]
    pub project: Option<String>,

    /// Git branch [default: master].
    #[arg(long, short = 'r', env = "MHOOK_BRANCH", global = true)]
    pub branch: Option<String>,

    /// Store region [default: us-east-1].
    #[arg(long, env = "MHOOK_REGION", global = true)]
    pub region: Option<String>,

    /// `s3` [default], or a directory holding one subdirectory per bucket.
    #[arg(long, env = "MHOOK_STORE", global = true)]
    pub store: Option<String>,

    /// Config file to use instead of `~/.mhook/config.yaml`.
    #[arg(long, env = "MHOOK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Retries for transient store failures [default: 10].
    #[arg(long, env = "MHOOK_MAX_RETRIES", global = true)]
    pub max_retries: Option<u32>,

    /// Objects transferred in parallel within a tree.
    #[arg(long, env = "MHOOK_JOBS", default_value_t = 1, global = true)]
    pub jobs: usize,

    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Never draw transfer progress.
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Set on Ctrl-C; stops waits and transfers in flight.
    #[arg(skip)]
    pub cancel: CancelFlag,
}

impl GlobalArgs {
    /// The config file layer: `--config` if given, else `~/.mhook/config.yaml`.
    pub fn file_layer(&self) -> Result<ConfigFile> {
        match &self.config {
            Some(path) => mhook_core::config::load_from(path)
                .with_context(|| format!("failed to load config {}", path.display())),
            None => match dirs::home_dir() {
                Some(home) => mhook_core::config::load_at(&home)
                    .context("failed to load ~/.mhook/config.yaml"),
                None => Ok(ConfigFile::default()),
            },
        }
    }

    /// The layer set by flags and `MHOOK_*` variables.
    pub fn flag_layer(&self, commit: Option<String>) -> ConfigFile {
        ConfigFile {
            bucket: self.bucket.clone(),
            project: self.project.clone(),
            branch: self.branch.clone(),
            commit,
            region: self.region.clone(),
            max_retries: self.max_retries,
            store: self.store.clone(),
        }
    }

    /// Layer the flags over the config file and resolve the result.
    pub fn resolve(&self, commit: Option<String>) -> Result<MhookConfig> {
        let resolved = self
            .file_layer()?
            .merge(self.flag_layer(commit))
            .resolve()
            .context("invalid configuration (see --help)")?;
        tracing::debug!(
            "bucket {} in {:?}, region {}, {} retries",
            resolved.bucket,
            resolved.store,
            resolved.region,
            resolved.max_retries
        );
        Ok(resolved)
    }

    /// Build the transfer engine for a resolved config.
    pub fn engine(&self, config: &MhookConfig) -> Result<Engine> {
        let store: Box<dyn ObjectStore> = match &config.store {
            StoreLocation::S3 => Box::new(
                S3Store::connect(&config.bucket, &config.region, config.max_retries)
                    .context("failed to set up the S3 client")?,
            ),
            StoreLocation::Dir(root) => Box::new(RetryingStore::new(
                DirStore::for_bucket(root, &config.bucket),
                config.max_retries,
            )),
        };
        let draw = !self.no_progress && std::io::stderr().is_terminal();
        Ok(Mhook::new(store)
            .with_options(TreeOptions {
                concurrency: self.jobs.max(1),
            })
            .with_progress(CliProgress::new(self.cancel.clone(), draw)))
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

const PROGRESS_STEP: u64 = 256 * 1024;

/// Stops transfers once Ctrl-C is seen; on a terminal, also redraws a
/// one-line byte counter on stderr per object.
struct CliProgress {
    cancel: CancelFlag,
    draw: bool,
    last_drawn: Mutex<HashMap<String, u64>>,
}

impl CliProgress {
    fn new(cancel: CancelFlag, draw: bool) -> Self {
        Self {
            cancel,
            draw,
            last_drawn: Mutex::default(),
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_progress(&self, progress: &TransferProgress) -> bool {
        if !self.cancel.on_progress(progress) {
            return false;
        }
        if !self.draw {
            return true;
        }
        let mut last = self
            .last_drawn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let drawn = last.entry(progress.key.clone()).or_insert(0);
        let done = Some(progress.bytes_done) == progress.bytes_total;
        if progress.bytes_done - *drawn < PROGRESS_STEP && !done {
            return true;
        }
        *drawn = progress.bytes_done;
        match progress.bytes_total {
            Some(total) => eprint!(
                "\r{} {}/{}",
                progress.key.dimmed(),
                human_bytes(progress.bytes_done),
                human_bytes(total)
            ),
            None => eprint!("\r{} {}", progress.key.dimmed(), human_bytes(progress.bytes_done)),
        }
        true
    }

    fn on_finish(&self, key: &str) {
        let mut last = self
            .last_drawn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if last.remove(key).is_some() {
            eprintln!();
        }
    }
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OutcomeJson<'a> {
    action: &'static str,
    key: &'a str,
    path: String,
    bytes: u64,
}

/// Print one line per object, or a JSON array with `--json`.
pub fn print_report(report: &TreeReport, json: bool) -> Result<()> {
    if json {
        let payload: Vec<_> = report
            .outcomes
            .iter()
            .map(|outcome| OutcomeJson {
                action: match outcome {
                    TransferOutcome::Downloaded { .. } => "downloaded",
                    TransferOutcome::Unchanged { .. } => "unchanged",
                    TransferOutcome::Uploaded { .. } => "uploaded",
                },
                key: outcome.key(),
                path: outcome.path().display().to_string(),
                bytes: outcome.bytes(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    for outcome in &report.outcomes {
        match outcome {
            TransferOutcome::Downloaded { path, .. } => {
                println!("{} {}", "Downloaded".green(), path.display())
            }
            TransferOutcome::Unchanged { path, .. } => {
                println!("{} {}", "Using local copy for".cyan(), path.display())
            }
            TransferOutcome::Uploaded { key, .. } => println!("{} {key}", "Uploaded".green()),
        }
    }
    Ok(())
}
