//! `mhook download`: fetch an object or tree, skipping unchanged files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use mhook_core::keys::resolve_object;

use super::{print_report, GlobalArgs, DEFAULT_WAIT_SECS};

/// Arguments for `mhook download`, also accepted without the subcommand.
#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Path below the commit; `/` fetches the whole commit tree.
    #[arg(required = true)]
    pub target: Option<String>,

    /// Local file or directory [default: base name of the target].
    pub destination: Option<PathBuf>,

    /// Git commit (or `latest`).
    #[arg(long, short = 'c', env = "MHOOK_COMMIT")]
    pub commit: Option<String>,

    /// Wait for the target to exist before downloading.
    #[arg(long)]
    pub wait: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl DownloadArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let target = self.target.context("a download target is required")?;
        let config = global.resolve(self.commit)?;
        let coord = config.coordinate().with_target(target.as_str());
        let engine = global.engine(&config)?;
        let destination = self
            .destination
            .unwrap_or_else(|| default_destination(&target));

        if self.wait {
            engine
                .wait(&coord, Duration::from_secs(DEFAULT_WAIT_SECS), &global.cancel)
                .with_context(|| format!("'{target}' did not appear"))?;
        }

        if !self.json {
            println!("Downloading from {}", resolve_object(&coord)?);
        }
        let report = engine
            .download(&coord, &destination)
            .with_context(|| format!("download of '{target}' failed"))?;
        print_report(&report, self.json)
    }
}

fn default_destination(target: &str) -> PathBuf {
    Path::new(target)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
