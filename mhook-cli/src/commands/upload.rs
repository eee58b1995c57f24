//! `mhook upload`: publish a file or directory under a commit.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{print_report, GlobalArgs};

/// Arguments for `mhook upload`.
#[derive(Args, Debug)]
pub struct UploadArgs {
    /// File or directory to upload.
    pub source: PathBuf,

    /// Path below the commit to upload under.
    pub prefix: Option<String>,

    /// Git commit (or `latest`).
    #[arg(long, short = 'c', env = "MHOOK_COMMIT")]
    pub commit: Option<String>,

    /// Also point HEAD at this commit and copy the upload under `latest`.
    #[arg(long)]
    pub latest: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl UploadArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.resolve(self.commit)?;
        let coord = config
            .coordinate()
            .with_target(self.prefix.unwrap_or_default());
        let engine = global.engine(&config)?;

        let report = if self.latest {
            engine
                .publish_latest(&coord, &self.source)
                .with_context(|| {
                    format!(
                        "publishing {} failed (--latest needs --commit)",
                        self.source.display()
                    )
                })?
        } else {
            engine
                .upload(&coord, &self.source)
                .with_context(|| format!("upload of {} failed", self.source.display()))?
        };
        print_report(&report, self.json)
    }
}
