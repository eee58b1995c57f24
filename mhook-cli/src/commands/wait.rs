//! `mhook wait`: block until a key exists.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use super::{GlobalArgs, DEFAULT_WAIT_SECS};

/// Arguments for `mhook wait`.
#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Path below the commit to wait for; a trailing `/` waits for any
    /// object under that tree.
    pub target: String,

    /// Git commit (or `latest`).
    #[arg(long, short = 'c', env = "MHOOK_COMMIT")]
    pub commit: Option<String>,

    /// Seconds to wait before failing.
    #[arg(long, default_value_t = DEFAULT_WAIT_SECS)]
    pub timeout: u64,
}

impl WaitArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.resolve(self.commit)?;
        let coord = config.coordinate().with_target(self.target.as_str());
        global
            .engine(&config)?
            .wait(&coord, Duration::from_secs(self.timeout), &global.cancel)
            .with_context(|| format!("'{}' did not appear", self.target))
    }
}
