//! `mhook head`: print the commit HEAD points at.

use anyhow::{Context, Result};
use clap::Args;

use super::GlobalArgs;

/// Arguments for `mhook head`.
#[derive(Args, Debug)]
pub struct HeadArgs {}

impl HeadArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let config = global.resolve(None)?;
        let coord = config.coordinate();
        let commit = global
            .engine(&config)?
            .head(&coord)
            .with_context(|| format!("failed to read HEAD for {}/{}", coord.project, coord.branch))?;
        // No trailing newline, so `$(mhook head)` is usable as-is.
        print!("{commit}");
        Ok(())
    }
}
