//! `mhook config`: show or persist the settings the other commands use.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use mhook_core::{config, ConfigFile};

use super::GlobalArgs;

/// Arguments for `mhook config`.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the config file merged with flags and `MHOOK_*` variables.
    Show,

    /// Write the merged settings to `--config` or `~/.mhook/config.yaml`.
    Save,
}

impl ConfigArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        match self.action {
            ConfigAction::Show => {
                let layer = global.file_layer()?.merge(global.flag_layer(None));
                print!("{}", layer.to_yaml()?);
            }
            ConfigAction::Save => {
                // Saving is how an explicit config file gets created.
                let file = match &global.config {
                    Some(path) if !path.exists() => ConfigFile::default(),
                    _ => global.file_layer()?,
                };
                let layer = file.merge(global.flag_layer(None));
                let path = match &global.config {
                    Some(path) => {
                        config::save_to(path, &layer)
                            .with_context(|| format!("failed to save {}", path.display()))?;
                        path.clone()
                    }
                    None => {
                        let home = dirs::home_dir().context("cannot determine home directory")?;
                        config::save_at(&home, &layer)
                            .context("failed to save ~/.mhook/config.yaml")?;
                        config::config_path_at(&home)
                    }
                };
                println!("{} {}", "Saved".green(), path.display());
            }
        }
        Ok(())
    }
}
