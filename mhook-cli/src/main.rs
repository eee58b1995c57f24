//! mhook: fetch and publish build artifacts stored under the MUFL layout.
//!
//! # Usage
//!
//! ```text
//! mhook [-b bucket] [-p project] [-r branch] head
//! mhook wait <target> [--commit <id>] [--timeout <secs>]
//! mhook [download] <target> [destination] [--commit <id>] [--wait] [--json]
//! mhook upload <source> [prefix] [--commit <id>] [--latest] [--json]
//! mhook config show|save
//! ```
//!
//! Every global flag can also come from `MHOOK_*` environment variables or
//! from `~/.mhook/config.yaml`. Objects live in S3 unless `--store` names a
//! local directory.

mod commands;

use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mhook_sync::CancelFlag;

use commands::{
    config::ConfigArgs, download::DownloadArgs, head::HeadArgs, upload::UploadArgs,
    wait::WaitArgs, GlobalArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "mhook",
    version,
    about = "Manage the MUFL: versioned build artifacts in an object store",
    long_about = None,
    arg_required_else_help = true,
    subcommand_negates_reqs = true,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// `mhook <target> [destination]` is `mhook download <target> [destination]`.
    #[command(flatten)]
    download: DownloadArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the commit HEAD points at for the branch.
    Head(HeadArgs),

    /// Wait until a key exists.
    Wait(WaitArgs),

    /// Download an artifact. Without a destination, the target's base name is used.
    Download(DownloadArgs),

    /// Upload a file or directory under a commit.
    Upload(UploadArgs),

    /// Show or save the layered configuration.
    Config(ConfigArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.debug);
    cancel_on_interrupt(cli.global.cancel.clone())?;
    match cli.command {
        Some(Commands::Head(args)) => args.run(&cli.global),
        Some(Commands::Wait(args)) => args.run(&cli.global),
        Some(Commands::Download(args)) => args.run(&cli.global),
        Some(Commands::Upload(args)) => args.run(&cli.global),
        Some(Commands::Config(args)) => args.run(&cli.global),
        None => cli.download.run(&cli.global),
    }
}

/// The first Ctrl-C sets `cancel`, so the running wait or transfer stops
/// and removes its temp file; a second one exits immediately.
fn cancel_on_interrupt(cancel: CancelFlag) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start the interrupt handler")?;
    thread::Builder::new()
        .name("interrupt".into())
        .spawn(move || {
            runtime.block_on(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::debug!("cannot listen for Ctrl-C: {e}");
                    return;
                }
                tracing::warn!("interrupted, cancelling");
                cancel.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            })
        })
        .context("failed to start the interrupt handler")?;
    Ok(())
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
