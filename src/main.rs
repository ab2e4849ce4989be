//! Updater entry point
//!
//! Parses the command line, runs the update cycle or the self-update hand-off,
//! and renders failures with context and suggestions.
//!
//! - no subcommand - check, download and install the newest release
//! - `--install` / `--uninstall` - manage autostart and the daily scheduled task
//! - `--postpone` - skip background updates for 24 hours
//! - `self-update` (hidden) - replace the updater binary after it exited

use anyhow::Result;
use clap::Parser;
use setup_updater::cli;
use setup_updater::core::error::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
