//! Command-line interface of the updater.
//!
//! Without a subcommand the updater runs a complete update cycle for the product
//! its executable name identifies (see [`run`]). Flags switch that cycle into
//! maintenance modes:
//!
//! - `--install` / `--uninstall` - register or remove the autostart entry and the
//!   daily scheduled task
//! - `--postpone` - record that the user postponed the update and exit
//! - `--background` / `--silent` - no progress bars, honor postpone periods
//! - `--autostart` - started at logon, honor postpone periods
//!
//! The hidden `self-update` subcommand is the hand-off process started when a
//! newer updater is available. It replaces the original executable and exits.
//!
//! # Logging
//!
//! `RUST_LOG` wins when set. Otherwise `--log-level` picks the level, and
//! `--verbose` / `--quiet` are shortcuts for `debug` / `error`. Logs go to stderr.
//!
//! # Examples
//!
//! ```bash
//! # Interactive update check
//! Contoso_Widget_Updater.exe
//!
//! # Daily scheduled run
//! Contoso_Widget_Updater.exe --background
//!
//! # Test against a beta channel with an extra header
//! Contoso_Widget_Updater.exe --channel beta --add-header X-Ring=insider --log-level debug
//! ```

pub mod run;

use crate::config::CliOverrides;
use crate::upgrade::{HandoffRequest, ScratchCopy, run_handoff};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Accepted values of `--log-level`.
const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

/// Top-level command line of the updater.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "updater",
    about = "Keeps an installed product up to date",
    version,
    disable_help_subcommand = true,
    long_about = "Checks the update server for new releases of the product identified by the \
                  executable name, downloads the newest one and runs its installer."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Register autostart and the daily scheduled task, then exit
    #[arg(long, conflicts_with = "uninstall")]
    pub install: bool,

    /// Remove autostart and the daily scheduled task, then exit
    #[arg(long)]
    pub uninstall: bool,

    /// Started at logon
    #[arg(long)]
    pub autostart: bool,

    /// Unattended run without progress output
    #[arg(long, visible_alias = "silent")]
    pub background: bool,

    /// Do not replace the updater with a newer build
    #[arg(long)]
    pub skip_self_update: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", env = "UPDATER_LOG_LEVEL", value_parser = LOG_LEVELS)]
    pub log_level: Option<String>,

    /// Debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Treat the installed product as this version, ignoring detection
    #[arg(long, value_name = "VERSION")]
    pub force_local_version: Option<String>,

    /// Installed version to assume when no detection method is configured
    #[arg(long, value_name = "VERSION")]
    pub local_version: Option<String>,

    /// Release channel
    #[arg(long, env = "UPDATER_CHANNEL")]
    pub channel: Option<String>,

    /// Running as a temporary copy of the updater
    #[arg(long)]
    pub temporary: bool,

    /// Terminate this process before running the installer
    #[arg(long, value_name = "PID")]
    pub terminate_process_before_update: Option<u32>,

    /// Additional request header, repeatable
    #[arg(long = "add-header", value_name = "NAME=VALUE", value_parser = parse_header)]
    pub add_header: Vec<(String, String)>,

    /// Ignore a postponed update
    #[arg(long)]
    pub ignore_postpone: bool,

    /// Postpone the update for 24 hours, then exit
    #[arg(long)]
    pub postpone: bool,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Replace an updater executable once its process has exited
    #[command(hide = true)]
    SelfUpdate(SelfUpdateArgs),
}

/// Arguments of the hand-off process.
#[derive(Args, Debug, Clone)]
pub struct SelfUpdateArgs {
    /// Process id of the updater being replaced
    #[arg(long)]
    pub pid: u32,

    /// Download URL of the new updater
    #[arg(long)]
    pub url: String,

    /// Path of the updater being replaced
    #[arg(long)]
    pub path: PathBuf,

    /// Unattended run: no error dialog, warnings and errors only unless
    /// `--log-level` is given
    #[arg(long)]
    pub silent: bool,

    /// Log level
    #[arg(long, value_name = "LEVEL", value_parser = LOG_LEVELS)]
    pub log_level: Option<String>,
}

impl SelfUpdateArgs {
    /// Level directive of the hand-off process, `None` to defer to the top level.
    fn log_directive(&self) -> Option<String> {
        self.log_level.clone().or_else(|| self.silent.then(|| "warn".to_string()))
    }

    async fn execute(self) -> Result<()> {
        // The hand-off normally runs from a scratch copy in the temp directory
        let _scratch = ScratchCopy::current_if_scratch();

        let request = HandoffRequest {
            pid: self.pid,
            url: self.url,
            target: self.path,
        };
        if let Err(e) = run_handoff(&request).await {
            if !self.silent {
                report_handoff_failure(&e);
            }
            return Err(e);
        }
        info!("Self-update of {} complete", request.target.display());
        Ok(())
    }
}

#[cfg(windows)]
fn report_handoff_failure(error: &anyhow::Error) {
    crate::platform::windows::show_error_dialog("Updater", &format!("{error:#}"));
}

#[cfg(not(windows))]
fn report_handoff_failure(error: &anyhow::Error) {
    tracing::debug!("Self-update failed: {:#}", error);
}

/// Parse a `NAME=VALUE` header argument.
fn parse_header(raw: &str) -> std::result::Result<(String, String), String> {
    let (name, value) =
        raw.split_once('=').ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name missing in '{raw}'"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

impl Cli {
    /// Execute the command line.
    ///
    /// Installs the tracing subscriber, then runs either the hand-off process or a
    /// full update cycle.
    ///
    /// # Errors
    ///
    /// Returns the failure of the selected mode. Failures the update cycle already
    /// reported to the user are returned as well so the process exit code is
    /// non-zero.
    pub async fn execute(mut self) -> Result<()> {
        init_logging(self.log_filter());

        match self.command.take() {
            Some(Commands::SelfUpdate(args)) => args.execute().await,
            None => run::run(self).await,
        }
    }

    /// Level directive selected by the flags, ignoring `RUST_LOG`.
    #[must_use]
    pub fn log_directive(&self) -> String {
        let from_subcommand = match &self.command {
            Some(Commands::SelfUpdate(args)) => args.log_directive(),
            None => None,
        };

        if let Some(level) = from_subcommand.or_else(|| self.log_level.clone()) {
            level
        } else if self.verbose {
            "debug".to_string()
        } else if self.quiet {
            "error".to_string()
        } else {
            "info".to_string()
        }
    }

    fn log_filter(&self) -> EnvFilter {
        if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(self.log_directive())
        }
    }

    /// Whether progress output is suppressed.
    #[must_use]
    pub const fn is_unattended(&self) -> bool {
        self.background || self.autostart
    }

    /// Values that override every configuration source.
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            channel: self.channel.clone(),
            force_local_version: self.force_local_version.clone(),
            local_version: self.local_version.clone(),
            additional_headers: self.add_header.clone(),
            ignore_postpone: self.ignore_postpone,
        }
    }

    /// Arguments to forward when relaunching, without the program name.
    #[must_use]
    pub fn forwarded_arguments() -> Vec<String> {
        std::env::args().skip(1).collect()
    }
}

fn init_logging(filter: EnvFilter) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
