//! Self-update orchestration.
//!
//! The server advertises the newest updater build through `instance.latestVersion`
//! and `instance.latestUrl`. When that version is newer than the running build, a
//! scratch copy of the running binary is started with the hidden `self-update`
//! command, which waits for this process to exit and then replaces the original
//! file (see [`super::handoff`]).
//!
//! Loops are impossible by construction: the hand-off command never checks for
//! self-updates, and it only replaces a file after verifying that the process it
//! was pointed at really runs that file.

use super::scratch_copy_of_current_exe;
use crate::instance::UpdaterInstance;
use crate::platform::{LaunchMode, LaunchRequest, quote_argument};
use crate::utils::is_dir_writable;
use crate::version::parse_version;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// Progress of the self-update check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelfUpdateState {
    /// Nothing checked yet
    #[default]
    Idle,
    /// Comparing versions
    CheckingVersion,
    /// The running updater is current
    UpToDate,
    /// A newer updater exists and the hand-off should be started
    SpawnSelfUpdater,
}

/// Options forwarded to the hand-off process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandoffOptions {
    /// Suppress interactive output
    pub silent: bool,
    /// Log level of the hand-off process
    pub log_level: Option<String>,
}

/// Drives the self-update state machine for one instance.
#[derive(Debug, Default)]
pub struct SelfUpdater {
    state: SelfUpdateState,
    options: HandoffOptions,
}

impl SelfUpdater {
    /// Create an idle self-updater.
    #[must_use]
    pub fn new(options: HandoffOptions) -> Self {
        Self {
            state: SelfUpdateState::Idle,
            options,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SelfUpdateState {
        self.state
    }

    /// Compare the running version with the advertised latest updater.
    ///
    /// # Returns
    ///
    /// `true` and state [`SelfUpdateState::SpawnSelfUpdater`] when a newer updater
    /// is available, otherwise `false` and [`SelfUpdateState::UpToDate`].
    pub fn check(&mut self, instance: &UpdaterInstance) -> bool {
        self.state = SelfUpdateState::CheckingVersion;
        let newer = instance.is_newer_updater_available();
        self.state =
            if newer { SelfUpdateState::SpawnSelfUpdater } else { SelfUpdateState::UpToDate };
        newer
    }

    /// Launch the hand-off process.
    ///
    /// Only acts in [`SelfUpdateState::SpawnSelfUpdater`]. Failures are logged and
    /// reported as `false`; the caller continues with the regular update.
    pub fn run(&mut self, instance: &UpdaterInstance) -> bool {
        if self.state != SelfUpdateState::SpawnSelfUpdater {
            debug!("Self-update not pending (state {:?})", self.state);
            return false;
        }

        match spawn_handoff(instance, &self.options) {
            Ok(()) => true,
            Err(e) => {
                warn!("Self-update failed, continuing with the current updater: {:#}", e);
                false
            }
        }
    }
}

impl UpdaterInstance {
    /// Whether the server advertises an updater newer than the running one.
    ///
    /// Requires both `latestVersion` and `latestUrl`. Unparseable versions count
    /// as "not newer".
    #[must_use]
    pub fn is_newer_updater_available(&self) -> bool {
        let Some(config) = self.instance_config() else {
            return false;
        };
        let (Some(latest), Some(url)) = (config.latest_version.as_deref(), config.latest_url.as_deref())
        else {
            return false;
        };
        if url.trim().is_empty() {
            return false;
        }

        match parse_version(latest) {
            Ok(latest) => {
                debug!("Running updater {}, latest updater {}", self.settings().app_version, latest);
                latest > self.settings().app_version
            }
            Err(e) => {
                warn!("Ignoring advertised updater version: {}", e);
                false
            }
        }
    }

    /// Check for and launch a newer updater in one step.
    ///
    /// # Returns
    ///
    /// `true` when the hand-off process was started and this process should exit.
    pub fn run_self_updater(&self, options: &HandoffOptions) -> bool {
        let mut updater = SelfUpdater::new(options.clone());
        updater.check(self) && updater.run(self)
    }
}

fn spawn_handoff(instance: &UpdaterInstance, options: &HandoffOptions) -> Result<()> {
    let url = instance
        .instance_config()
        .and_then(|c| c.latest_url.as_deref())
        .context("Server did not provide a latest updater URL")?;
    let target = instance.settings().app_path.clone();

    let scratch = scratch_copy_of_current_exe()?;

    let mut arguments = vec![
        "self-update".to_string(),
        "--pid".to_string(),
        std::process::id().to_string(),
        "--url".to_string(),
        quote_argument(url),
        "--path".to_string(),
        quote_argument(&target.to_string_lossy()),
    ];
    if options.silent {
        arguments.push("--silent".to_string());
    }
    if let Some(level) = &options.log_level {
        arguments.push("--log-level".to_string());
        arguments.push(level.clone());
    }

    let mode = if is_dir_writable(&instance.settings().app_dir()) {
        LaunchMode::Direct
    } else {
        info!("{} is not writable, requesting elevation", instance.settings().app_dir().display());
        LaunchMode::Elevated
    };

    let request = LaunchRequest::new(&scratch).with_arguments(arguments).with_mode(mode);
    if let Err(e) = instance.platform.launcher.spawn_detached(&request) {
        crate::utils::remove_file_or_schedule(&scratch);
        return Err(e).context("Failed to launch the self-updater");
    }

    info!("Self-updater started from {}", scratch.display());
    Ok(())
}
