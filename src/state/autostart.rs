//! Autostart registration.
//!
//! Registers the updater to start at logon with `--autostart`:
//! - Windows: `HKCU\Software\Microsoft\Windows\CurrentVersion\Run`
//! - macOS: LaunchAgent plist in `~/Library/LaunchAgents/`
//! - Linux: `.desktop` file in `~/.config/autostart/`
//!
//! The entry is named after the executable stem so several products can each
//! register their own updater.

use crate::config::InstanceSettings;
use crate::constants::AUTOSTART_SWITCH;
use crate::core::UpdaterError;
use auto_launch::{AutoLaunch, AutoLaunchBuilder};
use tracing::{debug, info};

fn registration_error(operation: &str, reason: impl ToString) -> UpdaterError {
    UpdaterError::Registration {
        operation: operation.to_string(),
        reason: reason.to_string(),
    }
}

fn launcher(settings: &InstanceSettings) -> Result<AutoLaunch, UpdaterError> {
    let exe_str = settings
        .app_path
        .to_str()
        .ok_or_else(|| registration_error("create autostart entry", "executable path is not UTF-8"))?;
    let app_name = settings.identity.app_stem.as_str();
    let args = &[AUTOSTART_SWITCH];

    #[cfg(target_os = "macos")]
    let launcher = AutoLaunchBuilder::new()
        .set_app_name(app_name)
        .set_app_path(exe_str)
        .set_args(args)
        .set_use_launch_agent(true)
        .build()
        .map_err(|e| registration_error("create autostart entry", e))?;

    #[cfg(not(target_os = "macos"))]
    let launcher = AutoLaunchBuilder::new()
        .set_app_name(app_name)
        .set_app_path(exe_str)
        .set_args(args)
        .build()
        .map_err(|e| registration_error("create autostart entry", e))?;

    Ok(launcher)
}

/// Start the updater at logon.
///
/// # Errors
///
/// [`UpdaterError::Registration`] if the entry cannot be written.
pub fn register_autostart(settings: &InstanceSettings) -> Result<(), UpdaterError> {
    launcher(settings)?.enable().map_err(|e| registration_error("register autostart", e))?;
    info!("Registered {} for autostart", settings.app_path.display());
    Ok(())
}

/// Stop starting the updater at logon. A missing entry is not an error.
///
/// # Errors
///
/// [`UpdaterError::Registration`] if an existing entry cannot be removed.
pub fn remove_autostart(settings: &InstanceSettings) -> Result<(), UpdaterError> {
    let launcher = launcher(settings)?;
    if !launcher.is_enabled().unwrap_or(false) {
        debug!("No autostart entry for {}", settings.identity.app_stem);
        return Ok(());
    }

    launcher.disable().map_err(|e| registration_error("remove autostart", e))?;
    info!("Removed autostart entry for {}", settings.identity.app_stem);
    Ok(())
}

/// Whether an autostart entry exists for this updater.
#[must_use]
pub fn is_autostart_registered(settings: &InstanceSettings) -> bool {
    launcher(settings).is_ok_and(|l| l.is_enabled().unwrap_or(false))
}
