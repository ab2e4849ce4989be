//! Headless update cycle.
//!
//! [`run`] executes one complete pass for the product the executable name
//! identifies:
//!
//! 1. `--install` / `--uninstall` / `--postpone` maintenance modes
//! 2. Relaunch from a temporary copy when configured
//! 3. Fetch the update information
//! 4. Emergency URL and disabled updates
//! 5. Self-update of the updater itself
//! 6. Postpone period (background and autostart runs only)
//! 7. Installed version detection
//! 8. Download of the newest release
//! 9. Installer execution
//! 10. Error URL when an interactive run fails

use super::Cli;
use crate::config::{InstanceSettings, LocalConfigFile};
use crate::core::UpdaterError;
use crate::instance::{ProgressCallback, UpdaterInstance};
use crate::models::VersionResource;
use crate::platform::Platform;
use crate::state::{
    PostponeState, create_scheduled_task, register_autostart, remove_autostart,
    remove_scheduled_task,
};
use crate::upgrade::{
    HandoffOptions, ScratchCopy, relaunch_as_temporary_copy, verify_parent_identity,
};
use crate::utils::DownloadProgress;
use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How an update cycle ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The installed product is current or there is nothing to install
    UpToDate,
    /// Updates are disabled by the server
    Disabled,
    /// The emergency URL was opened instead of updating
    Emergency,
    /// The user postponed the update less than 24 hours ago
    Postponed,
    /// The hand-off process replaces the updater, this process stops
    SelfUpdating,
    /// A release was downloaded and installed
    Installed,
}

/// Run the updater as described by the command line.
///
/// # Errors
///
/// Returns an error when the parent identity check, a maintenance mode, the
/// fetch, detection, download or installer failed.
pub async fn run(cli: Cli) -> Result<()> {
    let platform = Platform::system();

    let mut _scratch: Option<ScratchCopy> = None;
    let app_path = if cli.temporary {
        let parent = match verify_parent_identity() {
            Ok(parent) => parent,
            Err(e) => {
                report_identity_mismatch(&e);
                return Err(e.into());
            }
        };
        _scratch = std::env::current_exe().ok().map(ScratchCopy::new);
        parent
    } else {
        std::env::current_exe().context("Failed to locate the running executable")?
    };

    let settings = resolve_settings(&platform, &app_path, &cli).await?;

    if cli.install {
        return install(&settings).await;
    }
    if cli.uninstall {
        return uninstall(&settings).await;
    }
    if cli.postpone {
        PostponeState::for_instance(&settings).set_postpone_data()?;
        return Ok(());
    }

    let mut instance = UpdaterInstance::new(settings, platform.clone())
        .with_terminate_process(cli.terminate_process_before_update);

    if !cli.temporary && instance.merged_config().run_as_temporary_copy {
        relaunch_as_temporary_copy(&platform, &Cli::forwarded_arguments())?;
        return Ok(());
    }

    match update_cycle(&cli, &mut instance).await {
        Ok(outcome) => {
            debug!("Update cycle finished: {:?}", outcome);
            Ok(())
        }
        Err(e) => {
            if !cli.is_unattended() {
                if let Some(url) = instance.error_url() {
                    open_url(url);
                }
            }
            Err(e)
        }
    }
}

/// Build the instance settings for `app_path`.
///
/// The running version is read from the executable's version resource and falls
/// back to the version this binary was built as.
async fn resolve_settings(
    platform: &Platform,
    app_path: &Path,
    cli: &Cli,
) -> Result<InstanceSettings> {
    let app_version = platform
        .versions
        .read_version(app_path, VersionResource::FileVersion)
        .or_else(|_| semver::Version::parse(env!("CARGO_PKG_VERSION")))
        .context("Failed to determine the updater version")?;

    let local = LocalConfigFile::load_or_default(app_path).await;
    let settings = InstanceSettings::resolve(app_path, app_version, local, cli.overrides())?;
    info!("Updater {} for {}", settings.app_version, settings.identity.tenant_sub_path(None));
    Ok(settings)
}

async fn install(settings: &InstanceSettings) -> Result<()> {
    register_autostart(settings)?;
    create_scheduled_task(settings).await?;
    Ok(())
}

async fn uninstall(settings: &InstanceSettings) -> Result<()> {
    let autostart = remove_autostart(settings);
    let task = remove_scheduled_task(settings).await;
    autostart?;
    task?;
    Ok(())
}

/// Steps 3 to 9 of the update cycle.
///
/// # Errors
///
/// Returns an error when the fetch, detection, download or installer failed.
pub async fn update_cycle(cli: &Cli, instance: &mut UpdaterInstance) -> Result<CycleOutcome> {
    instance.request_update_info().await.context("Failed to fetch update information")?;

    if let Some(url) = instance.emergency_url() {
        warn!("Server requested emergency handling, opening {}", url);
        open_url(url);
        return Ok(CycleOutcome::Emergency);
    }
    if instance.updates_disabled() {
        info!("Updates are disabled for this product");
        return Ok(CycleOutcome::Disabled);
    }

    if cli.skip_self_update || cli.temporary {
        debug!("Self-update skipped");
    } else {
        let options = HandoffOptions {
            silent: cli.is_unattended(),
            log_level: cli.log_level.clone(),
        };
        if instance.run_self_updater(&options) {
            info!("A newer updater takes over");
            return Ok(CycleOutcome::SelfUpdating);
        }
    }

    if cli.is_unattended() && PostponeState::for_instance(instance.settings()).is_in_postpone_period()
    {
        info!("Update postponed by the user, skipping");
        return Ok(CycleOutcome::Postponed);
    }

    match instance.is_installed_version_outdated() {
        Ok(true) => {}
        Ok(false) => {
            info!("Installed version is up to date");
            return Ok(CycleOutcome::UpToDate);
        }
        Err(UpdaterError::NoReleases) => {
            info!("No releases available");
            return Ok(CycleOutcome::UpToDate);
        }
        Err(e) => return Err(e).context("Failed to detect the installed version"),
    }

    download_selected(cli, instance).await?;
    install_selected(instance).await?;
    Ok(CycleOutcome::Installed)
}

async fn download_selected(cli: &Cli, instance: &mut UpdaterInstance) -> Result<()> {
    let index = instance.selected_release_index();
    let label = instance
        .selected_release()
        .map(|r| format!("{} {}", instance.merged_config().product_name, r.version))
        .unwrap_or_default();
    info!("Downloading {}", label);

    let progress = DownloadProgress::new(&label, cli.is_unattended());
    let bar = progress.clone();
    let callback: ProgressCallback = Arc::new(move |downloaded, total| bar.update(downloaded, total));

    if !instance.start_download(index, Some(callback)) {
        bail!("Failed to start the download of {label}");
    }
    let status = instance.wait_for_download().await.context("Download task was lost")?;

    if !status.has_succeeded {
        progress.finish_and_clear();
        match status.status_code {
            Some(code) if code != 200 => bail!("Download of {label} failed with HTTP status {code}"),
            _ => bail!(
                "Download of {label} failed: {}",
                status.error.unwrap_or_else(|| "unknown error".to_string())
            ),
        }
    }

    progress.finish_with_message("done");
    Ok(())
}

async fn install_selected(instance: &mut UpdaterInstance) -> Result<()> {
    if !instance.start_setup() {
        bail!("Failed to start the installer");
    }
    let status = instance.wait_for_setup().await.context("Setup task was lost")?;

    if status.has_succeeded {
        info!("Update installed (exit code {:?})", status.exit_code);
        return Ok(());
    }
    if status.win32_error != 0 {
        bail!(
            "Failed to launch the installer (OS error {}): {}",
            status.win32_error,
            status.error.unwrap_or_default()
        );
    }
    match status.exit_code {
        Some(code) => bail!("Installer failed with exit code {code}"),
        None => bail!("Installer failed: {}", status.error.unwrap_or_default()),
    }
}

/// Surface a failed parent identity check, regardless of silent mode.
fn report_identity_mismatch(error: &UpdaterError) {
    eprintln!("{error}");
    #[cfg(windows)]
    crate::platform::windows::show_error_dialog("Updater", &error.to_string());
}

fn open_url(url: &str) {
    if let Err(e) = open::that(url) {
        warn!("Failed to open {}: {}", url, e);
    }
}
