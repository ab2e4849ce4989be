//! Background setup execution.
//!
//! The downloaded payload of the selected release is installed on the blocking
//! pool. Executables are launched directly with the release's launch arguments,
//! ZIP archives are extracted over the application directory and anything else
//! (MSI packages and the like) is handed to the shell.

use super::UpdaterInstance;
use super::task::{TaskHandle, TaskState};
use crate::core::UpdaterError;
use crate::models::{ExitCodePolicy, UpdateRelease, ZipExtractFileDisposition};
use crate::platform::{LaunchMode, LaunchRequest, ProcessLauncher, is_windows_executable};
use crate::utils::{ensure_dir, is_strictly_inside};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Snapshot of the setup task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupStatus {
    /// The installer is still running
    pub is_running: bool,
    /// The task has produced its result
    pub has_finished: bool,
    /// The installation counts as successful under the exit code policy
    pub has_succeeded: bool,
    /// Exit code of the installer, `None` if it never ran
    pub exit_code: Option<i32>,
    /// OS error code of a failed launch, `0` otherwise
    pub win32_error: u32,
    /// Failure description
    pub error: Option<String>,
}

/// Result produced by the setup task.
#[derive(Debug)]
pub(crate) struct SetupOutcome {
    succeeded: bool,
    exit_code: Option<i32>,
    error: Option<UpdaterError>,
}

impl SetupOutcome {
    fn to_status(&self) -> SetupStatus {
        SetupStatus {
            is_running: false,
            has_finished: true,
            has_succeeded: self.succeeded,
            exit_code: self.exit_code,
            win32_error: self.error.as_ref().map_or(0, UpdaterError::win32_error),
            error: self.error.as_ref().map(ToString::to_string),
        }
    }
}

struct SetupJob {
    payload: PathBuf,
    release: UpdateRelease,
    policy: ExitCodePolicy,
    app_dir: PathBuf,
    launcher: Arc<dyn ProcessLauncher>,
    terminate_pid: Option<u32>,
}

impl UpdaterInstance {
    /// Start installing the downloaded payload of the selected release.
    ///
    /// # Returns
    ///
    /// `false` when a setup task is already tracked, the selected release has not
    /// been downloaded or no tokio runtime is available.
    pub fn start_setup(&mut self) -> bool {
        if self.setup.is_some() {
            debug!("A setup is already running");
            return false;
        }

        let Some(release) = self.selected_release().cloned() else {
            warn!("Cannot start setup: no release selected");
            return false;
        };
        let Some(payload) = self.downloaded_file(self.selected_release) else {
            warn!("Cannot start setup: release {} has not been downloaded", release.version);
            return false;
        };

        let policy = ExitCodePolicy::resolve(
            release.exit_code_policy.as_ref(),
            self.instance_config.as_ref().and_then(|c| c.exit_code_policy.as_ref()),
        );

        let job = SetupJob {
            payload,
            release,
            policy,
            app_dir: self.settings.app_dir(),
            launcher: Arc::clone(&self.platform.launcher),
            terminate_pid: self.terminate_pid,
        };

        match TaskHandle::spawn_blocking(move || job.run()) {
            Some(handle) => {
                self.setup = Some(handle);
                true
            }
            None => {
                warn!("Cannot start setup outside of a tokio runtime");
                false
            }
        }
    }

    /// Poll the setup task, `None` when no setup was started since the last reset.
    pub fn setup_status(&mut self) -> Option<SetupStatus> {
        let handle = self.setup.as_mut()?;
        Some(match handle.poll() {
            TaskState::Running => SetupStatus {
                is_running: true,
                ..Default::default()
            },
            TaskState::Finished(outcome) => outcome.to_status(),
            TaskState::Lost => SetupStatus {
                has_finished: true,
                error: Some("setup task ended without a result".to_string()),
                ..Default::default()
            },
        })
    }

    /// Wait for the setup task and return its final status.
    pub async fn wait_for_setup(&mut self) -> Option<SetupStatus> {
        self.setup.as_mut()?.wait().await;
        self.setup_status()
    }

    /// Forget the setup task. A running installer keeps going unobserved.
    pub fn reset_setup_state(&mut self) {
        self.setup = None;
    }
}

impl SetupJob {
    fn run(self) -> SetupOutcome {
        if let Some(pid) = self.terminate_pid {
            terminate_process(pid);
        }

        if is_windows_executable(&self.payload) {
            let request = LaunchRequest::new(&self.payload)
                .with_arguments(self.release.launch_arguments.clone().filter(|a| !a.is_empty()));
            return self.launch(&request);
        }

        if is_zip_archive(&self.payload) {
            info!("Installing archive {} into {}", self.payload.display(), self.app_dir.display());
            return match extract_zip_payload(&self.payload, &self.app_dir, &self.release) {
                Ok(()) => SetupOutcome {
                    succeeded: true,
                    exit_code: Some(0),
                    error: None,
                },
                Err(e) => {
                    error!("Archive installation failed: {}", e);
                    SetupOutcome {
                        succeeded: false,
                        exit_code: None,
                        error: Some(e),
                    }
                }
            };
        }

        let request = LaunchRequest::new(&self.payload)
            .with_arguments(self.release.launch_arguments.clone().filter(|a| !a.is_empty()))
            .with_mode(LaunchMode::Shell);
        self.launch(&request)
    }

    fn launch(&self, request: &LaunchRequest) -> SetupOutcome {
        info!("Launching setup {} {}", request.program.display(), request.command_line());

        match self.launcher.run_to_completion(request) {
            Ok(code) => {
                let succeeded = self.policy.is_success(code);
                if succeeded {
                    info!("Setup finished with exit code {}", code);
                } else {
                    warn!("Setup failed with exit code {}", code);
                }
                SetupOutcome {
                    succeeded,
                    exit_code: Some(code),
                    error: None,
                }
            }
            Err(e) => {
                error!("{}", e);
                SetupOutcome {
                    succeeded: false,
                    exit_code: None,
                    error: Some(e),
                }
            }
        }
    }
}

fn terminate_process(pid: u32) {
    use sysinfo::{Pid, ProcessesToUpdate, System};

    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    match system.process(pid) {
        Some(process) => {
            info!("Terminating process {} before update", pid);
            if process.kill() {
                process.wait();
            } else {
                warn!("Failed to terminate process {}", pid);
            }
        }
        None => debug!("Process {} is not running", pid),
    }
}

fn is_zip_archive(path: &Path) -> bool {
    let mut magic = [0_u8; 4];
    fs::File::open(path).and_then(|mut f| f.read_exact(&mut magic)).is_ok()
        && magic == *b"PK\x03\x04"
}

/// Install a ZIP payload over `app_dir`.
///
/// The archive is first extracted next to itself so that a broken archive never
/// leaves a half-updated installation behind. Files are then copied according to
/// their disposition, and finally every override marked
/// [`ZipExtractFileDisposition::DeleteIfPresent`] is removed from `app_dir`.
/// Deletions that would leave `app_dir`, or remove `app_dir` itself, are refused.
///
/// # Errors
///
/// [`UpdaterError::Other`] if the archive cannot be read, [`UpdaterError::Io`] if
/// copying fails.
pub fn extract_zip_payload(
    archive_path: &Path,
    app_dir: &Path,
    release: &UpdateRelease,
) -> Result<(), UpdaterError> {
    let staging_parent = archive_path.parent().unwrap_or(app_dir);
    let staging = tempfile::Builder::new().prefix("extracted").tempdir_in(staging_parent)?;

    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| UpdaterError::Other {
        message: format!("failed to open archive {}: {e}", archive_path.display()),
    })?;
    archive.extract(staging.path()).map_err(|e| UpdaterError::Other {
        message: format!("failed to extract archive {}: {e}", archive_path.display()),
    })?;

    // Walk 1: create and replace
    for entry in WalkDir::new(staging.path()).min_depth(1) {
        let entry = entry.map_err(|e| UpdaterError::Other {
            message: format!("failed to walk extracted archive: {e}"),
        })?;
        let Ok(relative) = entry.path().strip_prefix(staging.path()) else {
            continue;
        };
        let target = app_dir.join(relative);

        if entry.file_type().is_dir() {
            ensure_dir(&target).map_err(|e| UpdaterError::Other {
                message: format!("{e:#}"),
            })?;
            continue;
        }

        let relative_name = relative.to_string_lossy().replace('\\', "/");
        match release.zip_disposition_for(&relative_name) {
            ZipExtractFileDisposition::DeleteIfPresent => {}
            ZipExtractFileDisposition::CreateIfAbsent if target.exists() => {
                debug!("Keeping existing {}", target.display());
            }
            ZipExtractFileDisposition::CreateIfAbsent
            | ZipExtractFileDisposition::CreateOrReplace => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(entry.path(), &target)?;
                debug!("Installed {}", target.display());
            }
        }
    }

    // Walk 2: deletions
    let deletions = release
        .zip_extract_file_disposition_overrides
        .iter()
        .flatten()
        .filter(|(_, disposition)| **disposition == ZipExtractFileDisposition::DeleteIfPresent);

    for (relative, _) in deletions {
        let target = app_dir.join(relative.replace('\\', "/"));
        if !target.exists() {
            continue;
        }
        if !is_strictly_inside(app_dir, &target) {
            warn!("Refusing to delete {}: not inside the installation directory", target.display());
            continue;
        }

        let removed =
            if target.is_dir() { fs::remove_dir_all(&target) } else { fs::remove_file(&target) };
        match removed {
            Ok(()) => debug!("Deleted {}", target.display()),
            Err(e) => warn!("Failed to delete {}: {}", target.display(), e),
        }
    }

    Ok(())
}
