//! Running the updater from a temporary copy.
//!
//! Some products want the updater to run from a scratch location so that the
//! installer can replace every file in the application directory, including the
//! updater itself. The original process copies itself away, relaunches the copy
//! with `--temporary` and exits. The copy then verifies that its parent really is
//! an identical updater binary before it trusts the parent's location and
//! configuration.
//!
//! Scratch copies, including the one the self-update hand-off runs from, delete
//! themselves through [`ScratchCopy`] when the process is done.

use super::{process, scratch_copy_of_current_exe};
use crate::constants::TEMPORARY_SWITCH;
use crate::core::UpdaterError;
use crate::platform::{LaunchRequest, Platform, quote_argument};
use crate::utils::{ChecksumVerifier, remove_file_or_schedule};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Removes a scratch executable on drop.
///
/// A copy that is still locked by the running process is scheduled for deletion
/// on the next reboot.
#[derive(Debug)]
pub struct ScratchCopy(PathBuf);

impl ScratchCopy {
    /// Guard `path` unconditionally.
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self(path)
    }

    /// Guard `path` only when it lives directly in the temp directory, where
    /// scratch copies are created.
    #[must_use]
    pub fn if_scratch(path: PathBuf) -> Option<Self> {
        let temp_dir = std::env::temp_dir();
        let temp_dir = temp_dir.canonicalize().unwrap_or(temp_dir);
        let parent = path.parent().map(|p| p.canonicalize().unwrap_or_else(|_| p.to_path_buf()))?;
        (parent == temp_dir).then(|| Self(path))
    }

    /// Guard for the running executable when it is a scratch copy.
    #[must_use]
    pub fn current_if_scratch() -> Option<Self> {
        std::env::current_exe().ok().and_then(Self::if_scratch)
    }

    /// Guarded path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for ScratchCopy {
    fn drop(&mut self) {
        debug!("Removing scratch copy {}", self.0.display());
        remove_file_or_schedule(&self.0);
    }
}

/// Relaunch the running binary from a scratch copy with `--temporary` appended.
///
/// # Arguments
///
/// * `platform` - Launcher used to start the copy
/// * `arguments` - Arguments of the current invocation, without the program name
///
/// # Errors
///
/// Returns an error if the copy cannot be created or launched.
pub fn relaunch_as_temporary_copy(platform: &Platform, arguments: &[String]) -> Result<PathBuf> {
    let scratch = scratch_copy_of_current_exe()?;

    let mut forwarded: Vec<String> = arguments.iter().map(|a| quote_argument(a)).collect();
    forwarded.push(TEMPORARY_SWITCH.to_string());

    let current_dir = std::env::current_exe().ok().and_then(|p| p.parent().map(PathBuf::from));
    let mut request = LaunchRequest::new(&scratch).with_arguments(forwarded);
    request.working_dir = current_dir;

    platform
        .launcher
        .spawn_detached(&request)
        .with_context(|| format!("Failed to launch temporary copy {}", scratch.display()))?;

    info!("Relaunched as temporary copy {}", scratch.display());
    Ok(scratch)
}

/// Verify that the parent process runs a byte-identical copy of this binary.
///
/// # Returns
///
/// The parent's executable path, which stands in for the application path.
///
/// # Errors
///
/// [`UpdaterError::SignatureMismatch`] if the parent cannot be determined, cannot
/// be read, or differs. The failure is always logged at error level.
pub fn verify_parent_identity() -> Result<PathBuf, UpdaterError> {
    let current = std::env::current_exe()?;
    let parent = process::parent_pid().and_then(process::executable_of);

    let verified = parent
        .as_deref()
        .map(|parent| ChecksumVerifier::same_content(parent, &current).unwrap_or(false))
        .unwrap_or(false);

    match parent {
        Some(parent) if verified => {
            info!("Parent process {} verified", parent.display());
            Ok(parent)
        }
        parent => {
            let err = UpdaterError::SignatureMismatch {
                parent: parent.map_or_else(|| "<unknown>".to_string(), |p| p.display().to_string()),
                current: current.display().to_string(),
            };
            error!("{}", err);
            Err(err)
        }
    }
}
