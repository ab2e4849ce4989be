//! Self-update functionality for the updater.
//!
//! # Architecture Overview
//!
//! - **[`SelfUpdater`]**: compares the running version with the updater advertised
//!   by the server and starts the hand-off process
//! - **[`handoff`]**: the hidden `self-update` command that replaces the original
//!   binary once the caller has exited
//! - **[`backup::BackupManager`]**: moves the original aside and restores it when
//!   the replacement fails
//! - **[`temporary`]**: relaunching from a scratch copy and verifying the parent
//!
//! ## Update Process Flow
//!
//! ```text
//! 1. Version Check
//!    └── instance.latestVersion > running version and instance.latestUrl set
//!
//! 2. Hand-off Launch
//!    ├── Copy the running binary to a unique scratch file
//!    ├── Start it with `self-update --pid --url --path`
//!    └── Request elevation when the application directory is read-only
//!
//! 3. Replacement (in the hand-off process)
//!    ├── Verify the pid runs the target file
//!    ├── Wait for the pid to exit
//!    ├── Move the original aside
//!    ├── Download the new binary
//!    └── Restore on failure, delete the backup on success
//! ```
//!
//! Self-update failures never stop the regular update: the caller logs them and
//! carries on with the running updater.

pub mod backup;
pub mod handoff;
pub mod process;
pub mod self_updater;
pub mod temporary;

pub use handoff::{HandoffRequest, run_handoff};
pub use self_updater::{HandoffOptions, SelfUpdateState, SelfUpdater};
pub use temporary::{ScratchCopy, relaunch_as_temporary_copy, verify_parent_identity};

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Copy the running executable to a uniquely named file in the temp directory.
pub(crate) fn scratch_copy_of_current_exe() -> Result<PathBuf> {
    let current = std::env::current_exe().context("Failed to locate the running executable")?;
    let stem = current.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let suffix = current
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let (_, scratch) = tempfile::Builder::new()
        .prefix(&format!("{stem}-"))
        .suffix(&suffix)
        .tempfile()
        .context("Failed to create scratch file")?
        .keep()
        .context("Failed to keep scratch file")?;

    std::fs::copy(&current, &scratch).with_context(|| {
        format!("Failed to copy {} to {}", current.display(), scratch.display())
    })?;

    Ok(scratch)
}
