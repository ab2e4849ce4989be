//! Backup of the updater binary during a self-update hand-off.
//!
//! A running Windows executable cannot be overwritten but it can be renamed, so
//! the backup moves the original aside instead of copying it. The new binary is
//! then written to the original path, and the backup is either deleted (success)
//! or moved back (failure).

use crate::utils::remove_file_or_schedule;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Number of restore attempts before giving up.
const MAX_RESTORE_ATTEMPTS: u32 = 3;

/// Manages the `.backup` sibling of an executable.
///
/// # Examples
///
/// ```rust,no_run
/// use setup_updater::upgrade::backup::BackupManager;
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// let backup = BackupManager::new(PathBuf::from("C:\\Contoso\\Contoso_Widget_Updater.exe"));
/// backup.move_aside().await?;
/// // ... write the new binary ...
/// backup.cleanup_backup().await;
/// # Ok(())
/// # }
/// ```
pub struct BackupManager {
    original_path: PathBuf,
    backup_path: PathBuf,
}

impl BackupManager {
    /// Backup manager for `executable_path`, backing up to `<name>.backup`.
    pub fn new(executable_path: PathBuf) -> Self {
        let mut backup_path = executable_path.clone();
        backup_path.set_file_name(format!(
            "{}.backup",
            executable_path.file_name().unwrap_or_default().to_string_lossy()
        ));

        Self {
            original_path: executable_path,
            backup_path,
        }
    }

    /// Rename the original to the backup path, replacing an older backup.
    ///
    /// # Errors
    ///
    /// Returns an error if the original does not exist or cannot be renamed.
    pub async fn move_aside(&self) -> Result<()> {
        if !self.original_path.exists() {
            bail!("Original file does not exist: {}", self.original_path.display());
        }

        if self.backup_path.exists() {
            debug!("Removing old backup at {}", self.backup_path.display());
            fs::remove_file(&self.backup_path).await.context("Failed to remove old backup")?;
        }

        info!("Moving {} aside to {}", self.original_path.display(), self.backup_path.display());
        fs::rename(&self.original_path, &self.backup_path)
            .await
            .context("Failed to move original binary aside")?;

        Ok(())
    }

    /// Copy the backup's permissions to the original path.
    ///
    /// # Errors
    ///
    /// Returns an error if either file's metadata cannot be accessed.
    #[cfg(unix)]
    pub async fn carry_over_permissions(&self) -> Result<()> {
        let metadata =
            fs::metadata(&self.backup_path).await.context("Failed to read backup metadata")?;
        fs::set_permissions(&self.original_path, metadata.permissions())
            .await
            .context("Failed to set permissions")?;
        Ok(())
    }

    /// Move the backup back to the original path.
    ///
    /// Retries a few times since a freshly written file may still be locked by a
    /// scanner on Windows.
    ///
    /// # Errors
    ///
    /// Returns an error if no backup exists or every attempt failed.
    pub async fn restore_backup(&self) -> Result<()> {
        if !self.backup_path.exists() {
            bail!("No backup found at {}", self.backup_path.display());
        }

        warn!("Restoring from backup at {}", self.backup_path.display());

        let mut attempts = 0;
        loop {
            match self.attempt_restore().await {
                Ok(()) => {
                    info!("Successfully restored from backup");
                    return Ok(());
                }
                Err(e) if attempts < MAX_RESTORE_ATTEMPTS - 1 => {
                    warn!("Restore attempt {} failed: {}. Retrying...", attempts + 1, e);
                    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt_restore(&self) -> Result<()> {
        if self.original_path.exists() {
            fs::remove_file(&self.original_path)
                .await
                .context("Failed to remove incomplete binary")?;
        }

        fs::rename(&self.backup_path, &self.original_path)
            .await
            .context("Failed to restore backup")?;

        Ok(())
    }

    /// Delete the backup, deferring to the next reboot when it is locked.
    pub async fn cleanup_backup(&self) {
        if self.backup_path.exists() {
            debug!("Cleaning up backup at {}", self.backup_path.display());
            let path = self.backup_path.clone();
            let _ = tokio::task::spawn_blocking(move || remove_file_or_schedule(&path)).await;
        }
    }

    /// Whether a backup file exists.
    pub fn backup_exists(&self) -> bool {
        self.backup_path.exists()
    }

    /// Path of the backup file.
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }
}
