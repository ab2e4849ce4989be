//! The self-update hand-off process.
//!
//! Runs from a scratch copy of the updater, started by
//! [`SelfUpdater::run`](super::SelfUpdater::run) as
//! `self-update --pid <pid> --url <url> --path <path>`:
//!
//! 1. If the process `pid` is alive it must be running `path`, otherwise nothing
//!    is touched
//! 2. Wait for `pid` to exit (20 checks, 250 ms apart)
//! 3. Move `path` aside to `path.backup`
//! 4. Download the new updater to `path`
//! 5. Restore the backup on failure, delete it on success

use super::backup::BackupManager;
use super::process;
use crate::constants::{
    CONNECT_TIMEOUT, MAX_REDIRECTS, PARENT_EXIT_POLL_ATTEMPTS, PARENT_EXIT_POLL_INTERVAL_MS,
};
use crate::core::UpdaterError;
use anyhow::{Context, Result, bail};
use futures::StreamExt;
use reqwest::{Client, StatusCode, redirect};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

/// Parameters of a hand-off run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRequest {
    /// Process id of the updater being replaced
    pub pid: u32,
    /// Download URL of the new updater
    pub url: String,
    /// Path of the updater being replaced
    pub target: PathBuf,
}

/// Whether two paths name the same file, comparing canonical forms when possible.
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Refuse to act when `pid` is alive but runs a different executable.
///
/// # Errors
///
/// [`UpdaterError::SignatureMismatch`] when the executable differs or cannot be
/// determined.
pub fn verify_target_process(pid: u32, target: &Path) -> Result<(), UpdaterError> {
    if !process::is_alive(pid) {
        debug!("Process {} already exited", pid);
        return Ok(());
    }

    match process::executable_of(pid) {
        Some(exe) if same_file(&exe, target) => Ok(()),
        Some(exe) => Err(UpdaterError::SignatureMismatch {
            parent: exe.display().to_string(),
            current: target.display().to_string(),
        }),
        None => Err(UpdaterError::SignatureMismatch {
            parent: format!("<process {pid}>"),
            current: target.display().to_string(),
        }),
    }
}

/// Wait until `pid` has exited.
///
/// # Errors
///
/// Returns an error if the process is still alive after the last check.
pub async fn wait_for_exit(pid: u32) -> Result<()> {
    let strategy = FixedInterval::from_millis(PARENT_EXIT_POLL_INTERVAL_MS)
        .take(PARENT_EXIT_POLL_ATTEMPTS);

    Retry::spawn(strategy, || async {
        if process::is_alive(pid) { Err(()) } else { Ok(()) }
    })
    .await
    .map_err(|()| anyhow::anyhow!("Process {pid} did not exit in time"))
}

/// Download `url` to `destination`.
async fn download_to(client: &Client, url: &str, destination: &Path) -> Result<()> {
    let response = client.get(url).send().await.with_context(|| format!("Failed to request {url}"))?;
    if response.status() != StatusCode::OK {
        bail!("Download of {url} failed with status {}", response.status());
    }

    let mut file = tokio::fs::File::create(destination)
        .await
        .with_context(|| format!("Failed to create {}", destination.display()))?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Failed to read download stream")?;
        file.write_all(&chunk).await.context("Failed to write new updater")?;
    }
    file.flush().await.context("Failed to flush new updater")?;

    Ok(())
}

/// Execute a hand-off.
///
/// # Errors
///
/// Returns an error when the target process could not be verified, did not exit,
/// or the replacement failed. A failed replacement restores the original file
/// first.
pub async fn run_handoff(request: &HandoffRequest) -> Result<()> {
    info!("Replacing {} with {}", request.target.display(), request.url);

    verify_target_process(request.pid, &request.target)?;
    wait_for_exit(request.pid).await?;

    let backup = BackupManager::new(request.target.clone());
    backup.move_aside().await?;

    let client = Client::builder()
        .user_agent(format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(redirect::Policy::limited(MAX_REDIRECTS))
        .build()
        .context("Failed to create HTTP client")?;

    match download_to(&client, &request.url, &request.target).await {
        Ok(()) => {
            #[cfg(unix)]
            {
                if let Err(e) = backup.carry_over_permissions().await {
                    warn!("{:#}", e);
                }
            }
            backup.cleanup_backup().await;
            info!("Updater replaced successfully");
            Ok(())
        }
        Err(e) => {
            warn!("Replacement failed: {:#}", e);
            backup.restore_backup().await.context("Failed to restore the original updater")?;
            Err(e)
        }
    }
}
