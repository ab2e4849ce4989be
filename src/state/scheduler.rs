//! Daily scheduled task through `schtasks.exe`.
//!
//! The task is named after the executable stem and runs the updater with
//! `--background` once a day. The start time is picked at random between 06:00
//! and 22:59 so that installations do not all hit the server at the same minute.

use crate::config::InstanceSettings;
use crate::constants::{BACKGROUND_SWITCH, SCHEDULED_TASK_MAX_HOUR, SCHEDULED_TASK_MIN_HOUR};
use crate::core::UpdaterError;
use rand::Rng;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, info};

const SCHTASKS: &str = "schtasks.exe";

/// Time of day of the daily trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerTime {
    /// Hour, 0-23
    pub hour: u32,
    /// Minute, 0-59
    pub minute: u32,
}

impl TriggerTime {
    /// Random time between 06:00 and 22:59.
    #[must_use]
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            hour: rng.gen_range(SCHEDULED_TASK_MIN_HOUR..=SCHEDULED_TASK_MAX_HOUR),
            minute: rng.gen_range(0..=59),
        }
    }
}

impl std::fmt::Display for TriggerTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Arguments of `schtasks.exe` creating or replacing the daily task.
#[must_use]
pub fn create_task_arguments(task_name: &str, app_path: &Path, at: TriggerTime) -> Vec<String> {
    vec![
        "/Create".to_string(),
        "/F".to_string(),
        "/SC".to_string(),
        "DAILY".to_string(),
        "/TN".to_string(),
        task_name.to_string(),
        "/TR".to_string(),
        format!("\"{}\" {}", app_path.display(), BACKGROUND_SWITCH),
        "/ST".to_string(),
        at.to_string(),
    ]
}

async fn schtasks(operation: &str, args: &[String]) -> Result<std::process::Output, UpdaterError> {
    if !cfg!(windows) {
        return Err(UpdaterError::Registration {
            operation: operation.to_string(),
            reason: "scheduled tasks are only supported on Windows".to_string(),
        });
    }

    debug!("Executing command: {} {}", SCHTASKS, args.join(" "));
    Command::new(SCHTASKS).args(args).output().await.map_err(|e| UpdaterError::Registration {
        operation: operation.to_string(),
        reason: e.to_string(),
    })
}

fn check_status(operation: &str, output: &std::process::Output) -> Result<(), UpdaterError> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let reason = if stderr.trim().is_empty() { stdout } else { stderr };
    Err(UpdaterError::Registration {
        operation: operation.to_string(),
        reason: format!("schtasks exited with {:?}: {}", output.status.code(), reason.trim()),
    })
}

/// Create or replace the daily task for this updater.
///
/// # Errors
///
/// [`UpdaterError::Registration`] if `schtasks.exe` is unavailable or fails.
pub async fn create_scheduled_task(settings: &InstanceSettings) -> Result<(), UpdaterError> {
    let operation = "create scheduled task";
    let at = TriggerTime::random();
    let args = create_task_arguments(&settings.identity.app_stem, &settings.app_path, at);

    let output = schtasks(operation, &args).await?;
    check_status(operation, &output)?;

    info!("Scheduled daily update check '{}' at {}", settings.identity.app_stem, at);
    Ok(())
}

/// Remove the daily task for this updater. A missing task is not an error.
///
/// # Errors
///
/// [`UpdaterError::Registration`] if `schtasks.exe` is unavailable or the
/// existing task cannot be deleted.
pub async fn remove_scheduled_task(settings: &InstanceSettings) -> Result<(), UpdaterError> {
    let operation = "remove scheduled task";
    let name = settings.identity.app_stem.clone();

    let query = vec!["/Query".to_string(), "/TN".to_string(), name.clone()];
    if !schtasks(operation, &query).await?.status.success() {
        debug!("No scheduled task named '{}'", name);
        return Ok(());
    }

    let delete = vec!["/Delete".to_string(), "/F".to_string(), "/TN".to_string(), name.clone()];
    let output = schtasks(operation, &delete).await?;
    check_status(operation, &output)?;

    info!("Removed scheduled task '{}'", name);
    Ok(())
}
