//! The update engine instance.
//!
//! One [`UpdaterInstance`] exists per process invocation. It owns the resolved
//! [`InstanceSettings`], the effective [`MergedConfig`], the release list returned by
//! the server and at most one background download and one background setup task.
//!
//! # Lifecycle
//!
//! 1. [`UpdaterInstance::new`] merges compiled defaults with the local `shared` block
//! 2. [`UpdaterInstance::request_update_info`] fetches, filters and sorts releases and
//!    merges the server `shared` block
//! 3. [`UpdaterInstance::is_installed_version_outdated`] runs the detection method
//! 4. [`UpdaterInstance::start_download`] and [`UpdaterInstance::start_setup`] run the
//!    installer pipeline, polled through their status accessors
//!
//! Dropping the instance deletes every downloaded file still tracked, scheduling the
//! deletion for the next reboot when a file is locked.

mod download;
mod fetch;
mod setup;
pub mod task;

pub use download::{DownloadStatus, ProgressCallback};
pub use setup::{SetupStatus, extract_zip_payload};
pub use task::{TaskHandle, TaskState};

use crate::config::{InstanceSettings, apply_version_overrides, merge};
use crate::core::UpdaterError;
use crate::detection::DetectionEvaluator;
use crate::models::{MergedConfig, UpdateConfig, UpdateRelease};
use crate::platform::Platform;
use crate::templating::TemplateRenderer;
use crate::utils::remove_file_or_schedule;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Files written by download tasks, keyed by task id. Each task only touches its
/// own entry.
pub(crate) type TempFileRegistry = Arc<Mutex<HashMap<u64, PathBuf>>>;

/// Update engine state for one process invocation.
pub struct UpdaterInstance {
    pub(crate) settings: InstanceSettings,
    pub(crate) platform: Platform,
    pub(crate) renderer: TemplateRenderer,
    pub(crate) merged: MergedConfig,
    pub(crate) instance_config: Option<UpdateConfig>,
    pub(crate) remote_json: Value,
    pub(crate) releases: Vec<UpdateRelease>,
    pub(crate) selected_release: usize,
    pub(crate) download: Option<download::DownloadTask>,
    pub(crate) setup: Option<TaskHandle<setup::SetupOutcome>>,
    pub(crate) temp_files: TempFileRegistry,
    pub(crate) next_download_id: u64,
    pub(crate) terminate_pid: Option<u32>,
}

impl std::fmt::Debug for UpdaterInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdaterInstance")
            .field("settings", &self.settings)
            .field("merged", &self.merged)
            .field("releases", &self.releases.len())
            .field("selected_release", &self.selected_release)
            .finish_non_exhaustive()
    }
}

impl UpdaterInstance {
    /// Create an instance from resolved settings.
    ///
    /// The merged configuration starts from compiled defaults and the local
    /// `shared` block, with command line version overrides applied.
    #[must_use]
    pub fn new(settings: InstanceSettings, platform: Platform) -> Self {
        let renderer = TemplateRenderer::new(&platform);
        let mut instance = Self {
            settings,
            platform,
            renderer,
            merged: MergedConfig::default(),
            instance_config: None,
            remote_json: Value::Null,
            releases: Vec::new(),
            selected_release: 0,
            download: None,
            setup: None,
            temp_files: Arc::default(),
            next_download_id: 0,
            terminate_pid: None,
        };
        instance.remerge(None);
        instance
    }

    /// Terminate the process with `pid` right before the setup is launched.
    #[must_use]
    pub const fn with_terminate_process(mut self, pid: Option<u32>) -> Self {
        self.terminate_pid = pid;
        self
    }

    /// Rebuild the merged configuration from defaults, local and server blocks.
    pub(crate) fn remerge(&mut self, remote: Option<&crate::models::SharedConfig>) {
        let mut merged = merge(
            MergedConfig::default(),
            self.settings.local_shared.as_ref(),
            remote,
            self.settings.authority,
        );
        apply_version_overrides(
            &mut merged,
            self.settings.overrides.force_local_version.as_deref(),
            self.settings.overrides.local_version.as_deref(),
        );
        self.merged = merged;
    }

    /// Resolved instance settings.
    #[must_use]
    pub const fn settings(&self) -> &InstanceSettings {
        &self.settings
    }

    /// Effective configuration.
    #[must_use]
    pub const fn merged_config(&self) -> &MergedConfig {
        &self.merged
    }

    /// Instance-wide block of the last server response.
    #[must_use]
    pub const fn instance_config(&self) -> Option<&UpdateConfig> {
        self.instance_config.as_ref()
    }

    /// Raw JSON of the last server response, `null` before the first fetch.
    #[must_use]
    pub const fn remote_json(&self) -> &Value {
        &self.remote_json
    }

    /// Enabled releases, newest first.
    #[must_use]
    pub fn releases(&self) -> &[UpdateRelease] {
        &self.releases
    }

    /// The release the pipeline operates on.
    #[must_use]
    pub fn selected_release(&self) -> Option<&UpdateRelease> {
        self.releases.get(self.selected_release)
    }

    /// Index of the selected release.
    #[must_use]
    pub const fn selected_release_index(&self) -> usize {
        self.selected_release
    }

    /// Select another release. Returns `false` for an out of range index.
    pub fn set_selected_release(&mut self, index: usize) -> bool {
        if index < self.releases.len() {
            self.selected_release = index;
            true
        } else {
            false
        }
    }

    /// Whether the server asked clients to stop updating.
    #[must_use]
    pub fn updates_disabled(&self) -> bool {
        self.instance_config.as_ref().is_some_and(UpdateConfig::is_updates_disabled)
    }

    /// URL to open instead of running the update pipeline.
    #[must_use]
    pub fn emergency_url(&self) -> Option<&str> {
        self.instance_config.as_ref().and_then(|c| c.emergency_url.as_deref())
    }

    /// Help page for the UI.
    #[must_use]
    pub fn help_url(&self) -> Option<&str> {
        self.instance_config.as_ref().and_then(|c| c.help_url.as_deref())
    }

    /// Page to open when the update failed.
    ///
    /// The shared `installationErrorUrl` wins over the instance `errorFallbackUrl`.
    #[must_use]
    pub fn error_url(&self) -> Option<&str> {
        self.merged.installation_error_url.as_deref().or_else(|| {
            self.instance_config.as_ref().and_then(|c| c.error_fallback_url.as_deref())
        })
    }

    /// Run the configured detection method against the selected release.
    ///
    /// # Returns
    ///
    /// `true` when the installed product is older than the selected release.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::NoReleases`] when no release is available,
    /// [`UpdaterError::InvalidDetectionMethod`] when no method is configured, and
    /// every error of [`DetectionEvaluator::evaluate`].
    pub fn is_installed_version_outdated(&self) -> Result<bool, UpdaterError> {
        let release = self.selected_release().ok_or(UpdaterError::NoReleases)?;
        let method =
            self.merged.detection.as_ref().ok_or_else(|| UpdaterError::InvalidDetectionMethod {
                reason: "no detection method configured".to_string(),
            })?;

        DetectionEvaluator::new(self.renderer.clone(), self.platform.clone())
            .with_expression_context(serde_json::to_value(&self.merged)?, self.remote_json.clone())
            .evaluate(method, release)
    }

    /// Path of the downloaded file of a release, if any.
    #[must_use]
    pub fn downloaded_file(&self, index: usize) -> Option<PathBuf> {
        self.releases.get(index).and_then(|r| r.local_temp_file_path.clone())
    }

    /// Replace the release list.
    ///
    /// A downloaded file stays attached to the same release (same version and
    /// download URL) in the new list. Files of releases that are gone remain
    /// tracked and are deleted on drop.
    pub(crate) fn replace_releases(&mut self, mut releases: Vec<UpdateRelease>) {
        for release in &mut releases {
            release.local_temp_file_path = self
                .releases
                .iter()
                .find(|old| old.is_same_release(release))
                .and_then(|old| old.local_temp_file_path.clone());
        }
        self.releases = releases;
        self.selected_release = 0;
    }

    /// Register a file written outside of a download task for teardown.
    #[cfg(test)]
    pub(crate) fn attach_download(&mut self, index: usize, path: PathBuf) {
        let id = self.next_download_id;
        self.next_download_id += 1;
        if let Ok(mut files) = self.temp_files.lock() {
            files.insert(id, path.clone());
        }
        if let Some(release) = self.releases.get_mut(index) {
            release.local_temp_file_path = Some(path);
        }
    }
}

impl Drop for UpdaterInstance {
    fn drop(&mut self) {
        let files: Vec<PathBuf> = match self.temp_files.lock() {
            Ok(mut files) => files.drain().map(|(_, path)| path).collect(),
            Err(_) => return,
        };

        for path in files {
            debug!("Cleaning up {}", path.display());
            remove_file_or_schedule(&path);
        }
    }
}
