//! Server response model.

use crate::models::release::{ExitCodePolicy, UpdateRelease};
use crate::models::shared::SharedConfig;
use serde::{Deserialize, Serialize};

/// Instance-wide settings governing the updater itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfig {
    /// Server asks clients to stop updating
    #[serde(default)]
    pub updates_disabled: Option<bool>,
    /// Newest available updater version
    #[serde(default)]
    pub latest_version: Option<String>,
    /// Download location of the newest updater binary
    #[serde(default)]
    pub latest_url: Option<String>,
    /// Page opened instead of updating when set
    #[serde(default)]
    pub emergency_url: Option<String>,
    /// Instance level exit code policy
    #[serde(default, rename = "exitCode")]
    pub exit_code_policy: Option<ExitCodePolicy>,
    /// Product help page
    #[serde(default)]
    pub help_url: Option<String>,
    /// Page opened when the update process fails
    #[serde(default)]
    pub error_fallback_url: Option<String>,
}

impl UpdateConfig {
    /// Whether the server disabled updates.
    #[must_use]
    pub fn is_updates_disabled(&self) -> bool {
        self.updates_disabled.unwrap_or(false)
    }
}

/// Parsed body of the update info endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResponse {
    /// Updater settings
    #[serde(default)]
    pub instance: Option<UpdateConfig>,
    /// Shared settings, merged according to the configured authority
    #[serde(default)]
    pub shared: Option<SharedConfig>,
    /// Releases in server order, see [`UpdateResponse::normalize_releases`]
    #[serde(default)]
    pub releases: Vec<UpdateRelease>,
}

impl UpdateResponse {
    /// Drop disabled releases and sort the rest newest first.
    ///
    /// The sort is stable, releases with equal versions keep their server order.
    pub fn normalize_releases(&mut self) {
        self.releases.retain(|release| !release.is_disabled());
        self.releases.sort_by_cached_key(|release| std::cmp::Reverse(release.sem_version()));
    }
}
