//! Effective configuration after merging all sources.

use crate::constants::{DEFAULT_PRODUCT_NAME, DEFAULT_WINDOW_TITLE};
use crate::models::detection::DetectionMethod;
use crate::models::shared::{DownloadLocationConfig, SharedConfig};
use serde::Serialize;

/// Conflict-resolved configuration consumed by the engine and the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedConfig {
    /// Window title
    pub window_title: String,
    /// Product name
    pub product_name: String,
    /// Active detection method, if any source configured one
    pub detection: Option<DetectionMethod>,
    /// Page opened when the setup fails
    pub installation_error_url: Option<String>,
    /// Preferred download directory
    pub download_location: Option<DownloadLocationConfig>,
    /// Relaunch from a scratch copy
    pub run_as_temporary_copy: bool,
}

impl Default for MergedConfig {
    fn default() -> Self {
        Self {
            window_title: DEFAULT_WINDOW_TITLE.to_string(),
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            detection: None,
            installation_error_url: None,
            download_location: None,
            run_as_temporary_copy: false,
        }
    }
}

impl MergedConfig {
    /// Override every field the shared block sets, leave the others untouched.
    pub fn apply(&mut self, shared: &SharedConfig) {
        if let Some(title) = &shared.window_title {
            self.window_title.clone_from(title);
        }
        if let Some(name) = &shared.product_name {
            self.product_name.clone_from(name);
        }
        if let Some(detection) = &shared.detection {
            self.detection = Some(detection.clone());
        }
        if let Some(url) = &shared.installation_error_url {
            self.installation_error_url = Some(url.clone());
        }
        if let Some(location) = &shared.download_location {
            self.download_location = Some(location.clone());
        }
        if let Some(temporary) = shared.run_as_temporary_copy {
            self.run_as_temporary_copy = temporary;
        }
    }
}
