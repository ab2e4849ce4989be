//! Shared configuration block.
//!
//! The same structure appears in the local configuration file and in the server
//! response. Every field is optional: an absent field means "no opinion" and leaves
//! the value of a lower priority source untouched when merging.

use crate::core::UpdaterError;
use crate::models::detection::{DetectionMethod, DetectionMethodKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Templated download directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLocationConfig {
    /// Directory path template
    pub input: String,
    /// Template data
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

/// Wire shape of the shared block before the detection pair is validated.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSharedConfig {
    #[serde(default)]
    window_title: Option<String>,
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    detection_method: Option<DetectionMethodKind>,
    #[serde(default)]
    detection: Option<Value>,
    #[serde(default)]
    installation_error_url: Option<String>,
    #[serde(default)]
    download_location: Option<DownloadLocationConfig>,
    #[serde(default)]
    run_as_temporary_copy: Option<bool>,
}

/// Settings that may come from the local file or the server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "RawSharedConfig")]
pub struct SharedConfig {
    /// Window title shown by the UI
    pub window_title: Option<String>,
    /// Product name shown by the UI
    pub product_name: Option<String>,
    /// Validated detection method
    pub detection: Option<DetectionMethod>,
    /// Page opened when the setup fails
    pub installation_error_url: Option<String>,
    /// Preferred download directory
    pub download_location: Option<DownloadLocationConfig>,
    /// Relaunch from a scratch copy before doing anything else
    pub run_as_temporary_copy: Option<bool>,
}

impl TryFrom<RawSharedConfig> for SharedConfig {
    type Error = UpdaterError;

    fn try_from(raw: RawSharedConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            window_title: raw.window_title,
            product_name: raw.product_name,
            detection: DetectionMethod::from_parts(raw.detection_method, raw.detection)?,
            installation_error_url: raw.installation_error_url,
            download_location: raw.download_location,
            run_as_temporary_copy: raw.run_as_temporary_copy,
        })
    }
}
