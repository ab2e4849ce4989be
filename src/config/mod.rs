//! Local configuration and instance settings.
//!
//! The updater reads an optional JSON file named after its own executable
//! (`Contoso_Widget_Updater.json` next to `Contoso_Widget_Updater.exe`). The file
//! can redirect the updater to another server, change how the product identity is
//! derived from the file name, pick a channel and provide a local `shared` block.
//!
//! # File Format
//!
//! ```json
//! {
//!   "instance": {
//!     "serverUrlTemplate": "https://updates.example.com/api/{}/updates.json",
//!     "filenameRegex": "^(\\w+)_(\\w+)_Updater.*?",
//!     "authority": "Remote",
//!     "channel": "beta"
//!   },
//!   "shared": {
//!     "productName": "Widget",
//!     "detectionMethod": "FixedVersion",
//!     "detection": { "version": "1.0.0" }
//!   }
//! }
//! ```
//!
//! [`InstanceSettings::resolve`] combines compiled defaults, this file and the
//! command line overrides into the settings used to talk to the server. The
//! [`merge`] module builds the effective [`MergedConfig`](crate::models::MergedConfig).

pub mod merge;

pub use merge::{apply_version_overrides, merge};

use crate::constants::{DEFAULT_FILENAME_REGEX, DEFAULT_SERVER_URL_TEMPLATE};
use crate::core::UpdaterError;
use crate::models::SharedConfig;
use anyhow::{Context, Result};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which side wins when local and server configuration disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Authority {
    /// Local file and defaults win
    Local,
    /// Server `shared` block wins
    #[default]
    Remote,
}

/// `instance` section of the local configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalInstanceSection {
    /// Server URL template, `{}` is replaced with the tenant sub-path
    #[serde(default)]
    pub server_url_template: Option<String>,
    /// Regex applied to the executable stem to find manufacturer and product
    #[serde(default)]
    pub filename_regex: Option<String>,
    /// Conflict resolution between local and server settings
    #[serde(default)]
    pub authority: Option<Authority>,
    /// Release channel
    #[serde(default)]
    pub channel: Option<String>,
}

/// Contents of the local configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalConfigFile {
    /// Instance section
    #[serde(default)]
    pub instance: Option<LocalInstanceSection>,
    /// Local shared block
    #[serde(default)]
    pub shared: Option<SharedConfig>,
}

impl LocalConfigFile {
    /// Path of the configuration file that belongs to `app_path`.
    #[must_use]
    pub fn path_for(app_path: &Path) -> PathBuf {
        app_path.with_extension("json")
    }

    /// Load the configuration file from a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON for this
    /// schema.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read local config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse local config from {}", path.display()))
    }

    /// Load the configuration file next to `app_path`, falling back to defaults.
    ///
    /// A missing file is normal. An unreadable or invalid file is logged and
    /// ignored so a broken deployment still reaches the server with defaults.
    pub async fn load_or_default(app_path: &Path) -> Self {
        let path = Self::path_for(app_path);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("No local config at {}", path.display());
            return Self::default();
        }

        match Self::load_from(&path).await {
            Ok(config) => {
                debug!("Loaded local config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring local config: {:#}", e);
                Self::default()
            }
        }
    }
}

/// Command line values that take precedence over every configuration source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    /// Release channel
    pub channel: Option<String>,
    /// Local version that replaces any detection method
    pub force_local_version: Option<String>,
    /// Local version used when no detection method is configured
    pub local_version: Option<String>,
    /// Extra request headers
    pub additional_headers: Vec<(String, String)>,
    /// Ignore a recorded postpone period
    pub ignore_postpone: bool,
}

/// Product identity derived from the executable file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductIdentity {
    /// Executable file stem
    pub app_stem: String,
    /// First regex capture group
    pub manufacturer: Option<String>,
    /// Second regex capture group
    pub product: Option<String>,
}

impl ProductIdentity {
    /// Match the executable stem against `filename_regex` (case-insensitive).
    ///
    /// # Errors
    ///
    /// [`UpdaterError::Config`] if the regex is invalid.
    pub fn from_stem(app_stem: &str, filename_regex: &str) -> Result<Self, UpdaterError> {
        let regex = RegexBuilder::new(filename_regex).case_insensitive(true).build().map_err(
            |e| UpdaterError::Config {
                message: format!("invalid filename regex '{filename_regex}': {e}"),
            },
        )?;

        let (manufacturer, product) = match regex.captures(app_stem) {
            Some(captures) if captures.len() >= 3 => (
                captures.get(1).map(|m| m.as_str().to_string()),
                captures.get(2).map(|m| m.as_str().to_string()),
            ),
            _ => (None, None),
        };

        Ok(Self {
            app_stem: app_stem.to_string(),
            manufacturer,
            product,
        })
    }

    /// Tenant path inserted into the server URL template.
    ///
    /// `manufacturer/product[/channel]` when the file name matched, otherwise the
    /// executable stem.
    #[must_use]
    pub fn tenant_sub_path(&self, channel: Option<&str>) -> String {
        let base = match (&self.manufacturer, &self.product) {
            (Some(manufacturer), Some(product)) => format!("{manufacturer}/{product}"),
            _ => self.app_stem.clone(),
        };

        match channel.filter(|c| !c.is_empty()) {
            Some(channel) => format!("{base}/{channel}"),
            None => base,
        }
    }

    /// Vendor directory component, falling back to the executable stem.
    #[must_use]
    pub fn vendor(&self) -> &str {
        self.manufacturer.as_deref().unwrap_or(&self.app_stem)
    }

    /// Product directory component, falling back to the executable stem.
    #[must_use]
    pub fn product_name(&self) -> &str {
        self.product.as_deref().unwrap_or(&self.app_stem)
    }
}

/// Settings used to identify the product and reach the server.
#[derive(Debug, Clone)]
pub struct InstanceSettings {
    /// Executable whose name and location define the instance
    pub app_path: PathBuf,
    /// Running updater version
    pub app_version: semver::Version,
    /// Product identity
    pub identity: ProductIdentity,
    /// Server URL template
    pub server_url_template: String,
    /// Conflict resolution
    pub authority: Authority,
    /// Effective channel after command line overrides
    pub channel: Option<String>,
    /// Local shared block
    pub local_shared: Option<SharedConfig>,
    /// Command line overrides
    pub overrides: CliOverrides,
}

impl InstanceSettings {
    /// Resolve settings from defaults, the local file and command line overrides.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::Config`] if the executable path has no file name or the
    /// filename regex is invalid.
    pub fn resolve(
        app_path: &Path,
        app_version: semver::Version,
        local: LocalConfigFile,
        overrides: CliOverrides,
    ) -> Result<Self, UpdaterError> {
        let app_stem = app_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| UpdaterError::Config {
                message: format!("'{}' has no usable file name", app_path.display()),
            })?
            .to_string();

        let section = local.instance.unwrap_or_default();
        let filename_regex = section.filename_regex.as_deref().unwrap_or(DEFAULT_FILENAME_REGEX);
        let identity = ProductIdentity::from_stem(&app_stem, filename_regex)?;

        let channel = overrides.channel.clone().or(section.channel);

        Ok(Self {
            app_path: app_path.to_path_buf(),
            app_version,
            identity,
            server_url_template: section
                .server_url_template
                .unwrap_or_else(|| DEFAULT_SERVER_URL_TEMPLATE.to_string()),
            authority: section.authority.unwrap_or_default(),
            channel,
            local_shared: local.shared,
            overrides,
        })
    }

    /// Directory containing the executable.
    #[must_use]
    pub fn app_dir(&self) -> PathBuf {
        self.app_path.parent().map(Path::to_path_buf).unwrap_or_default()
    }

    /// URL of the update info endpoint.
    #[must_use]
    pub fn request_url(&self) -> String {
        self.server_url_template
            .replace("{}", &self.identity.tenant_sub_path(self.channel.as_deref()))
    }
}
