//! Release model and exit code policy.

use crate::constants::DEFAULT_SUCCESS_EXIT_CODE;
use crate::core::UpdaterError;
use crate::models::common::{ChecksumParameters, ZipExtractFileDisposition};
use crate::version::{parse_version, parse_version_lenient};
use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

fn default_success_codes() -> BTreeSet<i32> {
    BTreeSet::from([DEFAULT_SUCCESS_EXIT_CODE])
}

/// Rules for interpreting an installer's exit code.
///
/// An exit code is a success iff `skip_check` is set or the code is a member of
/// `success_codes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitCodePolicy {
    /// Treat every exit code as success
    #[serde(default)]
    pub skip_check: bool,
    /// Exit codes considered successful
    #[serde(default = "default_success_codes")]
    pub success_codes: BTreeSet<i32>,
}

impl Default for ExitCodePolicy {
    fn default() -> Self {
        Self {
            skip_check: false,
            success_codes: default_success_codes(),
        }
    }
}

impl ExitCodePolicy {
    /// Classify an installer exit code.
    #[must_use]
    pub fn is_success(&self, exit_code: i32) -> bool {
        self.skip_check || self.success_codes.contains(&exit_code)
    }

    /// Pick the effective policy: release level, else instance level, else default.
    #[must_use]
    pub fn resolve(release: Option<&Self>, instance: Option<&Self>) -> Self {
        release.or(instance).cloned().unwrap_or_default()
    }
}

/// One downloadable version of the product.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRelease {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Version, semantic or four-part
    pub version: String,
    /// Markdown release notes
    #[serde(default)]
    pub summary: String,
    /// Publication timestamp as sent by the server
    #[serde(default)]
    pub published_at: Option<String>,
    /// Setup download location
    pub download_url: String,
    /// Setup size in bytes
    #[serde(default)]
    pub download_size: Option<u64>,
    /// Arguments passed to the setup
    #[serde(default)]
    pub launch_arguments: Option<String>,
    /// Release specific exit code policy
    #[serde(default, rename = "exitCode")]
    pub exit_code_policy: Option<ExitCodePolicy>,
    /// Digest of the setup file
    #[serde(default)]
    pub checksum: Option<ChecksumParameters>,
    /// Hidden from clients when true
    #[serde(default)]
    pub disabled: Option<bool>,
    /// Digest the installed product file must have to be up to date
    #[serde(default)]
    pub detection_checksum: Option<ChecksumParameters>,
    /// Size the installed product file must have to be up to date
    #[serde(default)]
    pub detection_size: Option<u64>,
    /// Version compared by version based detection, defaults to `version`
    #[serde(default)]
    pub detection_version: Option<String>,
    /// Default disposition of ZIP entries
    #[serde(default)]
    pub zip_extract_default_file_disposition: Option<ZipExtractFileDisposition>,
    /// Per-path disposition of ZIP entries, keyed by relative path
    #[serde(default)]
    pub zip_extract_file_disposition_overrides: Option<HashMap<String, ZipExtractFileDisposition>>,
    /// Downloaded setup file, set once a download completed
    #[serde(skip)]
    pub local_temp_file_path: Option<PathBuf>,
}

impl UpdateRelease {
    /// Whether `other` describes the same payload: same version and download URL.
    #[must_use]
    pub fn is_same_release(&self, other: &Self) -> bool {
        self.version == other.version && self.download_url == other.download_url
    }

    /// Release version as semantic version, `0.0.0` if unparseable.
    #[must_use]
    pub fn sem_version(&self) -> Version {
        parse_version_lenient(&self.version)
    }

    /// Version compared against the installed product.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::VersionParse`] if an explicit `detectionVersion` is invalid.
    pub fn detection_sem_version(&self) -> Result<Version, UpdaterError> {
        match &self.detection_version {
            Some(version) => parse_version(version),
            None => Ok(self.sem_version()),
        }
    }

    /// Whether the server marked this release as disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }

    /// Publication timestamp, if present and valid RFC 3339.
    #[must_use]
    pub fn published_at_utc(&self) -> Option<DateTime<Utc>> {
        self.published_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Disposition for a ZIP entry at `relative_path`.
    #[must_use]
    pub fn zip_disposition_for(&self, relative_path: &str) -> ZipExtractFileDisposition {
        let normalized = relative_path.replace('\\', "/");
        self.zip_extract_file_disposition_overrides
            .as_ref()
            .and_then(|overrides| {
                overrides
                    .iter()
                    .find(|(path, _)| path.replace('\\', "/").eq_ignore_ascii_case(&normalized))
                    .map(|(_, disposition)| *disposition)
            })
            .or(self.zip_extract_default_file_disposition)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_policy_success_codes() {
        let policy = ExitCodePolicy {
            skip_check: false,
            success_codes: BTreeSet::from([0, 3010]),
        };
        assert!(policy.is_success(3010));
        assert!(policy.is_success(0));
        assert!(!policy.is_success(1));
    }

    #[test]
    fn test_exit_code_policy_skip_check() {
        let policy = ExitCodePolicy {
            skip_check: true,
            success_codes: BTreeSet::new(),
        };
        assert!(policy.is_success(1));
        assert!(policy.is_success(-1));
    }

    #[test]
    fn test_exit_code_policy_resolution_order() {
        let release = ExitCodePolicy {
            skip_check: true,
            ..Default::default()
        };
        let instance = ExitCodePolicy {
            skip_check: false,
            success_codes: BTreeSet::from([5]),
        };

        assert_eq!(ExitCodePolicy::resolve(Some(&release), Some(&instance)), release);
        assert_eq!(ExitCodePolicy::resolve(None, Some(&instance)), instance);
        assert_eq!(ExitCodePolicy::resolve(None, None), ExitCodePolicy::default());
        assert!(ExitCodePolicy::default().is_success(0));
    }

    #[test]
    fn test_policy_defaults_from_json() {
        let policy: ExitCodePolicy = serde_json::from_str(r#"{"skipCheck": false}"#).unwrap();
        assert_eq!(policy.success_codes, BTreeSet::from([0]));
    }

    #[test]
    fn test_release_deserialization() {
        let json = r#"{
            "name": "Widget 1.2",
            "version": "1.2.0.4",
            "summary": "Fixes",
            "publishedAt": "2024-03-01T10:00:00+01:00",
            "downloadUrl": "https://example.com/setup.exe",
            "exitCode": {"skipCheck": false, "successCodes": [0, 3010]},
            "detectionVersion": "1.2.0"
        }"#;
        let release: UpdateRelease = serde_json::from_str(json).unwrap();
        assert_eq!(release.sem_version(), Version::parse("1.2.0-rc.4").unwrap());
        assert_eq!(release.detection_sem_version().unwrap(), Version::new(1, 2, 0));
        assert!(!release.is_disabled());
        assert!(release.exit_code_policy.as_ref().unwrap().is_success(3010));
        assert!(release.published_at_utc().is_some());
        assert!(release.local_temp_file_path.is_none());
    }

    #[test]
    fn test_same_release_identity() {
        let a = UpdateRelease {
            version: "1.1.0".to_string(),
            download_url: "https://example.com/11.exe".to_string(),
            ..Default::default()
        };
        let mut b = a.clone();
        b.name = "Renamed".to_string();
        assert!(a.is_same_release(&b));

        b.download_url = "https://example.com/mirror.exe".to_string();
        assert!(!a.is_same_release(&b));
    }

    #[test]
    fn test_detection_version_falls_back_to_version() {
        let release = UpdateRelease {
            version: "2.1.0".to_string(),
            ..Default::default()
        };
        assert_eq!(release.detection_sem_version().unwrap(), Version::new(2, 1, 0));
    }

    #[test]
    fn test_invalid_detection_version_is_error() {
        let release = UpdateRelease {
            version: "2.1.0".to_string(),
            detection_version: Some("latest".to_string()),
            ..Default::default()
        };
        assert!(release.detection_sem_version().is_err());
    }

    #[test]
    fn test_zip_disposition_override() {
        let release = UpdateRelease {
            zip_extract_default_file_disposition: Some(ZipExtractFileDisposition::CreateIfAbsent),
            zip_extract_file_disposition_overrides: Some(HashMap::from([(
                "bin\\old.dll".to_string(),
                ZipExtractFileDisposition::DeleteIfPresent,
            )])),
            ..Default::default()
        };
        assert_eq!(
            release.zip_disposition_for("bin/old.dll"),
            ZipExtractFileDisposition::DeleteIfPresent
        );
        assert_eq!(
            release.zip_disposition_for("bin/new.dll"),
            ZipExtractFileDisposition::CreateIfAbsent
        );
        assert_eq!(
            UpdateRelease::default().zip_disposition_for("x"),
            ZipExtractFileDisposition::CreateOrReplace
        );
    }
}
