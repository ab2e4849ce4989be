//! Installed product detection.
//!
//! A [`DetectionMethod`] describes how to find out which version of the product is
//! installed locally. [`DetectionEvaluator`] runs a method against the selected
//! release and answers a single question: is the installed product outdated?
//!
//! | Method             | Local value                          | Outdated when                         |
//! |--------------------|--------------------------------------|---------------------------------------|
//! | `FixedVersion`     | configured version string            | release detection version is greater  |
//! | `RegistryValue`    | registry string value                | release detection version is greater  |
//! | `FileVersion`      | file or product version resource     | release detection version is greater  |
//! | `FileSize`         | file size in bytes                   | size differs from `detectionSize`     |
//! | `FileChecksum`     | MD5/SHA1/SHA256 digest of the file   | digest differs from `detectionChecksum` |
//! | `CustomExpression` | rendered template                    | template renders `true`               |
//!
//! The release detection version is `detectionVersion` when the release sets one,
//! otherwise the release version.

use crate::core::UpdaterError;
use crate::models::{
    DetectionMethod, FileVersionConfig, RegistryValueConfig, TemplatedInputConfig, UpdateRelease,
};
use crate::platform::Platform;
use crate::templating::TemplateRenderer;
use crate::utils::ChecksumVerifier;
use crate::version::parse_version;
use semver::Version;
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Evaluates detection methods against releases.
#[derive(Debug, Clone)]
pub struct DetectionEvaluator {
    renderer: TemplateRenderer,
    platform: Platform,
    merged: Value,
    remote: Value,
}

impl DetectionEvaluator {
    /// Create an evaluator with empty expression context.
    #[must_use]
    pub fn new(renderer: TemplateRenderer, platform: Platform) -> Self {
        Self {
            renderer,
            platform,
            merged: Value::Null,
            remote: Value::Null,
        }
    }

    /// Data exposed to custom expressions as `merged` and `remote`.
    ///
    /// # Arguments
    ///
    /// * `merged` - The serialized merged configuration
    /// * `remote` - The raw server response
    #[must_use]
    pub fn with_expression_context(mut self, merged: Value, remote: Value) -> Self {
        self.merged = merged;
        self.remote = remote;
        self
    }

    /// Decide whether the installed product is older than `release`.
    ///
    /// # Errors
    ///
    /// - [`UpdaterError::VersionParse`] if a local or release version is unusable
    /// - [`UpdaterError::RegistryAccess`] if the registry value cannot be read
    /// - [`UpdaterError::FileNotFound`] if the rendered file path does not exist
    /// - [`UpdaterError::MissingDetectionData`] if the release lacks the size or checksum
    /// - [`UpdaterError::InvalidDetectionMethod`] if a custom expression renders
    ///   something other than `true` or `false`
    /// - [`UpdaterError::Template`] if a template fails to render
    pub fn evaluate(
        &self,
        method: &DetectionMethod,
        release: &UpdateRelease,
    ) -> Result<bool, UpdaterError> {
        debug!("Evaluating {} detection against release {}", method.kind(), release.version);

        let result = match method {
            DetectionMethod::FixedVersion(cfg) => {
                self.compare_versions(&parse_version(&cfg.version)?, release)
            }
            DetectionMethod::RegistryValue(cfg) => self.registry_value(cfg, release),
            DetectionMethod::FileVersion(cfg) => self.file_version(cfg, release),
            DetectionMethod::FileSize(cfg) => self.file_size(cfg, release),
            DetectionMethod::FileChecksum(cfg) => self.file_checksum(cfg, release),
            DetectionMethod::CustomExpression(cfg) => self.custom_expression(cfg),
        };

        match &result {
            Ok(outdated) => info!("{} detection: outdated = {}", method.kind(), outdated),
            Err(e) => warn!("{} detection failed: {}", method.kind(), e),
        }

        result
    }

    fn compare_versions(&self, local: &Version, release: &UpdateRelease) -> Result<bool, UpdaterError> {
        let remote = release.detection_sem_version()?;
        debug!("Installed version {}, release detection version {}", local, remote);
        Ok(remote > *local)
    }

    fn registry_value(
        &self,
        cfg: &RegistryValueConfig,
        release: &UpdateRelease,
    ) -> Result<bool, UpdaterError> {
        let raw = self.platform.registry.read_string(cfg.hive, cfg.view, &cfg.key, &cfg.value)?;
        self.compare_versions(&parse_version(&raw)?, release)
    }

    fn file_version(
        &self,
        cfg: &FileVersionConfig,
        release: &UpdateRelease,
    ) -> Result<bool, UpdaterError> {
        let path = self.existing_file(&cfg.input, cfg.data.as_ref())?;
        let local = self.platform.versions.read_version(&path, cfg.statement)?;
        self.compare_versions(&local, release)
    }

    fn file_size(
        &self,
        cfg: &TemplatedInputConfig,
        release: &UpdateRelease,
    ) -> Result<bool, UpdaterError> {
        let path = self.existing_file(&cfg.input, cfg.data.as_ref())?;
        let expected = release.detection_size.ok_or_else(|| UpdaterError::MissingDetectionData {
            field: "detectionSize".to_string(),
        })?;

        let actual = std::fs::metadata(&path)?.len();
        debug!("{} is {} bytes, release expects {}", path.display(), actual, expected);
        Ok(actual != expected)
    }

    fn file_checksum(
        &self,
        cfg: &TemplatedInputConfig,
        release: &UpdateRelease,
    ) -> Result<bool, UpdaterError> {
        let path = self.existing_file(&cfg.input, cfg.data.as_ref())?;
        let expected =
            release.detection_checksum.as_ref().ok_or_else(|| UpdaterError::MissingDetectionData {
                field: "detectionChecksum".to_string(),
            })?;

        Ok(!ChecksumVerifier::matches(&path, expected)?)
    }

    fn custom_expression(&self, cfg: &TemplatedInputConfig) -> Result<bool, UpdaterError> {
        let parameters = cfg.data.clone().map_or_else(|| Value::Object(Map::new()), Value::Object);
        let context = json!({
            "merged": self.merged,
            "remote": self.remote,
            "parameters": parameters,
        });

        let output = self.renderer.render(&cfg.input, &context)?;
        match output.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(UpdaterError::InvalidDetectionMethod {
                reason: format!("custom expression must render 'true' or 'false', got '{other}'"),
            }),
        }
    }

    /// Render a path template and make sure the file exists.
    fn existing_file(
        &self,
        template: &str,
        data: Option<&Map<String, Value>>,
    ) -> Result<PathBuf, UpdaterError> {
        let rendered = self.renderer.render_with(template, data)?;
        let path = PathBuf::from(rendered.trim());
        if !path.is_file() {
            return Err(UpdaterError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ChecksumAlgorithm, ChecksumParameters, FixedVersionConfig, RegistryHive, RegistryView,
        VersionResource,
    };
    use crate::test_utils::{
        FakeLauncher, FakeRegistry, FakeVersionResources, fake_platform, release,
    };
    use tempfile::TempDir;

    fn evaluator(registry: FakeRegistry, versions: FakeVersionResources) -> DetectionEvaluator {
        let platform = fake_platform(registry, versions, FakeLauncher::default());
        DetectionEvaluator::new(TemplateRenderer::new(&platform), platform)
    }

    fn plain() -> DetectionEvaluator {
        evaluator(FakeRegistry::default(), FakeVersionResources::default())
    }

    fn templated(input: &str) -> TemplatedInputConfig {
        TemplatedInputConfig {
            input: input.to_string(),
            data: None,
        }
    }

    #[test]
    fn test_fixed_version() {
        let evaluator = plain();
        let method = DetectionMethod::fixed_version("1.0.0");

        assert!(evaluator.evaluate(&method, &release("1.1.0", "u")).unwrap());
        assert!(!evaluator.evaluate(&method, &release("1.0.0", "u")).unwrap());
        assert!(!evaluator.evaluate(&method, &release("0.9.0", "u")).unwrap());
    }

    #[test]
    fn test_fixed_version_four_part() {
        let evaluator = plain();
        let method = DetectionMethod::fixed_version("1.0.0.1");
        // 1.0.0-rc.1 < 1.0.0
        assert!(evaluator.evaluate(&method, &release("1.0.0", "u")).unwrap());
        assert!(evaluator.evaluate(&method, &release("1.0.0.2", "u")).unwrap());
    }

    #[test]
    fn test_fixed_version_unparseable() {
        let method = DetectionMethod::FixedVersion(FixedVersionConfig {
            version: "latest".to_string(),
        });
        let err = plain().evaluate(&method, &release("1.0.0", "u")).unwrap_err();
        assert!(matches!(err, UpdaterError::VersionParse { .. }));
    }

    #[test]
    fn test_detection_version_overrides_release_version() {
        let mut rel = release("5.0.0", "u");
        rel.detection_version = Some("1.0.0".to_string());
        assert!(!plain().evaluate(&DetectionMethod::fixed_version("1.0.0"), &rel).unwrap());
    }

    #[test]
    fn test_registry_value() {
        let evaluator = evaluator(
            FakeRegistry::default().with_value(
                RegistryHive::LocalMachine,
                "SOFTWARE\\Contoso\\Widget",
                "Version",
                "1.2.0",
            ),
            FakeVersionResources::default(),
        );
        let method = DetectionMethod::RegistryValue(RegistryValueConfig {
            hive: RegistryHive::LocalMachine,
            view: RegistryView::Wow64_64,
            key: "SOFTWARE\\Contoso\\Widget".to_string(),
            value: "Version".to_string(),
        });

        assert!(evaluator.evaluate(&method, &release("1.3.0", "u")).unwrap());
        assert!(!evaluator.evaluate(&method, &release("1.2.0", "u")).unwrap());
    }

    #[test]
    fn test_registry_value_missing() {
        let method = DetectionMethod::RegistryValue(RegistryValueConfig {
            hive: RegistryHive::CurrentUser,
            view: RegistryView::Default,
            key: "SOFTWARE\\Missing".to_string(),
            value: "Version".to_string(),
        });
        let err = plain().evaluate(&method, &release("1.0.0", "u")).unwrap_err();
        assert!(matches!(err, UpdaterError::RegistryAccess { .. }));
    }

    #[test]
    fn test_file_version_renders_path() {
        let temp = TempDir::new().unwrap();
        let exe = temp.path().join("widget.exe");
        std::fs::write(&exe, b"MZ").unwrap();

        let evaluator = evaluator(
            FakeRegistry::default(),
            FakeVersionResources::default().with_version(
                &exe,
                VersionResource::FileVersion,
                Version::new(2, 0, 0),
            ),
        );
        let data = json!({"dir": temp.path().to_string_lossy()}).as_object().cloned();
        let method = DetectionMethod::FileVersion(FileVersionConfig {
            input: "{{ dir }}/widget.exe".to_string(),
            statement: VersionResource::FileVersion,
            data,
        });

        assert!(!evaluator.evaluate(&method, &release("2.0.0", "u")).unwrap());
        assert!(evaluator.evaluate(&method, &release("2.0.1", "u")).unwrap());
    }

    #[test]
    fn test_file_version_missing_file() {
        let method = DetectionMethod::FileVersion(FileVersionConfig {
            input: "/definitely/not/here/widget.exe".to_string(),
            statement: VersionResource::ProductVersion,
            data: None,
        });
        let err = plain().evaluate(&method, &release("1.0.0", "u")).unwrap_err();
        assert!(matches!(err, UpdaterError::FileNotFound { .. }));
    }

    #[test]
    fn test_file_size() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("widget.dll");
        std::fs::write(&file, vec![0_u8; 1234]).unwrap();
        let method = DetectionMethod::FileSize(templated(&file.to_string_lossy()));

        let mut rel = release("1.0.0", "u");
        rel.detection_size = Some(1234);
        assert!(!plain().evaluate(&method, &rel).unwrap());

        rel.detection_size = Some(1235);
        assert!(plain().evaluate(&method, &rel).unwrap());

        rel.detection_size = None;
        let err = plain().evaluate(&method, &rel).unwrap_err();
        assert!(matches!(err, UpdaterError::MissingDetectionData { ref field } if field == "detectionSize"));
    }

    #[test]
    fn test_file_size_ignores_version() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("widget.dll");
        std::fs::write(&file, b"abc").unwrap();
        let method = DetectionMethod::FileSize(templated(&file.to_string_lossy()));

        // Equal size with a much higher version is still up to date
        let mut rel = release("99.0.0", "u");
        rel.detection_size = Some(3);
        assert!(!plain().evaluate(&method, &rel).unwrap());
    }

    #[test]
    fn test_file_checksum() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("widget.dll");
        std::fs::write(&file, b"Hello, World!").unwrap();
        let method = DetectionMethod::FileChecksum(templated(&file.to_string_lossy()));

        let mut rel = release("1.0.0", "u");
        rel.detection_checksum = Some(ChecksumParameters {
            checksum: "0A0A9F2A6772942557AB5355D76AF442F8F65E01".to_string(),
            algorithm: ChecksumAlgorithm::Sha1,
        });
        assert!(!plain().evaluate(&method, &rel).unwrap());

        // Flip one nibble
        rel.detection_checksum = Some(ChecksumParameters {
            checksum: "1a0a9f2a6772942557ab5355d76af442f8f65e01".to_string(),
            algorithm: ChecksumAlgorithm::Sha1,
        });
        assert!(plain().evaluate(&method, &rel).unwrap());

        rel.detection_checksum = None;
        let err = plain().evaluate(&method, &rel).unwrap_err();
        assert!(matches!(err, UpdaterError::MissingDetectionData { .. }));
    }

    #[test]
    fn test_file_checksum_sha256() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("widget.dll");
        std::fs::write(&file, b"Hello, World!").unwrap();
        let method = DetectionMethod::FileChecksum(templated(&file.to_string_lossy()));

        let mut rel = release("1.0.0", "u");
        rel.detection_checksum = Some(ChecksumParameters {
            checksum: "DFFD6021BB2BD5B0AF676290809EC3A53191DD81C7F70A4B28688A362182986F".to_string(),
            algorithm: ChecksumAlgorithm::Sha256,
        });
        assert!(!plain().evaluate(&method, &rel).unwrap());

        rel.detection_checksum = Some(ChecksumParameters {
            checksum: "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986e".to_string(),
            algorithm: ChecksumAlgorithm::Sha256,
        });
        assert!(plain().evaluate(&method, &rel).unwrap());
    }

    #[test]
    fn test_custom_expression() {
        let evaluator = plain().with_expression_context(
            json!({"productName": "Widget"}),
            json!({"instance": {"latestVersion": "2.0.0"}}),
        );
        let method = DetectionMethod::CustomExpression(TemplatedInputConfig {
            input: r#"
                {% if version_lt(a=parameters.installed, b=remote.instance.latestVersion) %}true{% else %}false{% endif %}
            "#
            .to_string(),
            data: json!({"installed": "1.0.0"}).as_object().cloned(),
        });
        assert!(evaluator.evaluate(&method, &release("1.0.0", "u")).unwrap());

        let method = DetectionMethod::CustomExpression(templated(
            r#"{% if merged.productName == "Widget" %}false{% else %}true{% endif %}"#,
        ));
        assert!(!evaluator.evaluate(&method, &release("1.0.0", "u")).unwrap());
    }

    #[test]
    fn test_custom_expression_rejects_other_output() {
        let method = DetectionMethod::CustomExpression(templated("yes"));
        let err = plain().evaluate(&method, &release("1.0.0", "u")).unwrap_err();
        assert!(matches!(err, UpdaterError::InvalidDetectionMethod { .. }));

        let method = DetectionMethod::CustomExpression(templated("True"));
        assert!(plain().evaluate(&method, &release("1.0.0", "u")).is_err());
    }
}
