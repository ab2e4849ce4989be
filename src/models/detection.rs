//! Detection method model.
//!
//! On the wire a detection method is two sibling properties of the shared
//! configuration: `detectionMethod`, naming the strategy, and `detection`, holding a
//! strategy-specific payload. This module turns the pair into the [`DetectionMethod`]
//! sum type and rejects payloads that do not fit the declared strategy.
//!
//! ```json
//! {
//!   "detectionMethod": "RegistryValue",
//!   "detection": { "hive": "HKLM", "key": "SOFTWARE\\Contoso\\Widget", "value": "Version" }
//! }
//! ```

use crate::core::UpdaterError;
use crate::models::common::{RegistryHive, RegistryView, VersionResource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Discriminator of the available detection strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionMethodKind {
    /// Read a version string from the registry
    RegistryValue,
    /// Read a version resource from a file
    FileVersion,
    /// Compare the size of a file
    FileSize,
    /// Compare the digest of a file
    FileChecksum,
    /// Evaluate a template that renders `true` or `false`
    CustomExpression,
    /// Use a version string given in the configuration
    FixedVersion,
}

impl DetectionMethodKind {
    /// Type name some servers emit in a `$type` discriminator of the payload.
    #[must_use]
    pub const fn payload_type_name(self) -> &'static str {
        match self {
            Self::RegistryValue => "RegistryValueConfig",
            Self::FileVersion => "FileVersionConfig",
            Self::FileSize => "FileSizeConfig",
            Self::FileChecksum => "FileChecksumConfig",
            Self::CustomExpression => "CustomExpressionConfig",
            Self::FixedVersion => "FixedVersionConfig",
        }
    }

    fn from_payload_type_name(name: &str) -> Option<Self> {
        [
            Self::RegistryValue,
            Self::FileVersion,
            Self::FileSize,
            Self::FileChecksum,
            Self::CustomExpression,
            Self::FixedVersion,
        ]
        .into_iter()
        .find(|kind| kind.payload_type_name() == name)
    }
}

impl fmt::Display for DetectionMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RegistryValue => "RegistryValue",
            Self::FileVersion => "FileVersion",
            Self::FileSize => "FileSize",
            Self::FileChecksum => "FileChecksum",
            Self::CustomExpression => "CustomExpression",
            Self::FixedVersion => "FixedVersion",
        };
        f.write_str(name)
    }
}

/// Registry probe parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryValueConfig {
    /// Root key
    pub hive: RegistryHive,
    /// Registry view, native by default
    #[serde(default)]
    pub view: RegistryView,
    /// Sub key path below the hive
    pub key: String,
    /// Name of the value holding the version string
    pub value: String,
}

/// File version resource parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileVersionConfig {
    /// Path template of the file to inspect
    pub input: String,
    /// Which version field to read
    #[serde(default)]
    pub statement: VersionResource,
    /// Template data used when rendering `input`
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

/// Parameters shared by the file size, file checksum and custom expression methods.
///
/// For file based methods `input` is a path template, for custom expressions it
/// is the expression template itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatedInputConfig {
    /// Template to render
    pub input: String,
    /// Template data
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

/// Fixed local version parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedVersionConfig {
    /// Version string reported as installed
    pub version: String,
}

/// A detection strategy together with its parameters.
///
/// Exactly one method is active per configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "parameters")]
pub enum DetectionMethod {
    /// See [`RegistryValueConfig`]
    RegistryValue(RegistryValueConfig),
    /// See [`FileVersionConfig`]
    FileVersion(FileVersionConfig),
    /// Compared to the release's `detectionSize`
    FileSize(TemplatedInputConfig),
    /// Compared to the release's `detectionChecksum`
    FileChecksum(TemplatedInputConfig),
    /// Rendered output is the outdated flag itself
    CustomExpression(TemplatedInputConfig),
    /// See [`FixedVersionConfig`]
    FixedVersion(FixedVersionConfig),
}

impl DetectionMethod {
    /// The strategy discriminator of this method.
    #[must_use]
    pub const fn kind(&self) -> DetectionMethodKind {
        match self {
            Self::RegistryValue(_) => DetectionMethodKind::RegistryValue,
            Self::FileVersion(_) => DetectionMethodKind::FileVersion,
            Self::FileSize(_) => DetectionMethodKind::FileSize,
            Self::FileChecksum(_) => DetectionMethodKind::FileChecksum,
            Self::CustomExpression(_) => DetectionMethodKind::CustomExpression,
            Self::FixedVersion(_) => DetectionMethodKind::FixedVersion,
        }
    }

    /// Shortcut for a [`DetectionMethod::FixedVersion`] method.
    pub fn fixed_version(version: impl Into<String>) -> Self {
        Self::FixedVersion(FixedVersionConfig {
            version: version.into(),
        })
    }

    /// Build a detection method from the wire representation.
    ///
    /// # Arguments
    ///
    /// * `kind` - The declared `detectionMethod`, if any
    /// * `payload` - The `detection` payload, if any
    ///
    /// # Returns
    ///
    /// `Ok(None)` when neither part is present, `Ok(Some(method))` when both fit
    /// together.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::InvalidDetectionMethod`] when only one part is present, the
    /// payload is not an object, names a different strategy in its `$type`
    /// discriminator, or lacks a field the strategy requires.
    pub fn from_parts(
        kind: Option<DetectionMethodKind>,
        payload: Option<Value>,
    ) -> Result<Option<Self>, UpdaterError> {
        let payload = match payload {
            None | Some(Value::Null) => None,
            Some(value) => Some(value),
        };

        let (kind, payload) = match (kind, payload) {
            (None, None) => return Ok(None),
            (Some(kind), None) => {
                return Err(UpdaterError::InvalidDetectionMethod {
                    reason: format!("detection method {kind} has no 'detection' payload"),
                });
            }
            (kind, Some(payload)) => {
                let Value::Object(map) = payload else {
                    return Err(UpdaterError::InvalidDetectionMethod {
                        reason: "'detection' payload must be an object".to_string(),
                    });
                };
                let declared = map
                    .get("$type")
                    .and_then(Value::as_str)
                    .map(|name| {
                        DetectionMethodKind::from_payload_type_name(name).ok_or_else(|| {
                            UpdaterError::InvalidDetectionMethod {
                                reason: format!("unknown detection payload type '{name}'"),
                            }
                        })
                    })
                    .transpose()?;

                let kind = match (kind, declared) {
                    (Some(kind), Some(declared)) if kind != declared => {
                        return Err(UpdaterError::InvalidDetectionMethod {
                            reason: format!(
                                "detection method {kind} does not match payload of type {declared}"
                            ),
                        });
                    }
                    (Some(kind), _) => kind,
                    (None, Some(declared)) => declared,
                    (None, None) => {
                        return Err(UpdaterError::InvalidDetectionMethod {
                            reason: "'detection' payload given without 'detectionMethod'"
                                .to_string(),
                        });
                    }
                };

                (kind, Value::Object(map))
            }
        };

        let invalid = |e: serde_json::Error| UpdaterError::InvalidDetectionMethod {
            reason: format!("payload does not fit detection method {kind}: {e}"),
        };

        let method = match kind {
            DetectionMethodKind::RegistryValue => {
                Self::RegistryValue(serde_json::from_value(payload).map_err(invalid)?)
            }
            DetectionMethodKind::FileVersion => {
                Self::FileVersion(serde_json::from_value(payload).map_err(invalid)?)
            }
            DetectionMethodKind::FileSize => {
                Self::FileSize(serde_json::from_value(payload).map_err(invalid)?)
            }
            DetectionMethodKind::FileChecksum => {
                Self::FileChecksum(serde_json::from_value(payload).map_err(invalid)?)
            }
            DetectionMethodKind::CustomExpression => {
                Self::CustomExpression(serde_json::from_value(payload).map_err(invalid)?)
            }
            DetectionMethodKind::FixedVersion => {
                Self::FixedVersion(serde_json::from_value(payload).map_err(invalid)?)
            }
        };

        Ok(Some(method))
    }
}
