//! Small value types shared by several models.

use serde::{Deserialize, Serialize};

/// Hash algorithm used for checksums published by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    /// MD5
    #[serde(rename = "MD5")]
    Md5,
    /// SHA-1
    #[serde(rename = "SHA1", alias = "SHA-1")]
    Sha1,
    /// SHA-256
    #[serde(rename = "SHA256", alias = "SHA-256")]
    Sha256,
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha1 => write!(f, "SHA1"),
            Self::Sha256 => write!(f, "SHA256"),
        }
    }
}

/// Expected digest of a file together with its algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecksumParameters {
    /// Hex encoded digest, compared case-insensitively
    pub checksum: String,
    /// Algorithm that produced the digest
    #[serde(rename = "checksumAlg")]
    pub algorithm: ChecksumAlgorithm,
}

/// Registry root key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistryHive {
    /// `HKEY_CURRENT_USER`
    #[serde(rename = "HKCU")]
    CurrentUser,
    /// `HKEY_LOCAL_MACHINE`
    #[serde(rename = "HKLM")]
    LocalMachine,
    /// `HKEY_CLASSES_ROOT`
    #[serde(rename = "HKCR")]
    ClassesRoot,
}

impl RegistryHive {
    /// Short name as used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CurrentUser => "HKCU",
            Self::LocalMachine => "HKLM",
            Self::ClassesRoot => "HKCR",
        }
    }

    /// Parse a short or long hive name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "HKCU" | "HKEY_CURRENT_USER" => Some(Self::CurrentUser),
            "HKLM" | "HKEY_LOCAL_MACHINE" => Some(Self::LocalMachine),
            "HKCR" | "HKEY_CLASSES_ROOT" => Some(Self::ClassesRoot),
            _ => None,
        }
    }
}

/// Registry view selected on 64-bit systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RegistryView {
    /// The view native to the running process
    #[default]
    Default,
    /// Force the 64-bit view
    #[serde(rename = "WOW64_64KEY")]
    Wow64_64,
    /// Force the 32-bit view
    #[serde(rename = "WOW64_32KEY")]
    Wow64_32,
}

/// Which fixed field of a Windows version resource to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VersionResource {
    /// `FILEVERSION`
    #[serde(rename = "FILEVERSION")]
    FileVersion,
    /// `PRODUCTVERSION`
    #[default]
    #[serde(rename = "PRODUCTVERSION")]
    ProductVersion,
}

/// How a single ZIP entry is applied to the installation directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ZipExtractFileDisposition {
    /// Only write the file if it does not exist yet
    CreateIfAbsent,
    /// Always write the file
    #[default]
    CreateOrReplace,
    /// Delete the file from the installation directory if it exists
    DeleteIfPresent,
}
