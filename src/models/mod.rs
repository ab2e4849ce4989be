//! Data models exchanged with the update server and the local configuration file
//!
//! All wire types use camelCase JSON property names.
//!
//! - [`release`] - [`UpdateRelease`] and [`ExitCodePolicy`]
//! - [`response`] - [`UpdateResponse`] and the instance-wide [`UpdateConfig`]
//! - [`shared`] - [`SharedConfig`], valid both locally and remotely
//! - [`detection`] - the [`DetectionMethod`] sum type
//! - [`merged`] - the effective [`MergedConfig`]
//! - [`common`] - enums and small value types

pub mod common;
pub mod detection;
pub mod merged;
pub mod release;
pub mod response;
pub mod shared;

pub use common::{
    ChecksumAlgorithm, ChecksumParameters, RegistryHive, RegistryView, VersionResource,
    ZipExtractFileDisposition,
};
pub use detection::{
    DetectionMethod, DetectionMethodKind, FileVersionConfig, FixedVersionConfig,
    RegistryValueConfig, TemplatedInputConfig,
};
pub use merged::MergedConfig;
pub use release::{ExitCodePolicy, UpdateRelease};
pub use response::{UpdateConfig, UpdateResponse};
pub use shared::{DownloadLocationConfig, SharedConfig};
