//! Test utilities for the updater
//!
//! This module provides fakes for the operating system capabilities in
//! [`crate::platform`] plus builders for common fixtures, so that detection, setup
//! and the instance lifecycle can be tested on any host.
//!
//! # Example
//!
//! ```rust,no_run
//! use setup_updater::models::{RegistryHive, RegistryView};
//! use setup_updater::platform::RegistryReader;
//! use setup_updater::test_utils::FakeRegistry;
//!
//! let registry = FakeRegistry::default().with_value(
//!     RegistryHive::LocalMachine,
//!     "SOFTWARE\\Contoso\\Widget",
//!     "Version",
//!     "1.2.0",
//! );
//! let version = registry
//!     .read_string(RegistryHive::LocalMachine, RegistryView::Default, "SOFTWARE\\Contoso\\Widget", "Version")
//!     .unwrap();
//! assert_eq!(version, "1.2.0");
//! ```

use crate::core::UpdaterError;
use crate::models::{RegistryHive, RegistryView, UpdateRelease, VersionResource};
use crate::platform::{
    LaunchRequest, Platform, ProcessLauncher, RegistryReader, VersionResourceReader,
};
use semver::Version;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. `RUST_LOG` is respected when no level is
/// given; without either, logging stays off.
///
/// # Arguments
///
/// * `level` - Optional log level to use. If None, uses `RUST_LOG` environment variable
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// In-memory registry. Views are ignored, every view sees the same values.
#[derive(Debug, Default, Clone)]
pub struct FakeRegistry {
    values: HashMap<(RegistryHive, String, String), String>,
}

impl FakeRegistry {
    /// Add a string value. Key and value names are matched case-insensitively.
    #[must_use]
    pub fn with_value(
        mut self,
        hive: RegistryHive,
        key: &str,
        value: &str,
        data: impl Into<String>,
    ) -> Self {
        self.values.insert((hive, key.to_ascii_lowercase(), value.to_ascii_lowercase()), data.into());
        self
    }
}

impl RegistryReader for FakeRegistry {
    fn read_string(
        &self,
        hive: RegistryHive,
        _view: RegistryView,
        key: &str,
        value: &str,
    ) -> Result<String, UpdaterError> {
        self.values
            .get(&(hive, key.to_ascii_lowercase(), value.to_ascii_lowercase()))
            .cloned()
            .ok_or_else(|| UpdaterError::RegistryAccess {
                key: format!("{}\\{}\\{}", hive.as_str(), key, value),
                reason: "value not found".to_string(),
            })
    }
}

/// Version resources keyed by file path.
#[derive(Debug, Default, Clone)]
pub struct FakeVersionResources {
    versions: HashMap<(PathBuf, VersionResource), Version>,
}

impl FakeVersionResources {
    /// Register the version reported for `path`.
    #[must_use]
    pub fn with_version(mut self, path: impl Into<PathBuf>, which: VersionResource, version: Version) -> Self {
        self.versions.insert((path.into(), which), version);
        self
    }
}

impl VersionResourceReader for FakeVersionResources {
    fn read_version(&self, path: &Path, which: VersionResource) -> Result<Version, UpdaterError> {
        self.versions.get(&(path.to_path_buf(), which)).cloned().ok_or_else(|| {
            UpdaterError::VersionParse {
                input: path.display().to_string(),
            }
        })
    }
}

/// Scripted outcome of a [`FakeLauncher`] launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The program runs and exits with this code
    Exit(i32),
    /// The launch itself fails with this OS error code
    Fail(u32),
}

/// Launcher that records requests instead of starting processes.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    outcome: LaunchOutcome,
    requests: Arc<Mutex<Vec<LaunchRequest>>>,
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self::exiting_with(0)
    }
}

impl FakeLauncher {
    /// Every launch succeeds and exits with `code`.
    #[must_use]
    pub fn exiting_with(code: i32) -> Self {
        Self {
            outcome: LaunchOutcome::Exit(code),
            requests: Arc::default(),
        }
    }

    /// Every launch fails with `win32_error`.
    #[must_use]
    pub fn failing_with(win32_error: u32) -> Self {
        Self {
            outcome: LaunchOutcome::Fail(win32_error),
            requests: Arc::default(),
        }
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<LaunchRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn record(&self, request: &LaunchRequest) -> Result<i32, UpdaterError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        match self.outcome {
            LaunchOutcome::Exit(code) => Ok(code),
            LaunchOutcome::Fail(win32_error) => Err(UpdaterError::Launch {
                path: request.program.display().to_string(),
                win32_error,
            }),
        }
    }
}

impl ProcessLauncher for FakeLauncher {
    fn spawn_detached(&self, request: &LaunchRequest) -> Result<(), UpdaterError> {
        self.record(request).map(|_| ())
    }

    fn run_to_completion(&self, request: &LaunchRequest) -> Result<i32, UpdaterError> {
        self.record(request)
    }
}

/// Platform bundle made of fakes.
#[must_use]
pub fn fake_platform(
    registry: FakeRegistry,
    versions: FakeVersionResources,
    launcher: FakeLauncher,
) -> Platform {
    Platform {
        registry: Arc::new(registry),
        versions: Arc::new(versions),
        launcher: Arc::new(launcher),
    }
}

/// Release with the given version and download URL, everything else default.
#[must_use]
pub fn release(version: &str, download_url: &str) -> UpdateRelease {
    UpdateRelease {
        name: format!("Release {version}"),
        version: version.to_string(),
        download_url: download_url.to_string(),
        ..Default::default()
    }
}
