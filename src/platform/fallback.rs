//! Portable capability implementations for non-Windows hosts.
//!
//! Registry and version resources do not exist outside Windows, their readers
//! always fail. Processes are started with `std::process` and documents are
//! handed to the desktop's default handler through `open`.

use super::{
    LaunchMode, LaunchRequest, ProcessLauncher, RegistryReader, VersionResourceReader,
    spawn_command, wait_for_child,
};
use crate::core::UpdaterError;
use crate::models::{RegistryHive, RegistryView, VersionResource};
use semver::Version;
use std::path::Path;
use tracing::debug;

pub struct UnsupportedRegistry;

impl RegistryReader for UnsupportedRegistry {
    fn read_string(
        &self,
        hive: RegistryHive,
        _view: RegistryView,
        key: &str,
        value: &str,
    ) -> Result<String, UpdaterError> {
        Err(UpdaterError::RegistryAccess {
            key: format!("{}\\{key}\\{value}", hive.as_str()),
            reason: "the registry is only available on Windows".to_string(),
        })
    }
}

pub struct UnsupportedVersionResources;

impl VersionResourceReader for UnsupportedVersionResources {
    fn read_version(&self, path: &Path, _which: VersionResource) -> Result<Version, UpdaterError> {
        Err(UpdaterError::VersionParse {
            input: format!("version resource of {} (only available on Windows)", path.display()),
        })
    }
}

pub struct PortableLauncher;

impl PortableLauncher {
    fn spawn(request: &LaunchRequest) -> Result<std::process::Child, UpdaterError> {
        match request.mode {
            LaunchMode::Direct => spawn_command(request),
            LaunchMode::Elevated => {
                debug!("No elevation verb on this platform, launching directly");
                spawn_command(request)
            }
            LaunchMode::Shell => {
                let mut last_error = None;
                for mut command in open::commands(&request.program) {
                    command.args(&request.arguments);
                    match command.spawn() {
                        Ok(child) => return Ok(child),
                        Err(e) => last_error = Some(e),
                    }
                }
                let error = last_error.unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no default handler found")
                });
                Err(UpdaterError::launch(request.program.display().to_string(), &error))
            }
        }
    }
}

impl ProcessLauncher for PortableLauncher {
    fn spawn_detached(&self, request: &LaunchRequest) -> Result<(), UpdaterError> {
        Self::spawn(request).map(|_| ())
    }

    fn run_to_completion(&self, request: &LaunchRequest) -> Result<i32, UpdaterError> {
        let child = Self::spawn(request)?;
        wait_for_child(request, child)
    }
}
