//! Shared helpers for the integration tests.

#![allow(dead_code)]

use anyhow::{Context, Result};
use serde_json::{Value, json};
use setup_updater::config::{
    CliOverrides, InstanceSettings, LocalConfigFile, LocalInstanceSection,
};
use setup_updater::instance::UpdaterInstance;
use setup_updater::models::SharedConfig;
use setup_updater::test_utils::{FakeLauncher, FakeRegistry, FakeVersionResources, fake_platform};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Executable stem that resolves to manufacturer `Contoso`, product `Widget`.
pub const APP_STEM: &str = "Contoso_Widget_Updater";

/// Server URL template pointing at a mock server.
pub fn url_template(server_uri: &str) -> String {
    format!("{server_uri}/api/{{}}/updates.json")
}

/// Path the mock server must serve for the default identity.
pub const UPDATES_PATH: &str = "/api/Contoso/Widget/updates.json";

/// Build an instance that talks to `server_uri` and uses fake platform capabilities.
pub fn instance_for(
    server_uri: &str,
    shared: Option<Value>,
    overrides: CliOverrides,
    launcher: FakeLauncher,
) -> UpdaterInstance {
    let shared: Option<SharedConfig> =
        shared.map(|value| serde_json::from_value(value).expect("valid shared block"));
    let local = LocalConfigFile {
        instance: Some(LocalInstanceSection {
            server_url_template: Some(url_template(server_uri)),
            ..Default::default()
        }),
        shared,
    };
    let settings = InstanceSettings::resolve(
        Path::new("/opt/widget").join(format!("{APP_STEM}.exe")).as_path(),
        semver::Version::new(1, 0, 0),
        local,
        overrides,
    )
    .expect("settings resolve");

    UpdaterInstance::new(
        settings,
        fake_platform(FakeRegistry::default(), FakeVersionResources::default(), launcher),
    )
}

/// Shared block that stores downloads in `dir` and pins the installed version.
pub fn shared_with_download_dir(dir: &Path, installed: &str) -> Value {
    json!({
        "detectionMethod": "FixedVersion",
        "detection": { "version": installed },
        "downloadLocation": { "input": dir.to_string_lossy() }
    })
}

/// Output of an updater run
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
}

/// A copy of the updater binary deployed under the product naming convention.
pub struct TestDeployment {
    _temp_dir: TempDir, // Keep alive for RAII cleanup
    app_path: PathBuf,
}

impl TestDeployment {
    /// Copy the built updater into a fresh directory as `Contoso_Widget_Updater`.
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let app_path =
            temp_dir.path().join(format!("{APP_STEM}{}", std::env::consts::EXE_SUFFIX));
        fs::copy(env!("CARGO_BIN_EXE_updater"), &app_path)
            .context("Failed to copy the updater binary")?;

        Ok(Self {
            _temp_dir: temp_dir,
            app_path,
        })
    }

    /// Path of the deployed updater.
    pub fn app_path(&self) -> &Path {
        &self.app_path
    }

    /// Write the local configuration file next to the updater.
    pub fn write_local_config(&self, config: &Value) -> Result<()> {
        let path = self.app_path.with_extension("json");
        fs::write(&path, serde_json::to_string_pretty(config)?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Run the deployed updater.
    pub fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(&self.app_path)
            .args(args)
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1")
            .env("UPDATER_NO_PROGRESS", "1")
            .output()
            .context("Failed to run the updater")?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}
