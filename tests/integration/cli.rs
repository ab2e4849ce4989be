use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{TestDeployment, UPDATES_PATH, url_template};

/// Help lists the maintenance flags but not the hidden hand-off command
#[test]
fn test_help() {
    Command::cargo_bin("updater")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--install"))
        .stdout(predicate::str::contains("--background"))
        .stdout(predicate::str::contains("--add-header"))
        .stdout(predicate::str::contains("--skip-self-update"))
        .stdout(predicate::str::contains("Commands:").not())
        .stdout(predicate::str::is_match(r"(?m)^\s+self-update\b").unwrap().not());
}

/// Invalid flag values are rejected by the parser
#[test]
fn test_invalid_log_level() {
    Command::cargo_bin("updater")
        .unwrap()
        .args(["--log-level", "loud"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("loud"));
}

/// A failed hand-off restores the original updater
#[test]
fn test_self_update_restores_original_on_failure() {
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("Contoso_Widget_Updater.exe");
    std::fs::write(&target, b"original updater").unwrap();

    Command::cargo_bin("updater")
        .unwrap()
        .env_remove("RUST_LOG")
        .args(["self-update", "--pid", "3999999", "--url", "http://127.0.0.1:9/updater.exe", "--path"])
        .arg(&target)
        .arg("--silent")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));

    assert_eq!(std::fs::read(&target).unwrap(), b"original updater");
    assert!(!temp.path().join("Contoso_Widget_Updater.exe.backup").exists());
}

/// The hand-off replaces the original once the download succeeds
#[tokio::test(flavor = "multi_thread")]
async fn test_self_update_replaces_original() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/updater.exe"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new updater".as_slice()))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let target = temp.path().join("Contoso_Widget_Updater.exe");
    std::fs::write(&target, b"original updater").unwrap();

    let url = format!("{}/updater.exe", server.uri());
    let cmd_target = target.clone();
    let assert = tokio::task::spawn_blocking(move || {
        Command::cargo_bin("updater")
            .unwrap()
            .env_remove("RUST_LOG")
            .args(["self-update", "--pid", "3999999", "--url", &url, "--path"])
            .arg(&cmd_target)
            .assert()
    })
    .await
    .unwrap();
    assert.success();

    assert_eq!(std::fs::read(&target).unwrap(), b"new updater");
    assert!(!temp.path().join("Contoso_Widget_Updater.exe.backup").exists());
}

/// The hand-off deletes the scratch copy it runs from
#[tokio::test(flavor = "multi_thread")]
async fn test_self_update_removes_scratch_copy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/updater.exe"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"new updater".as_slice()))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let target = temp.path().join("Contoso_Widget_Updater.exe");
    std::fs::write(&target, b"original updater").unwrap();

    let (file, scratch) = tempfile::Builder::new()
        .prefix("Contoso_Widget_Updater-")
        .suffix(std::env::consts::EXE_SUFFIX)
        .tempfile()
        .unwrap()
        .keep()
        .unwrap();
    drop(file);
    std::fs::copy(env!("CARGO_BIN_EXE_updater"), &scratch).unwrap();

    let url = format!("{}/updater.exe", server.uri());
    let program = scratch.clone();
    let cmd_target = target.clone();
    let output = tokio::task::spawn_blocking(move || {
        std::process::Command::new(&program)
            .env_remove("RUST_LOG")
            .args(["self-update", "--pid", "3999999", "--url", &url, "--path"])
            .arg(&cmd_target)
            .arg("--silent")
            .output()
    })
    .await
    .unwrap()
    .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(std::fs::read(&target).unwrap(), b"new updater");
    #[cfg(unix)]
    assert!(!scratch.exists());
    #[cfg(windows)]
    let _ = std::fs::remove_file(&scratch);
}

/// A deployed updater honors the server's disabled flag
#[tokio::test(flavor = "multi_thread")]
async fn test_updates_disabled_by_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(UPDATES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instance": { "updatesDisabled": true },
            "releases": [
                { "version": "9.0.0", "downloadUrl": format!("{}/never", server.uri()) }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let deployment = TestDeployment::new().unwrap();
    deployment
        .write_local_config(&json!({ "instance": { "serverUrlTemplate": url_template(&server.uri()) } }))
        .unwrap();

    let output = tokio::task::spawn_blocking(move || {
        deployment.run(&["--background", "--skip-self-update", "--log-level", "info"])
    })
    .await
    .unwrap()
    .unwrap();

    assert!(output.success, "{}", output.stderr);
    assert!(output.stderr.contains("Updates are disabled"));
}

/// Server errors fail the run with a non-zero exit code
#[tokio::test(flavor = "multi_thread")]
async fn test_server_error_fails_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(UPDATES_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let deployment = TestDeployment::new().unwrap();
    deployment
        .write_local_config(&json!({ "instance": { "serverUrlTemplate": url_template(&server.uri()) } }))
        .unwrap();

    let output = tokio::task::spawn_blocking(move || deployment.run(&["--background"]))
        .await
        .unwrap()
        .unwrap();

    assert!(!output.success);
    assert_eq!(output.code, Some(1));
    assert!(output.stderr.contains("error"));
}

/// Without configured detection the run fails after the fetch
#[tokio::test(flavor = "multi_thread")]
async fn test_missing_detection_method() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(UPDATES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "releases": [
                { "version": "2.0.0", "downloadUrl": format!("{}/setup.exe", server.uri()) }
            ]
        })))
        .mount(&server)
        .await;

    let deployment = TestDeployment::new().unwrap();
    deployment
        .write_local_config(&json!({ "instance": { "serverUrlTemplate": url_template(&server.uri()) } }))
        .unwrap();

    let output =
        tokio::task::spawn_blocking(move || deployment.run(&["--background", "--skip-self-update"]))
            .await
            .unwrap()
            .unwrap();

    assert!(!output.success);
    assert!(output.stderr.contains("detection"), "{}", output.stderr);
}
