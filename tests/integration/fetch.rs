use serde_json::json;
use setup_updater::config::CliOverrides;
use setup_updater::core::UpdaterError;
use setup_updater::test_utils::FakeLauncher;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{UPDATES_PATH, instance_for};

/// Disabled releases are dropped and the rest is sorted newest first
#[tokio::test]
async fn test_releases_filtered_and_sorted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(UPDATES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instance": { "latestVersion": "1.0.0" },
            "releases": [
                { "name": "Two", "version": "2.0.0", "downloadUrl": "https://example.com/2.exe", "disabled": true },
                { "name": "One five", "version": "1.5.0", "downloadUrl": "https://example.com/15.exe" },
                { "name": "One nine", "version": "1.9.0", "downloadUrl": "https://example.com/19.exe" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut instance =
        instance_for(&server.uri(), None, CliOverrides::default(), FakeLauncher::default());
    instance.request_update_info().await.unwrap();

    let versions: Vec<&str> = instance.releases().iter().map(|r| r.version.as_str()).collect();
    assert_eq!(versions, ["1.9.0", "1.5.0"]);
    assert_eq!(instance.selected_release().map(|r| r.name.as_str()), Some("One nine"));
    assert_eq!(instance.remote_json()["releases"].as_array().map(Vec::len), Some(3));
}

/// Identification headers reach the server
#[tokio::test]
async fn test_identification_headers_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/Contoso/Widget/beta/updates.json"))
        .and(header("X-Updater-Manufacturer", "Contoso"))
        .and(header("X-Updater-Product", "Widget"))
        .and(header("X-Updater-Version", "1.0.0"))
        .and(header("X-Updater-Channel", "beta"))
        .and(header("X-Ring", "insider"))
        .and(header("User-Agent", "Contoso_Widget_Updater/1.0.0"))
        .and(header_exists("X-Updater-Architecture"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "releases": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let overrides = CliOverrides {
        channel: Some("beta".to_string()),
        additional_headers: vec![("X-Ring".to_string(), "insider".to_string())],
        ..Default::default()
    };
    let mut instance = instance_for(&server.uri(), None, overrides, FakeLauncher::default());
    instance.request_update_info().await.unwrap();

    assert!(instance.releases().is_empty());
    assert!(matches!(instance.is_installed_version_outdated(), Err(UpdaterError::NoReleases)));
}

/// Non-200 responses carry the status code
#[tokio::test]
async fn test_http_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(UPDATES_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut instance =
        instance_for(&server.uri(), None, CliOverrides::default(), FakeLauncher::default());
    let err = instance.request_update_info().await.unwrap_err();
    assert!(matches!(err, UpdaterError::Network { status: Some(404), .. }));
}

/// Malformed bodies are parse errors
#[tokio::test]
async fn test_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(UPDATES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("not valid json"))
        .mount(&server)
        .await;

    let mut instance =
        instance_for(&server.uri(), None, CliOverrides::default(), FakeLauncher::default());
    let err = instance.request_update_info().await.unwrap_err();
    assert!(matches!(err, UpdaterError::Parse { .. }));
}

/// The server shared block wins under the default authority
#[tokio::test]
async fn test_remote_shared_block_merged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(UPDATES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instance": {
                "emergencyUrl": "https://example.com/emergency",
                "errorFallbackUrl": "https://example.com/fallback"
            },
            "shared": {
                "productName": "Widget Pro",
                "detectionMethod": "FixedVersion",
                "detection": { "version": "1.0.0" }
            },
            "releases": [
                { "version": "1.2.0", "downloadUrl": "https://example.com/12.exe" }
            ]
        })))
        .mount(&server)
        .await;

    let local = json!({
        "productName": "Widget",
        "detectionMethod": "FixedVersion",
        "detection": { "version": "9.0.0" }
    });
    let mut instance =
        instance_for(&server.uri(), Some(local), CliOverrides::default(), FakeLauncher::default());
    instance.request_update_info().await.unwrap();

    assert_eq!(instance.merged_config().product_name, "Widget Pro");
    assert!(instance.is_installed_version_outdated().unwrap());
    assert_eq!(instance.emergency_url(), Some("https://example.com/emergency"));
    assert_eq!(instance.error_url(), Some("https://example.com/fallback"));
}

/// A forced local version replaces the server's detection method
#[tokio::test]
async fn test_force_local_version() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(UPDATES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "shared": {
                "detectionMethod": "FixedVersion",
                "detection": { "version": "1.0.0" }
            },
            "releases": [
                { "version": "1.2.0.0", "downloadUrl": "https://example.com/12.exe" }
            ]
        })))
        .mount(&server)
        .await;

    let overrides = CliOverrides {
        force_local_version: Some("1.2.0".to_string()),
        ..Default::default()
    };
    let mut instance = instance_for(&server.uri(), None, overrides, FakeLauncher::default());
    instance.request_update_info().await.unwrap();

    assert!(!instance.is_installed_version_outdated().unwrap());
}
