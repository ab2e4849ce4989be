use serde_json::json;
use setup_updater::config::CliOverrides;
use setup_updater::instance::UpdaterInstance;
use setup_updater::platform::LaunchMode;
use setup_updater::test_utils::FakeLauncher;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{UPDATES_PATH, instance_for, shared_with_download_dir};

const SETUP_BYTES: &[u8] = b"MZ\x90\x00 fake installer payload";

async fn serve_release(server: &MockServer, release: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(UPDATES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "releases": [release] })))
        .mount(server)
        .await;
}

async fn fetched_instance(
    server: &MockServer,
    downloads: &TempDir,
    launcher: FakeLauncher,
) -> UpdaterInstance {
    let mut instance = instance_for(
        &server.uri(),
        Some(shared_with_download_dir(downloads.path(), "1.0.0")),
        CliOverrides::default(),
        launcher,
    );
    instance.request_update_info().await.unwrap();
    instance
}

/// The download is renamed to the Content-Disposition file name
#[tokio::test]
async fn test_download_uses_content_disposition_name() {
    let server = MockServer::start().await;
    let downloads = TempDir::new().unwrap();
    serve_release(
        &server,
        json!({ "version": "1.1.0", "downloadUrl": format!("{}/files/latest", server.uri()) }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/latest"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Disposition", "attachment; filename=\"WidgetSetup.exe\"")
                .set_body_bytes(SETUP_BYTES),
        )
        .mount(&server)
        .await;

    let mut instance = fetched_instance(&server, &downloads, FakeLauncher::default()).await;

    let reported = Arc::new(AtomicU64::new(0));
    let sink = reported.clone();
    assert!(instance.start_download(0, Some(Arc::new(move |done, _| sink.store(done, Ordering::SeqCst)))));
    assert!(!instance.start_download(0, None));

    let status = instance.wait_for_download().await.unwrap();
    assert!(status.has_finished);
    assert!(status.has_succeeded, "{status:?}");
    assert_eq!(status.status_code, Some(200));
    assert_eq!(reported.load(Ordering::SeqCst), SETUP_BYTES.len() as u64);

    let file = instance.downloaded_file(0).unwrap();
    assert_eq!(file, downloads.path().join("WidgetSetup.exe"));
    assert_eq!(std::fs::read(&file).unwrap(), SETUP_BYTES);

    drop(instance);
    assert!(!file.exists());
}

/// A failed response leaves no file behind
#[tokio::test]
async fn test_download_not_found_removes_file() {
    let server = MockServer::start().await;
    let downloads = TempDir::new().unwrap();
    serve_release(
        &server,
        json!({ "version": "1.1.0", "downloadUrl": format!("{}/files/missing", server.uri()) }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut instance = fetched_instance(&server, &downloads, FakeLauncher::default()).await;
    assert!(instance.start_download(0, None));

    let status = instance.wait_for_download().await.unwrap();
    assert!(status.has_finished);
    assert!(!status.has_succeeded);
    assert_eq!(status.status_code, Some(404));
    assert!(instance.downloaded_file(0).is_none());
    assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 0);
}

/// Checksums are verified and a mismatch discards the download
#[tokio::test]
async fn test_download_checksum_verification() {
    let server = MockServer::start().await;
    let good = TempDir::new().unwrap();
    let digest = hex::encode(Sha256::digest(SETUP_BYTES));

    Mock::given(method("GET"))
        .and(path("/files/setup.exe"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(SETUP_BYTES))
        .mount(&server)
        .await;
    serve_release(
        &server,
        json!({
            "version": "1.1.0",
            "downloadUrl": format!("{}/files/setup.exe", server.uri()),
            "checksum": { "checksum": digest.to_uppercase(), "checksumAlg": "SHA256" }
        }),
    )
    .await;

    let mut instance = fetched_instance(&server, &good, FakeLauncher::default()).await;
    assert!(instance.start_download(0, None));
    assert!(instance.wait_for_download().await.unwrap().has_succeeded);

    let bad_server = MockServer::start().await;
    let bad = TempDir::new().unwrap();
    Mock::given(method("GET"))
        .and(path("/files/setup.exe"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tampered".as_slice()))
        .mount(&bad_server)
        .await;
    serve_release(
        &bad_server,
        json!({
            "version": "1.1.0",
            "downloadUrl": format!("{}/files/setup.exe", bad_server.uri()),
            "checksum": { "checksum": digest, "checksumAlg": "SHA256" }
        }),
    )
    .await;

    let mut instance = fetched_instance(&bad_server, &bad, FakeLauncher::default()).await;
    assert!(instance.start_download(0, None));
    let status = instance.wait_for_download().await.unwrap();
    assert!(!status.has_succeeded);
    assert!(status.error.is_some());
    assert_eq!(std::fs::read_dir(bad.path()).unwrap().count(), 0);
}

/// Fetch, detection, download and setup in one pass
#[tokio::test]
async fn test_full_update_cycle_with_fake_installer() {
    let server = MockServer::start().await;
    let downloads = TempDir::new().unwrap();
    serve_release(
        &server,
        json!({
            "version": "1.1.0",
            "downloadUrl": format!("{}/files/setup.exe", server.uri()),
            "launchArguments": "/quiet /norestart",
            "exitCode": { "skipCheck": false, "successCodes": [0, 3010] }
        }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/setup.exe"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(SETUP_BYTES))
        .mount(&server)
        .await;

    let launcher = FakeLauncher::exiting_with(3010);
    let mut instance = fetched_instance(&server, &downloads, launcher.clone()).await;
    assert!(instance.is_installed_version_outdated().unwrap());

    assert!(instance.start_download(0, None));
    assert!(instance.wait_for_download().await.unwrap().has_succeeded);

    assert!(instance.start_setup());
    let status = instance.wait_for_setup().await.unwrap();
    assert!(status.has_succeeded, "{status:?}");
    assert_eq!(status.exit_code, Some(3010));

    let requests = launcher.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].mode, LaunchMode::Direct);
    assert_eq!(requests[0].arguments, vec!["/quiet /norestart".to_string()]);
}

/// A reset download that fails late leaves a later successful download intact
#[tokio::test]
async fn test_reset_then_restart_keeps_new_download() {
    let server = MockServer::start().await;
    let downloads = TempDir::new().unwrap();
    serve_release(
        &server,
        json!({ "version": "1.1.0", "downloadUrl": format!("{}/files/setup.exe", server.uri()) }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/setup.exe"))
        .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_millis(500)))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/setup.exe"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(SETUP_BYTES))
        .mount(&server)
        .await;

    let launcher = FakeLauncher::exiting_with(0);
    let mut instance = fetched_instance(&server, &downloads, launcher.clone()).await;

    assert!(instance.start_download(0, None));
    tokio::time::sleep(Duration::from_millis(100)).await;
    instance.reset_download_state();

    assert!(instance.start_download(0, None));
    let status = instance.wait_for_download().await.unwrap();
    assert!(status.has_succeeded, "{status:?}");
    let file = instance.downloaded_file(0).unwrap();

    // Let the first request fail and clean up after itself
    tokio::time::sleep(Duration::from_millis(800)).await;

    assert_eq!(instance.downloaded_file(0), Some(file.clone()));
    assert_eq!(std::fs::read(&file).unwrap(), SETUP_BYTES);
    assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 1);

    assert!(instance.start_setup());
    assert!(instance.wait_for_setup().await.unwrap().has_succeeded);
    assert_eq!(launcher.requests()[0].program, file);

    drop(instance);
    assert!(!file.exists());
}

/// A refreshed release list never hands a download to a different release
#[tokio::test]
async fn test_refetch_keeps_download_with_its_release() {
    let server = MockServer::start().await;
    let downloads = TempDir::new().unwrap();
    let old_release =
        json!({ "version": "1.1.0", "downloadUrl": format!("{}/files/11.exe", server.uri()) });

    Mock::given(method("GET"))
        .and(path(UPDATES_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "releases": [old_release.clone()] })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(UPDATES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "releases": [
                old_release,
                { "version": "1.2.0", "downloadUrl": format!("{}/files/12.exe", server.uri()) }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/11.exe"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(SETUP_BYTES))
        .mount(&server)
        .await;

    let mut instance = fetched_instance(&server, &downloads, FakeLauncher::default()).await;
    assert!(instance.start_download(0, None));
    assert!(instance.wait_for_download().await.unwrap().has_succeeded);
    let file = instance.downloaded_file(0).unwrap();

    instance.request_update_info().await.unwrap();

    assert_eq!(instance.selected_release().map(|r| r.version.as_str()), Some("1.2.0"));
    assert!(instance.downloaded_file(0).is_none());
    assert_eq!(instance.downloaded_file(1), Some(file.clone()));
    assert!(!instance.start_setup());

    drop(instance);
    assert!(!file.exists());
}

/// A panicking progress callback ends the download with a failed status
#[tokio::test]
async fn test_panicking_progress_callback_fails_download() {
    let server = MockServer::start().await;
    let downloads = TempDir::new().unwrap();
    serve_release(
        &server,
        json!({ "version": "1.1.0", "downloadUrl": format!("{}/files/setup.exe", server.uri()) }),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/files/setup.exe"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(SETUP_BYTES))
        .mount(&server)
        .await;

    let mut instance = fetched_instance(&server, &downloads, FakeLauncher::default()).await;
    assert!(instance.start_download(0, Some(Arc::new(|_: u64, _: Option<u64>| panic!("progress sink gone")))));

    let status = instance.wait_for_download().await.unwrap();
    assert!(status.has_finished);
    assert!(!status.has_succeeded);
    assert!(status.error.is_some());
    assert!(instance.downloaded_file(0).is_none());
    assert!(!instance.start_download(0, None));

    instance.reset_download_state();
    assert!(instance.start_download(0, None));
    assert!(instance.wait_for_download().await.unwrap().has_succeeded);
}
