//! Background release download.
//!
//! A download runs as a single tokio task that owns the output file for its whole
//! lifetime. The caller polls [`UpdaterInstance::download_status`] which never
//! blocks. The finished file is attached to the release it was started for, even
//! when the release list was refreshed in the meantime.
//!
//! Target directory resolution, first usable wins:
//! 1. The configured `downloadLocation`, rendered as a template
//! 2. The OS temp directory
//! 3. `<ProgramData>/<manufacturer>/<product>/downloads`

use super::task::{TaskHandle, TaskState};
use super::{TempFileRegistry, UpdaterInstance};
use crate::constants::{DOWNLOAD_FILE_PREFIX, DOWNLOADS_DIR_NAME};
use crate::core::UpdaterError;
use crate::models::{ChecksumParameters, UpdateRelease};
use crate::utils::{ChecksumVerifier, ensure_dir, remove_file_or_schedule};
use futures::StreamExt;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Client, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

static FILENAME_REGEX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)^filename\s*=\s*"?([^";]+)"?"#).ok());

/// Progress callback, receives downloaded bytes and the total size when known.
pub type ProgressCallback = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Snapshot of the download task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStatus {
    /// The task is still running
    pub is_downloading: bool,
    /// The task has produced its result
    pub has_finished: bool,
    /// The file is on disk and passed verification
    pub has_succeeded: bool,
    /// HTTP status of the response, `None` if no response was received
    pub status_code: Option<u16>,
    /// Failure description
    pub error: Option<String>,
}

/// Result produced by the download task.
#[derive(Debug)]
pub(crate) struct DownloadOutcome {
    status_code: Option<u16>,
    path: Option<PathBuf>,
    error: Option<UpdaterError>,
}

impl DownloadOutcome {
    fn failed(status_code: Option<u16>, error: UpdaterError) -> Self {
        Self {
            status_code,
            path: None,
            error: Some(error),
        }
    }

    fn to_status(&self) -> DownloadStatus {
        DownloadStatus {
            is_downloading: false,
            has_finished: true,
            has_succeeded: self.error.is_none() && self.path.is_some(),
            status_code: self.status_code,
            error: self.error.as_ref().map(ToString::to_string),
        }
    }
}

/// In-flight download of one release.
#[derive(Debug)]
pub(crate) struct DownloadTask {
    release: UpdateRelease,
    handle: TaskHandle<DownloadOutcome>,
}

/// Everything the task needs, moved into it on start.
struct DownloadJob {
    client: Client,
    url: String,
    checksum: Option<ChecksumParameters>,
    directories: Vec<PathBuf>,
    id: u64,
    temp_files: TempFileRegistry,
    progress: Option<ProgressCallback>,
}

impl UpdaterInstance {
    /// Start downloading the release at `index` in the background.
    ///
    /// # Returns
    ///
    /// `false` when a download is already tracked, the index is out of range, the
    /// HTTP client cannot be built or no tokio runtime is available.
    pub fn start_download(&mut self, index: usize, progress: Option<ProgressCallback>) -> bool {
        if self.download.is_some() {
            debug!("A download is already in progress");
            return false;
        }

        let Some(release) = self.releases.get(index) else {
            warn!("Cannot download release {}: index out of range", index);
            return false;
        };

        let client = match self.http_client(false) {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to create download client: {}", e);
                return false;
            }
        };

        let release = release.clone();
        let job = DownloadJob {
            client,
            url: release.download_url.clone(),
            checksum: release.checksum.clone(),
            directories: self.download_directories(),
            id: self.next_download_id,
            temp_files: Arc::clone(&self.temp_files),
            progress,
        };

        match TaskHandle::spawn(job.run()) {
            Some(handle) => {
                info!("Downloading {} from {}", release.version, release.download_url);
                self.next_download_id += 1;
                self.download = Some(DownloadTask {
                    release,
                    handle,
                });
                true
            }
            None => {
                warn!("Cannot start download outside of a tokio runtime");
                false
            }
        }
    }

    /// Poll the download task.
    ///
    /// Returns `None` when no download was started since the last reset. A finished
    /// result stays available until [`UpdaterInstance::reset_download_state`].
    pub fn download_status(&mut self) -> Option<DownloadStatus> {
        let task = self.download.as_mut()?;

        let (status, path) = match task.handle.poll() {
            TaskState::Running => (
                DownloadStatus {
                    is_downloading: true,
                    ..Default::default()
                },
                None,
            ),
            TaskState::Finished(outcome) => (outcome.to_status(), outcome.path.clone()),
            TaskState::Lost => (
                DownloadStatus {
                    has_finished: true,
                    error: Some("download task ended without a result".to_string()),
                    ..Default::default()
                },
                None,
            ),
        };

        if let Some(path) = path {
            let started_for = &task.release;
            if let Some(release) = self.releases.iter_mut().find(|r| r.is_same_release(started_for)) {
                release.local_temp_file_path = Some(path);
            }
        }

        Some(status)
    }

    /// Wait for the download task and return its final status.
    pub async fn wait_for_download(&mut self) -> Option<DownloadStatus> {
        self.download.as_mut()?.handle.wait().await;
        self.download_status()
    }

    /// Forget the download task. A running download keeps going unobserved.
    pub fn reset_download_state(&mut self) {
        self.download = None;
    }

    /// Candidate download directories in order of preference.
    pub(crate) fn download_directories(&self) -> Vec<PathBuf> {
        let mut directories = Vec::new();

        if let Some(location) = &self.merged.download_location {
            match self.renderer.render_with(&location.input, location.data.as_ref()) {
                Ok(rendered) if !rendered.trim().is_empty() => {
                    directories.push(PathBuf::from(rendered.trim()));
                }
                Ok(_) => warn!("Configured download location renders empty"),
                Err(e) => warn!("Failed to render download location: {}", e),
            }
        }

        directories.push(std::env::temp_dir());

        if let Some(program_data) =
            std::env::var_os("ProgramData").map(PathBuf::from).or_else(dirs::data_dir)
        {
            let identity = &self.settings.identity;
            directories.push(
                program_data
                    .join(identity.vendor())
                    .join(identity.product_name())
                    .join(DOWNLOADS_DIR_NAME),
            );
        }

        directories
    }
}

impl DownloadJob {
    async fn run(self) -> DownloadOutcome {
        let (file, path) = match create_download_file(&self.directories) {
            Ok(created) => created,
            Err(e) => return DownloadOutcome::failed(None, e),
        };
        self.track(Some(path.clone()));

        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(e) => {
                self.discard(&path);
                return DownloadOutcome::failed(None, UpdaterError::Network {
                    status: None,
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status();
        let code = Some(status.as_u16());
        if status != StatusCode::OK {
            warn!("Download of {} failed with status {}", self.url, status);
            self.discard(&path);
            return DownloadOutcome::failed(code, UpdaterError::Network {
                status: code,
                reason: status.canonical_reason().unwrap_or("unexpected status").to_string(),
            });
        }

        let suggested_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_content_disposition);
        let total = response.content_length();

        let mut file = tokio::fs::File::from_std(file);
        let mut stream = response.bytes_stream();
        let mut downloaded = 0_u64;

        while let Some(chunk) = stream.next().await {
            let written = match chunk {
                Ok(bytes) => file.write_all(&bytes).await.map(|()| bytes.len() as u64),
                Err(e) => {
                    drop(file);
                    self.discard(&path);
                    return DownloadOutcome::failed(code, UpdaterError::Network {
                        status: code,
                        reason: e.to_string(),
                    });
                }
            };
            match written {
                Ok(len) => downloaded += len,
                Err(e) => {
                    drop(file);
                    self.discard(&path);
                    return DownloadOutcome::failed(code, e.into());
                }
            }
            if let Some(progress) = &self.progress {
                progress(downloaded, total);
            }
        }

        if let Err(e) = file.flush().await {
            drop(file);
            self.discard(&path);
            return DownloadOutcome::failed(code, e.into());
        }
        drop(file);
        debug!("Downloaded {} bytes to {}", downloaded, path.display());

        let path = match suggested_name {
            Some(name) => self.rename_to(&path, &name),
            None => path,
        };

        if let Some(expected) = self.checksum.clone() {
            let verify_path = path.clone();
            let verified = tokio::task::spawn_blocking(move || {
                ChecksumVerifier::verify(&verify_path, &expected)
            })
            .await
            .unwrap_or_else(|e| {
                Err(UpdaterError::Other {
                    message: format!("checksum task failed: {e}"),
                })
            });

            if let Err(e) = verified {
                warn!("Discarding {}: {}", path.display(), e);
                self.discard(&path);
                return DownloadOutcome::failed(code, e);
            }
        }

        info!("Download finished: {}", path.display());
        DownloadOutcome {
            status_code: code,
            path: Some(path),
            error: None,
        }
    }

    fn track(&self, path: Option<PathBuf>) {
        if let Ok(mut files) = self.temp_files.lock() {
            match path {
                Some(path) => {
                    files.insert(self.id, path);
                }
                None => {
                    files.remove(&self.id);
                }
            }
        }
    }

    fn discard(&self, path: &Path) {
        remove_file_or_schedule(path);
        self.track(None);
    }

    /// Rename the download to the server suggested file name, keeping the
    /// temporary name when that fails.
    fn rename_to(&self, path: &Path, suggested: &str) -> PathBuf {
        let Some(file_name) = Path::new(suggested).file_name() else {
            return path.to_path_buf();
        };
        let Some(target) = path.parent().map(|dir| dir.join(file_name)) else {
            return path.to_path_buf();
        };

        match std::fs::rename(path, &target) {
            Ok(()) => {
                debug!("Renamed download to {}", target.display());
                self.track(Some(target.clone()));
                target
            }
            Err(e) => {
                warn!("Failed to rename {} to {}: {}", path.display(), target.display(), e);
                path.to_path_buf()
            }
        }
    }
}

/// Create a uniquely named file in the first usable directory.
fn create_download_file(directories: &[PathBuf]) -> Result<(std::fs::File, PathBuf), UpdaterError> {
    for dir in directories {
        if let Err(e) = ensure_dir(dir) {
            warn!("Download directory {} unusable: {:#}", dir.display(), e);
            continue;
        }

        match tempfile::Builder::new().prefix(DOWNLOAD_FILE_PREFIX).tempfile_in(dir) {
            Ok(temp) => match temp.keep() {
                Ok((file, path)) => return Ok((file, path)),
                Err(e) => warn!("Failed to keep temporary file in {}: {}", dir.display(), e),
            },
            Err(e) => warn!("Failed to create temporary file in {}: {}", dir.display(), e),
        }
    }

    Err(UpdaterError::Other {
        message: "no writable download directory available".to_string(),
    })
}

/// Extract the file name from a `Content-Disposition` header value.
#[must_use]
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    let regex = FILENAME_REGEX.as_ref()?;
    value
        .split(';')
        .filter_map(|part| regex.captures(part.trim()))
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().trim().to_string())
        .find(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliOverrides;
    use crate::instance::tests::instance_with;
    use crate::models::{DownloadLocationConfig, SharedConfig};
    use crate::test_utils::release;
    use serde_json::json;

    #[test]
    fn test_filename_from_content_disposition() {
        assert_eq!(
            filename_from_content_disposition(r#"attachment; filename="Widget_Setup.exe""#).as_deref(),
            Some("Widget_Setup.exe")
        );
        assert_eq!(
            filename_from_content_disposition("attachment;filename=setup.msi").as_deref(),
            Some("setup.msi")
        );
        assert_eq!(filename_from_content_disposition("inline"), None);
        assert_eq!(filename_from_content_disposition("attachment; filename*=UTF-8''x.exe"), None);
    }

    #[test]
    fn test_directory_chain() {
        let shared = SharedConfig {
            download_location: Some(DownloadLocationConfig {
                input: "{{ base }}/cache".to_string(),
                data: json!({"base": "/srv"}).as_object().cloned(),
            }),
            ..Default::default()
        };
        let instance = instance_with(Some(shared), CliOverrides::default());
        let dirs = instance.download_directories();

        assert_eq!(dirs[0], PathBuf::from("/srv/cache"));
        assert_eq!(dirs[1], std::env::temp_dir());
        if let Some(last) = dirs.get(2) {
            assert!(last.ends_with("Contoso/Widget/downloads"));
        }
    }

    #[test]
    fn test_create_download_file_skips_unusable_dirs() {
        let temp = tempfile::TempDir::new().unwrap();
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let (_, path) =
            create_download_file(&[blocker.join("sub"), temp.path().to_path_buf()]).unwrap();
        assert!(path.starts_with(temp.path()));
        assert!(
            path.file_name().unwrap().to_string_lossy().starts_with(DOWNLOAD_FILE_PREFIX)
        );
    }

    #[test]
    fn test_status_before_start() {
        let mut instance = instance_with(None, CliOverrides::default());
        assert!(instance.download_status().is_none());
    }

    #[test]
    fn test_start_outside_runtime() {
        let mut instance = instance_with(None, CliOverrides::default());
        instance.releases = vec![release("1.0.0", "http://127.0.0.1:9/setup.exe")];
        assert!(!instance.start_download(0, None));
        assert!(instance.download_status().is_none());
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let mut instance = instance_with(None, CliOverrides::default());
        instance.releases = vec![release("1.0.0", "http://127.0.0.1:9/setup.exe")];

        assert!(instance.start_download(0, None));
        assert!(!instance.start_download(0, None));

        let status = instance.wait_for_download().await.unwrap();
        assert!(status.has_finished);
        assert!(!status.has_succeeded);
        assert!(instance.downloaded_file(0).is_none());

        instance.reset_download_state();
        assert!(instance.download_status().is_none());
    }

    #[test]
    fn test_start_with_bad_index() {
        let mut instance = instance_with(None, CliOverrides::default());
        assert!(!instance.start_download(3, None));
    }
}
