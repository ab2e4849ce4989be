//! Global constants used throughout the updater.
//!
//! Compiled-in defaults for the merged configuration, network timeouts, header
//! names and retry parameters live here so that magic values stay discoverable.

use std::time::Duration;

/// Default server URL template. `{}` is replaced with the tenant sub-path.
pub const DEFAULT_SERVER_URL_TEMPLATE: &str = "https://updates.nefarius.at/api/{}/updates.json";

/// Default regular expression applied to the executable file stem.
///
/// Capture group 1 is the manufacturer, capture group 2 the product name, so an
/// executable called `Contoso_Widget_Updater.exe` resolves to `Contoso/Widget`.
pub const DEFAULT_FILENAME_REGEX: &str = r"^(\w+)_(\w+)_Updater.*?";

/// Default window title reported to the UI layer.
pub const DEFAULT_WINDOW_TITLE: &str = "Nefarius' Updater";

/// Default product name reported to the UI layer.
pub const DEFAULT_PRODUCT_NAME: &str = "Updater";

/// Installer exit code treated as success when no policy is configured.
pub const DEFAULT_SUCCESS_EXIT_CODE: i32 = 0;

/// Prefix of the identification headers sent to the remote API.
pub const HEADER_PREFIX: &str = "X-Updater";

/// Overall timeout for update info requests (5 seconds).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Connect timeout for downloads (5 seconds).
///
/// Downloads have no overall timeout, the body may take arbitrarily long.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum number of redirects followed per request.
pub const MAX_REDIRECTS: usize = 5;

/// Chunk size used when hashing files.
pub const HASH_CHUNK_SIZE: usize = 4096;

/// Interval between checks while waiting for the parent process to exit.
pub const PARENT_EXIT_POLL_INTERVAL_MS: u64 = 250;

/// Number of checks while waiting for the parent process to exit.
pub const PARENT_EXIT_POLL_ATTEMPTS: usize = 20;

/// Length of the postpone period.
pub const POSTPONE_PERIOD_HOURS: i64 = 24;

/// Earliest hour of the randomized scheduled task trigger.
pub const SCHEDULED_TASK_MIN_HOUR: u32 = 6;

/// Latest hour of the randomized scheduled task trigger (inclusive).
pub const SCHEDULED_TASK_MAX_HOUR: u32 = 22;

/// Sub-directory used below the program data fallback location.
pub const DOWNLOADS_DIR_NAME: &str = "downloads";

/// Prefix of temporary download files.
pub const DOWNLOAD_FILE_PREFIX: &str = "UPD";

/// Command line switch added to relaunched temporary copies.
pub const TEMPORARY_SWITCH: &str = "--temporary";

/// Command line switch used for autostart and scheduled launches.
pub const AUTOSTART_SWITCH: &str = "--autostart";

/// Command line switch used for scheduled task launches.
pub const BACKGROUND_SWITCH: &str = "--background";
