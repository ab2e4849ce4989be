//! setup-updater - self-update client for installed Windows software
//!
//! One updater binary ships next to each product. Its file name identifies the
//! product (`Contoso_Widget_Updater.exe` is manufacturer `Contoso`, product
//! `Widget`), and every run asks the update server whether a newer release exists,
//! downloads it and runs its installer.
//!
//! # Architecture Overview
//!
//! ```text
//! InstanceSettings ──► UpdaterInstance ──► request_update_info ──► releases
//!   (config)             (instance)          (remote API)            │
//!                                                                    ▼
//!                     start_setup ◄── start_download ◄── is_installed_version_outdated
//!                     (installer)      (temp file)        (detection)
//! ```
//!
//! # Core Modules
//!
//! - [`config`] - local configuration file, product identity and configuration merging
//! - [`models`] - wire types of the server response and the merged configuration
//! - [`detection`] - decides whether the installed product is outdated
//! - [`instance`] - fetch, download and setup state machines of one product
//! - [`templating`] - Tera rendering of server supplied paths and expressions
//! - [`platform`] - registry, version resource and process launch capabilities
//! - [`state`] - postpone timestamp, autostart entry and scheduled task
//! - [`upgrade`] - replacement of the updater binary itself
//! - [`cli`] - command line and the headless update cycle
//!
//! ## Supporting Modules
//!
//! - [`core`] - [`UpdaterError`](core::UpdaterError) and user facing error rendering
//! - [`version`] - lenient parsing of four part Windows versions
//! - [`utils`] - checksums, file system helpers and progress bars
//! - [`constants`] - compiled-in defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use setup_updater::config::{CliOverrides, InstanceSettings, LocalConfigFile};
//! use setup_updater::instance::UpdaterInstance;
//! use setup_updater::platform::Platform;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let app = Path::new(r"C:\Program Files\Widget\Contoso_Widget_Updater.exe");
//! let local = LocalConfigFile::load_or_default(app).await;
//! let settings =
//!     InstanceSettings::resolve(app, semver::Version::new(1, 0, 0), local, CliOverrides::default())?;
//!
//! let mut instance = UpdaterInstance::new(settings, Platform::system());
//! instance.request_update_info().await?;
//! if instance.is_installed_version_outdated()? {
//!     instance.start_download(0, None);
//!     instance.wait_for_download().await;
//!     instance.start_setup();
//!     instance.wait_for_setup().await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod detection;
pub mod instance;
pub mod models;
pub mod platform;
pub mod state;
pub mod templating;
pub mod upgrade;
pub mod utils;
pub mod version;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
