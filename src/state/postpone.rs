//! Postpone bookkeeping.
//!
//! When the user postpones an update, the current time is recorded in a store
//! that does not survive a reboot. Background and autostart runs skip the update
//! for [`POSTPONE_PERIOD_HOURS`] afterwards.
//!
//! The record is a 16 byte blob: seconds since the Unix epoch as little endian
//! `i64`, the sub-second nanoseconds as little endian `u32` and four zero bytes.

use crate::config::InstanceSettings;
use crate::constants::POSTPONE_PERIOD_HOURS;
use crate::core::UpdaterError;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Name of the value holding the postpone timestamp.
pub const POSTPONE_VALUE_NAME: &str = "LastTimestamp";

/// Size of the encoded timestamp.
const BLOB_LEN: usize = 16;

/// Backing store for the postpone timestamp.
pub trait PostponeStore: Send + Sync {
    /// Replace the stored blob.
    fn write(&self, blob: &[u8]) -> std::io::Result<()>;
    /// Stored blob, `None` when nothing was recorded.
    fn read(&self) -> Option<Vec<u8>>;
    /// Remove the stored blob. Returns whether something was removed.
    fn clear(&self) -> bool;
}

/// Volatile HKCU registry key `SOFTWARE\<vendor>\<product>\Postpone`.
#[cfg(windows)]
#[derive(Debug, Clone)]
pub struct RegistryStore {
    key: String,
}

#[cfg(windows)]
impl RegistryStore {
    /// Store keyed by manufacturer and product.
    #[must_use]
    pub fn new(vendor: &str, product: &str) -> Self {
        Self {
            key: format!("SOFTWARE\\{vendor}\\{product}\\Postpone"),
        }
    }
}

#[cfg(windows)]
impl PostponeStore for RegistryStore {
    fn write(&self, blob: &[u8]) -> std::io::Result<()> {
        crate::platform::windows::write_volatile_blob(&self.key, POSTPONE_VALUE_NAME, blob)
    }

    fn read(&self) -> Option<Vec<u8>> {
        crate::platform::windows::read_blob(&self.key, POSTPONE_VALUE_NAME)
    }

    fn clear(&self) -> bool {
        crate::platform::windows::delete_value(&self.key, POSTPONE_VALUE_NAME)
    }
}

/// File in the OS temp directory.
///
/// Most systems clear the temp directory on reboot, which approximates the
/// volatile registry key.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store keyed by manufacturer and product below the OS temp directory.
    #[must_use]
    pub fn new(vendor: &str, product: &str) -> Self {
        Self::at(std::env::temp_dir().join(format!("{vendor}_{product}_{POSTPONE_VALUE_NAME}.bin")))
    }

    /// Store at an explicit path.
    #[must_use]
    pub const fn at(path: PathBuf) -> Self {
        Self { path }
    }
}

impl PostponeStore for FileStore {
    fn write(&self, blob: &[u8]) -> std::io::Result<()> {
        std::fs::write(&self.path, blob)
    }

    fn read(&self) -> Option<Vec<u8>> {
        std::fs::read(&self.path).ok()
    }

    fn clear(&self) -> bool {
        std::fs::remove_file(&self.path).is_ok()
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blob: Mutex<Option<Vec<u8>>>,
}

impl PostponeStore for MemoryStore {
    fn write(&self, blob: &[u8]) -> std::io::Result<()> {
        let mut slot = self.blob.lock().map_err(|_| std::io::Error::other("store poisoned"))?;
        *slot = Some(blob.to_vec());
        Ok(())
    }

    fn read(&self) -> Option<Vec<u8>> {
        self.blob.lock().ok().and_then(|slot| slot.clone())
    }

    fn clear(&self) -> bool {
        self.blob.lock().ok().and_then(|mut slot| slot.take()).is_some()
    }
}

fn encode(at: DateTime<Utc>) -> [u8; BLOB_LEN] {
    let mut blob = [0_u8; BLOB_LEN];
    blob[..8].copy_from_slice(&at.timestamp().to_le_bytes());
    blob[8..12].copy_from_slice(&at.timestamp_subsec_nanos().to_le_bytes());
    blob
}

fn decode(blob: &[u8]) -> Option<DateTime<Utc>> {
    if blob.len() != BLOB_LEN {
        return None;
    }
    let secs = i64::from_le_bytes(blob[..8].try_into().ok()?);
    let nanos = u32::from_le_bytes(blob[8..12].try_into().ok()?);
    DateTime::from_timestamp(secs, nanos)
}

/// Postpone state of one product.
pub struct PostponeState {
    store: Box<dyn PostponeStore>,
    ignore: bool,
}

impl std::fmt::Debug for PostponeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostponeState").field("ignore", &self.ignore).finish_non_exhaustive()
    }
}

impl PostponeState {
    /// Postpone state over an explicit store.
    #[must_use]
    pub fn new(store: Box<dyn PostponeStore>, ignore: bool) -> Self {
        Self { store, ignore }
    }

    /// Postpone state in the platform store for the instance's product.
    #[must_use]
    pub fn for_instance(settings: &InstanceSettings) -> Self {
        let vendor = settings.identity.vendor();
        let product = settings.identity.product_name();

        #[cfg(windows)]
        let store: Box<dyn PostponeStore> = Box::new(RegistryStore::new(vendor, product));
        #[cfg(not(windows))]
        let store: Box<dyn PostponeStore> = Box::new(FileStore::new(vendor, product));

        Self::new(store, settings.overrides.ignore_postpone)
    }

    /// Record that the user postponed the update now.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::Io`] if the store cannot be written.
    pub fn set_postpone_data(&self) -> Result<(), UpdaterError> {
        self.set_postpone_data_at(Utc::now())
    }

    /// Record a postpone at `at`.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::Io`] if the store cannot be written.
    pub fn set_postpone_data_at(&self, at: DateTime<Utc>) -> Result<(), UpdaterError> {
        self.store.write(&encode(at))?;
        info!("Update postponed at {}", at.to_rfc3339());
        Ok(())
    }

    /// Whether a postpone recorded less than 24 hours ago is active.
    #[must_use]
    pub fn is_in_postpone_period(&self) -> bool {
        self.is_in_postpone_period_at(Utc::now())
    }

    /// Whether a postpone is active at `now`.
    ///
    /// Always `false` when postponing is ignored. A timestamp in the future counts
    /// as inside the period.
    #[must_use]
    pub fn is_in_postpone_period_at(&self, now: DateTime<Utc>) -> bool {
        if self.ignore {
            debug!("Ignoring postpone state");
            return false;
        }

        let Some(blob) = self.store.read() else {
            return false;
        };
        let Some(recorded) = decode(&blob) else {
            warn!("Discarding malformed postpone record ({} bytes)", blob.len());
            return false;
        };

        let active = now.signed_duration_since(recorded) < Duration::hours(POSTPONE_PERIOD_HOURS);
        debug!("Postponed at {}, active: {}", recorded.to_rfc3339(), active);
        active
    }

    /// Forget any recorded postpone. Returns whether a record was removed.
    pub fn purge_postpone_data(&self) -> bool {
        let removed = self.store.clear();
        if removed {
            info!("Postpone record removed");
        }
        removed
    }
}
