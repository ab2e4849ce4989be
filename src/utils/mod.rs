//! Cross-cutting utilities.
//!
//! - [`checksum`] - streaming file digests and checksum verification
//! - [`fs`] - directory creation, path safety and temp file cleanup
//! - [`progress`] - terminal download progress

pub mod checksum;
pub mod fs;
pub mod progress;

pub use checksum::ChecksumVerifier;
pub use fs::{ensure_dir, is_dir_writable, is_safe_path, is_strictly_inside, remove_file_or_schedule};
pub use progress::DownloadProgress;
