//! File system helpers used by the download, setup and self-update paths.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Ensures a directory exists, creating it and all parents if necessary.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the path exists but is
/// not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Lexically normalize a path by resolving `.` and `..` components.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                components.pop();
            }
            c => components.push(c),
        }
    }

    components.iter().collect()
}

/// Checks that `path` does not escape `base` once normalized.
///
/// Relative paths are resolved against `base`.
#[must_use]
pub fn is_safe_path(base: &Path, path: &Path) -> bool {
    let normalized_base = normalize_path(base);
    let normalized_path = if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    };

    normalized_path.starts_with(normalized_base)
}

/// Like [`is_safe_path`], but `base` itself does not count as inside.
#[must_use]
pub fn is_strictly_inside(base: &Path, path: &Path) -> bool {
    let resolved = if path.is_absolute() { path.to_path_buf() } else { base.join(path) };
    is_safe_path(base, &resolved) && normalize_path(&resolved) != normalize_path(base)
}

/// Whether the current process can create files in `dir`.
#[must_use]
pub fn is_dir_writable(dir: &Path) -> bool {
    tempfile::tempfile_in(dir).is_ok()
}

/// Delete a file, falling back to deletion on the next reboot if it is locked.
///
/// Missing files count as deleted. Returns `true` when the file is gone now,
/// `false` when deletion was deferred or failed entirely.
pub fn remove_file_or_schedule(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Deleted {}", path.display());
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!("Failed to delete {}: {}, scheduling removal on reboot", path.display(), e);
            schedule_delete_on_reboot(path);
            false
        }
    }
}

#[cfg(windows)]
fn schedule_delete_on_reboot(path: &Path) {
    if let Err(e) = crate::platform::windows::schedule_delete_on_reboot(path) {
        warn!("Failed to schedule {} for deletion on reboot: {}", path.display(), e);
    }
}

#[cfg(not(windows))]
fn schedule_delete_on_reboot(path: &Path) {
    debug!("Reboot-time deletion is unavailable, leaving {}", path.display());
}
