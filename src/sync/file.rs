//! Atomic JSON file operations for the state and summary artifacts.
//!
//! - Atomic writes: write to temp file, sync to disk, then rename
//! - Sorted-key JSON so persisted files diff cleanly between runs
//! - Fallback to a temp-directory location when the primary path is unwritable

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::sync::types::{SyncError, SyncResult};

/// Directory under the system temp dir used when primary paths are unwritable.
const FALLBACK_DIR: &str = "kbsync";

/// Write content to a file atomically.
///
/// This function:
/// 1. Writes content to a temporary file next to the target
/// 2. Calls `fsync` to ensure data is on disk
/// 3. Atomically renames the temp file to the target path
///
/// If any step fails, the original file (if any) remains untouched.
///
/// # Errors
///
/// Returns an error if any file operation fails.
pub fn atomic_write(path: &Path, content: &str) -> SyncResult<()> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes())?;
        writer.flush()?;
        // Sync to disk before rename
        writer.get_ref().sync_all()?;
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    Ok(())
}

/// Serialize a value as pretty JSON with every object's keys sorted.
///
/// Going through `serde_json::Value` sorts keys at every depth, independent
/// of struct field order.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn to_sorted_json<T: Serialize>(value: &T) -> SyncResult<String> {
    let value = serde_json::to_value(value)?;
    let mut json = serde_json::to_string_pretty(&value)?;
    json.push('\n');
    Ok(json)
}

/// Read and parse a JSON file.
///
/// Returns `Ok(None)` if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> SyncResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// The temp-directory counterpart of `path`.
#[must_use]
pub fn fallback_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("artifact.json"));
    std::env::temp_dir().join(FALLBACK_DIR).join(name)
}

/// Atomically write sorted JSON to `path`, falling back to a temp location.
///
/// If `path` cannot be written, a warning is logged and the content goes to
/// [`fallback_path`] instead. Returns the path actually written.
///
/// # Errors
///
/// Returns [`SyncError::Unwritable`] if neither location can be written.
pub fn write_json_with_fallback<T: Serialize>(path: &Path, value: &T) -> SyncResult<PathBuf> {
    let content = to_sorted_json(value)?;

    match atomic_write(path, &content) {
        Ok(()) => Ok(path.to_path_buf()),
        Err(primary_err) => {
            let fallback = fallback_path(path);
            if fallback == path {
                return Err(SyncError::Unwritable {
                    path: path.to_path_buf(),
                    message: primary_err.to_string(),
                });
            }
            warn!(
                path = %path.display(),
                fallback = %fallback.display(),
                error = %primary_err,
                "Primary location not writable, using fallback"
            );
            atomic_write(&fallback, &content).map_err(|e| SyncError::Unwritable {
                path: path.to_path_buf(),
                message: format!("{primary_err}; fallback {}: {e}", fallback.display()),
            })?;
            Ok(fallback)
        }
    }
}
