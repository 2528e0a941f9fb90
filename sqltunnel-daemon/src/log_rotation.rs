//! Size-based rotation of `daemon.log`.
//!
//! The daemon's stdout/stderr are redirected to a file it never reopens, so
//! rotation happens in the launcher, right before a new daemon is spawned:
//! `daemon.log → daemon.log.1 → … → daemon.log.5`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::log_path;

pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_ROTATED_FILES: usize = 5;

/// Shift `path` into `path.1` when it has reached `max_bytes`, keeping at most
/// `max_files` numbered copies. Returns whether anything moved.
///
/// A missing log is not an error.
pub fn rotate_if_needed(path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes || max_files == 0 {
        return Ok(false);
    }

    remove_if_present(&numbered_path(path, max_files))?;
    for n in (1..max_files).rev() {
        let from = numbered_path(path, n);
        if from.exists() {
            fs::rename(&from, numbered_path(path, n + 1))?;
        }
    }
    fs::rename(path, numbered_path(path, 1))?;
    Ok(true)
}

/// Rotate the daemon log under `state_dir`. Failures are logged, never fatal.
pub fn rotate_daemon_log(state_dir: &Path) {
    let path = log_path(state_dir);
    match rotate_if_needed(&path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
        Ok(true) => tracing::info!(path = %path.display(), "rotated daemon log"),
        Ok(false) => {}
        Err(err) => tracing::warn!(path = %path.display(), error = %err, "daemon log rotation failed"),
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let mut name = base.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{n}"));
    base.with_file_name(name)
}
