//! On-disk record of the running daemon.
//!
//! ```text
//! ~/.sqltunnel/
//!   daemon.pid   plain-text pid, written first by the daemon
//!   state.json   DaemonState, written once every forwarder is bound
//!   daemon.log   daemon stdout/stderr (append-only)
//! ```
//!
//! The live daemon is the only writer. Every other invocation reads without
//! locking, so a missing, half-written or unparsable file is reported as a
//! [`StateReadError`] and callers treat it as "absent". Writes go through a
//! `.tmp` sibling and `rename`, so readers never observe a partial file.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use sqltunnel_core::DaemonState;

use crate::error::{io_err, DaemonError, StateReadError};
use crate::paths::{pid_path, state_path};
use crate::process;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

pub fn write_pid_at(state_dir: &Path, pid: u32) -> Result<(), DaemonError> {
    atomic_write(&pid_path(state_dir), pid.to_string().as_bytes())
}

pub fn read_pid_at(state_dir: &Path) -> Result<u32, StateReadError> {
    let path = pid_path(state_dir);
    let contents = read_to_string(&path)?;
    contents
        .trim()
        .parse::<u32>()
        .map_err(|e| StateReadError::Corrupt {
            path,
            detail: e.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

pub fn write_state_at(state_dir: &Path, state: &DaemonState) -> Result<(), DaemonError> {
    let json = serde_json::to_string_pretty(state)?;
    atomic_write(&state_path(state_dir), json.as_bytes())
}

pub fn read_state_at(state_dir: &Path) -> Result<DaemonState, StateReadError> {
    let path = state_path(state_dir);
    let contents = read_to_string(&path)?;
    serde_json::from_str(&contents).map_err(|e| StateReadError::Corrupt {
        path,
        detail: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

/// Remove identity and snapshot together. Missing files are fine.
pub fn remove_state_files_at(state_dir: &Path) {
    for path in [pid_path(state_dir), state_path(state_dir)] {
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove state file")
            }
        }
    }
}

/// Remove a stale identity (pid on record but no such process).
///
/// Returns `true` when files were removed. A live pid is left untouched.
pub fn clear_stale_at(state_dir: &Path) -> bool {
    match read_pid_at(state_dir) {
        Ok(pid) if process::is_running(pid) => false,
        Ok(pid) => {
            tracing::info!(pid, "removing stale daemon identity");
            remove_state_files_at(state_dir);
            true
        }
        Err(StateReadError::Missing { .. }) => false,
        Err(err) => {
            tracing::info!(error = %err, "removing unreadable daemon identity");
            remove_state_files_at(state_dir);
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_to_string(path: &Path) -> Result<String, StateReadError> {
    fs::read_to_string(path).map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            StateReadError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            StateReadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), DaemonError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("state path has no parent")));
    };
    fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}
