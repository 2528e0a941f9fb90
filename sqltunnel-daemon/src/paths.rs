use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DaemonError;

pub const STATE_DIR_NAME: &str = ".sqltunnel";
pub const PID_FILE: &str = "daemon.pid";
pub const STATE_FILE: &str = "state.json";
pub const LOG_FILE: &str = "daemon.log";

/// Pause between spawning the daemon and probing its ports.
pub const STARTUP_GRACE: Duration = Duration::from_millis(500);
pub const READINESS_TIMEOUT: Duration = Duration::from_secs(2);

pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long to wait for the process to disappear after SIGKILL.
pub const KILL_CONFIRM_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on draining connections at shutdown; stays under [`STOP_TIMEOUT`]
/// so a graceful stop finishes before the stop protocol escalates.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(4);

pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

pub fn state_dir(home: &Path) -> PathBuf {
    home.join(STATE_DIR_NAME)
}

/// `~/.sqltunnel` (convenience — uses `dirs::home_dir()`).
pub fn default_state_dir() -> Result<PathBuf, DaemonError> {
    dirs::home_dir()
        .map(|home| state_dir(&home))
        .ok_or(DaemonError::HomeNotFound)
}

pub fn pid_path(state_dir: &Path) -> PathBuf {
    state_dir.join(PID_FILE)
}

pub fn state_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATE_FILE)
}

pub fn log_path(state_dir: &Path) -> PathBuf {
    state_dir.join(LOG_FILE)
}
