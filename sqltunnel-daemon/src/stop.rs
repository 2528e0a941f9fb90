//! Stop protocol: SIGTERM, poll, escalate to SIGKILL, clean up.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;

use crate::paths::{KILL_CONFIRM_TIMEOUT, STOP_POLL_INTERVAL, STOP_TIMEOUT};
use crate::process::{is_running, send_signal};
use crate::state::{read_pid_at, remove_state_files_at};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            timeout: STOP_TIMEOUT,
            poll_interval: STOP_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No live daemon on record. Leftover files were removed.
    NotRunning,
    /// The daemon is gone; `forced` when SIGKILL was needed.
    Stopped { pid: u32, forced: bool },
}

/// Stop the daemon recorded under `state_dir`. Never fails: a stopped daemon
/// and a daemon that could not be signalled both end with the files removed.
pub fn stop_daemon_at(state_dir: &Path, policy: StopPolicy) -> StopOutcome {
    let pid = match read_pid_at(state_dir) {
        Ok(pid) if is_running(pid) => pid,
        _ => {
            remove_state_files_at(state_dir);
            return StopOutcome::NotRunning;
        }
    };

    let forced = terminate(pid, policy);
    remove_state_files_at(state_dir);
    StopOutcome::Stopped { pid, forced }
}

/// Deliver SIGTERM and wait up to `policy.timeout`; SIGKILL if still alive,
/// then wait for the process to disappear.
///
/// Returns whether SIGKILL was sent.
pub fn terminate(pid: u32, policy: StopPolicy) -> bool {
    if let Err(err) = send_signal(pid, Signal::SIGTERM) {
        tracing::debug!(pid, error = %err, "SIGTERM not delivered; treating daemon as gone");
        return false;
    }

    if wait_for_exit(pid, policy.timeout, policy.poll_interval) {
        return false;
    }

    tracing::warn!(pid, timeout = ?policy.timeout, "daemon ignored SIGTERM, sending SIGKILL");
    if let Err(err) = send_signal(pid, Signal::SIGKILL) {
        tracing::debug!(pid, error = %err, "SIGKILL not delivered");
    }
    if !wait_for_exit(pid, KILL_CONFIRM_TIMEOUT, policy.poll_interval) {
        tracing::error!(pid, timeout = ?KILL_CONFIRM_TIMEOUT, "daemon still alive after SIGKILL");
    }
    true
}

fn wait_for_exit(pid: u32, timeout: Duration, poll: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !is_running(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(poll);
    }
}
