//! Keep / restart / start decision for `sqltunnel start`.
//!
//! This is the only place that decides whether a running daemon is still
//! serving the wanted configuration. It reads the state directory and probes
//! liveness; it never writes.

use std::path::Path;

use sqltunnel_core::DesiredConfiguration;

use crate::process;
use crate::state::{read_pid_at, read_state_at};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No live daemon on record.
    Start,
    /// A live daemon already serves an equivalent configuration.
    Keep,
    /// A live daemon exists but its snapshot is missing, unreadable or different.
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub decision: Decision,
    /// Recorded pid for `Keep`/`Restart`; 0 for `Start`.
    pub pid: u32,
}

pub fn decide(desired: &DesiredConfiguration, state_dir: &Path) -> Reconciliation {
    decide_with(desired, state_dir, process::is_running)
}

/// [`decide`] with an injectable liveness probe.
pub fn decide_with(
    desired: &DesiredConfiguration,
    state_dir: &Path,
    is_alive: impl Fn(u32) -> bool,
) -> Reconciliation {
    let pid = match read_pid_at(state_dir) {
        Ok(pid) if is_alive(pid) => pid,
        _ => {
            return Reconciliation {
                decision: Decision::Start,
                pid: 0,
            }
        }
    };

    let decision = match read_state_at(state_dir) {
        Ok(state) if desired.is_equivalent(&state.proxies) => Decision::Keep,
        Ok(_) => {
            tracing::debug!(pid, "running daemon serves a different configuration");
            Decision::Restart
        }
        Err(err) => {
            tracing::debug!(pid, error = %err, "running daemon has no usable state snapshot");
            Decision::Restart
        }
    };
    Reconciliation { decision, pid }
}
