//! Liveness probes and signal delivery by pid.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::error::DaemonError;

/// `kill(pid, 0)` succeeds. Pids that do not fit a positive `pid_t` are never live;
/// 0 and negative values would address process groups.
pub fn is_running(pid: u32) -> bool {
    to_pid(pid).is_some_and(|pid| signal::kill(pid, None).is_ok())
}

pub fn send_signal(pid: u32, sig: Signal) -> Result<(), DaemonError> {
    let target = to_pid(pid).ok_or(DaemonError::Signal {
        pid,
        source: nix::errno::Errno::ESRCH,
    })?;
    signal::kill(target, sig).map_err(|source| DaemonError::Signal { pid, source })
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}
