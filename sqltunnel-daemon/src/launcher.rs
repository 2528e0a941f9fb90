//! Detached spawning of the daemon process.

use std::ffi::OsString;
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{io_err, DaemonError};

/// Starts a program in the background and returns its pid.
///
/// The child must outlive the caller: it gets its own session, no terminal,
/// and both output streams appended to `log`.
pub trait ProcessLauncher: Send + Sync {
    fn spawn_detached(&self, program: &Path, args: &[OsString], log: File) -> Result<u32, DaemonError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedLauncher;

impl ProcessLauncher for DetachedLauncher {
    fn spawn_detached(&self, program: &Path, args: &[OsString], log: File) -> Result<u32, DaemonError> {
        let stderr = log.try_clone().map_err(|e| io_err(program, e))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr));
        detach(&mut command);

        let child = command.spawn().map_err(|source| DaemonError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;
        let pid = child.id();
        tracing::debug!(pid, program = %program.display(), "spawned detached daemon");
        // Dropping the handle does not kill or wait on the child.
        drop(child);
        Ok(pid)
    }
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: setsid is async-signal-safe and touches no parent state.
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn detach(_command: &mut Command) {}
