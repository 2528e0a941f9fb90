//! `sqltunnel stop`.

use anyhow::Result;
use colored::Colorize;

use sqltunnel_daemon::{stop_daemon_at, StopOutcome, StopPolicy};

use crate::Paths;

pub fn run(paths: &Paths) -> Result<()> {
    match stop_daemon_at(&paths.state_dir, StopPolicy::default()) {
        StopOutcome::NotRunning => println!("No daemon is running."),
        StopOutcome::Stopped { pid, forced: false } => println!("Daemon stopped (pid {pid})."),
        StopOutcome::Stopped { pid, forced: true } => {
            println!("Daemon stopped (pid {pid}, {}).", "killed after timeout".yellow())
        }
    }
    Ok(())
}
