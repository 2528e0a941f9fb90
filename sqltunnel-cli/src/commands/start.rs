//! `sqltunnel start` — reconcile the daemon with the config file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use sqltunnel_daemon::{StartOutcome, StartReport, Supervisor};

use crate::Paths;

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Run as the background daemon (set by `start` itself).
    #[arg(long, hide = true)]
    pub daemon: bool,
}

impl StartArgs {
    pub fn run(self, paths: &Paths) -> Result<()> {
        let config_path = absolute(&paths.config_path)?;
        let supervisor = Supervisor::new(&paths.state_dir, config_path);

        if self.daemon {
            return supervisor.run_daemon().context("daemon exited with error");
        }

        let program = std::env::current_exe().context("could not locate the sqltunnel executable")?;
        let report = supervisor.start(&program)?;
        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &StartReport) {
    match report.outcome {
        StartOutcome::AlreadyRunning { pid } => {
            println!("Daemon already running (pid {pid})");
            return;
        }
        StartOutcome::Started {
            replaced: Some(old), ..
        } => println!("Config changed, restarted daemon (was pid {old})"),
        StartOutcome::Started { .. } => {}
    }

    for endpoint in &report.readiness {
        let name = format!("{}:", endpoint.spec.short_name());
        if endpoint.ready {
            println!("{name:<8} {} on port {}", "started".green(), endpoint.spec.port);
        } else {
            println!("{name:<8} {} on port {}", "failed to start".red(), endpoint.spec.port);
        }
    }
}

/// The daemon is re-executed with this path, so it must not depend on our cwd.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("could not determine current directory")?;
    Ok(cwd.join(path))
}
