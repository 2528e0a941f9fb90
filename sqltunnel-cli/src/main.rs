//! sqltunnel — local TCP tunnels to remote databases, kept alive by a background daemon.
//!
//! # Usage
//!
//! ```text
//! sqltunnel [--config <path>] start
//! sqltunnel [--config <path>] stop
//! sqltunnel [--config <path>] list [--show-passwords] [--json]
//! sqltunnel logs [--lines <n>]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{list::ListArgs, logs::LogsArgs, start::StartArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "sqltunnel",
    version,
    about = "Run local TCP tunnels to remote databases in the background",
    long_about = None,
)]
struct Cli {
    /// Config file (default: ~/.config/sqltunnel/config.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the daemon, or restart it when the configuration changed.
    Start(StartArgs),

    /// Stop the running daemon.
    Stop,

    /// List configured tunnels and whether they are being served.
    List(ListArgs),

    /// Print recent daemon log lines.
    Logs(LogsArgs),
}

/// Paths every command resolves the same way.
pub struct Paths {
    pub config_path: PathBuf,
    pub state_dir: PathBuf,
}

impl Paths {
    fn resolve(config: Option<PathBuf>) -> Result<Self> {
        let config_path = match config {
            Some(path) => path,
            None => sqltunnel_core::config::default_config_path().context("could not resolve config path")?,
        };
        let state_dir = sqltunnel_daemon::paths::default_state_dir().context("could not resolve state directory")?;
        Ok(Self {
            config_path,
            state_dir,
        })
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = Paths::resolve(cli.config)?;
    match cli.command {
        Commands::Start(args) => args.run(&paths),
        Commands::Stop => commands::stop::run(&paths),
        Commands::List(args) => args.run(&paths),
        Commands::Logs(args) => args.run(&paths),
    }
}
