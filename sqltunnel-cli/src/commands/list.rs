//! `sqltunnel list` — configured tunnels and their status.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use sqltunnel_core::{
    fetch_secrets, AdcCredentialChecker, ConfigProvider, CredentialChecker, DaemonState, DesiredConfiguration,
    EndpointSpec, GcloudSecretClient, InstanceName, YamlConfigProvider,
};
use sqltunnel_daemon::running_state;

use crate::Paths;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Fetch and show each database password.
    #[arg(long)]
    pub show_passwords: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ListRow {
    instance: String,
    port: u16,
    project: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<String>,
}

#[derive(Tabled)]
struct TableRow {
    #[tabled(rename = "INSTANCE")]
    instance: String,
    #[tabled(rename = "PORT")]
    port: u16,
    #[tabled(rename = "PROJECT")]
    project: String,
    #[tabled(rename = "STATUS")]
    status: String,
}

#[derive(Tabled)]
struct TableRowWithPassword {
    #[tabled(rename = "INSTANCE")]
    instance: String,
    #[tabled(rename = "PORT")]
    port: u16,
    #[tabled(rename = "PROJECT")]
    project: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PASSWORD")]
    password: String,
}

impl ListArgs {
    pub fn run(self, paths: &Paths) -> Result<()> {
        let config = YamlConfigProvider.load(&paths.config_path)?;
        let running = running_state(&paths.state_dir);

        let passwords = if self.show_passwords {
            AdcCredentialChecker::from_env().check()?;
            Some(lookup_passwords(&config)?)
        } else {
            None
        };

        let rows = build_rows(&config, running.as_ref(), passwords.as_ref());
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&rows).context("failed to serialize list JSON")?
            );
            return Ok(());
        }

        print_daemon_line(running.as_ref());
        print_table(rows, self.show_passwords);
        Ok(())
    }
}

fn lookup_passwords(config: &DesiredConfiguration) -> Result<HashMap<InstanceName, String>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let client = Arc::new(GcloudSecretClient::default());
    let passwords = runtime.block_on(fetch_secrets(client, &config.proxies))?;
    Ok(passwords)
}

fn build_rows(
    config: &DesiredConfiguration,
    running: Option<&DaemonState>,
    passwords: Option<&HashMap<InstanceName, String>>,
) -> Vec<ListRow> {
    config
        .iter()
        .map(|spec| ListRow {
            instance: spec.instance.to_string(),
            port: spec.port,
            project: spec.project().to_string(),
            status: if is_served(spec, running) { "running" } else { "stopped" },
            password: passwords.map(|p| p.get(&spec.instance).cloned().unwrap_or_default()),
        })
        .collect()
}

/// The live daemon's snapshot carries this instance on this port.
fn is_served(spec: &EndpointSpec, running: Option<&DaemonState>) -> bool {
    running.is_some_and(|state| {
        state
            .proxies
            .iter()
            .any(|served| served.instance == spec.instance && served.port == spec.port)
    })
}

fn print_daemon_line(running: Option<&DaemonState>) {
    match running {
        Some(state) => println!(
            "Daemon {} (pid {}, since {})",
            "running".green(),
            state.pid,
            state.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        ),
        None => println!("Daemon {}", "stopped".bright_black()),
    }
}

fn status_label(status: &str) -> String {
    match status {
        "running" => status.green().to_string(),
        _ => status.bright_black().to_string(),
    }
}

fn print_table(rows: Vec<ListRow>, show_passwords: bool) {
    if rows.is_empty() {
        println!("No tunnels configured.");
        return;
    }

    let mut table = if show_passwords {
        Table::new(rows.into_iter().map(|row| TableRowWithPassword {
            instance: row.instance,
            port: row.port,
            project: row.project,
            status: status_label(row.status),
            password: row.password.unwrap_or_default(),
        }))
    } else {
        Table::new(rows.into_iter().map(|row| TableRow {
            instance: row.instance,
            port: row.port,
            project: row.project,
            status: status_label(row.status),
        }))
    };
    table.with(Style::rounded());
    println!("{table}");
}
