//! `sqltunnel logs` — tail of the daemon log.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use sqltunnel_daemon::paths::log_path;

use crate::Paths;

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, short = 'n', default_value_t = 100)]
    pub lines: usize,
}

impl LogsArgs {
    pub fn run(self, paths: &Paths) -> Result<()> {
        let path = log_path(&paths.state_dir);
        if !path.exists() {
            println!("No daemon log yet: {}", path.display());
            return Ok(());
        }
        for line in tail(&path, self.lines)? {
            println!("{line}");
        }
        Ok(())
    }
}

fn tail(path: &Path, lines: usize) -> Result<VecDeque<String>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut tail = VecDeque::with_capacity(lines.min(1024));
    if lines == 0 {
        return Ok(tail);
    }
    for line in reader.lines() {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        if tail.len() == lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Ok(tail)
}
