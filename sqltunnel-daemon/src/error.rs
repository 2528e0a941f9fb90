use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use sqltunnel_core::types::InstanceName;
use sqltunnel_core::{ConfigError, CredentialError};

/// Error surface for the launcher, the daemon runtime and the stop protocol.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("failed to listen on 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("dialer error: {0}")]
    Dial(#[from] DialError),

    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("failed to spawn daemon from {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Failure to reach a remote endpoint. Recovered per connection.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("connect to {instance} failed: {source}")]
    Connect {
        instance: InstanceName,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {instance} timed out after {after:?}")]
    Timeout { instance: InstanceName, after: Duration },

    #[error("{instance} is not a host:port address; this dialer cannot reach connection names")]
    Unsupported { instance: InstanceName },
}

/// Why a persisted identity or state file could not be used.
///
/// Readers treat every variant as "no daemon state"; it is never fatal.
#[derive(Debug, Error)]
pub enum StateReadError {
    #[error("{path} does not exist")]
    Missing { path: PathBuf },

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is corrupt: {detail}")]
    Corrupt { path: PathBuf, detail: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
