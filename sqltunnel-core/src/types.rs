//! Domain types shared by the daemon and the CLI.
//!
//! Every type here serializes to the same shape used in `state.json`, so a
//! snapshot written by one build can be compared against configuration loaded
//! by another.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Remote endpoint identifier, e.g. `my-project:us-central1:orders` or `db.internal:5432`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceName(pub String);

impl InstanceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for InstanceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for InstanceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Name of the secret holding the database password for an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SecretName(pub String);

impl SecretName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SecretName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecretName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// One remote-endpoint-to-local-port mapping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub instance: InstanceName,
    pub port: u16,
    pub secret: SecretName,
}

impl EndpointSpec {
    pub fn new(instance: impl Into<InstanceName>, port: u16, secret: impl Into<SecretName>) -> Self {
        Self {
            instance: instance.into(),
            port,
            secret: secret.into(),
        }
    }

    /// First `:`-separated segment of the identifier.
    pub fn project(&self) -> &str {
        self.instance.0.split(':').next().unwrap_or_default()
    }

    /// Third segment of a `project:region:name` identifier, or the whole identifier.
    pub fn short_name(&self) -> &str {
        self.instance.0.split(':').nth(2).unwrap_or(&self.instance.0)
    }
}

/// The endpoints a daemon should be serving, in configuration order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DesiredConfiguration {
    pub proxies: Vec<EndpointSpec>,
}

impl DesiredConfiguration {
    pub fn new(proxies: Vec<EndpointSpec>) -> Self {
        Self { proxies }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EndpointSpec> {
        self.proxies.iter()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    /// Multiset equality on `(instance, port, secret)`; order is ignored.
    ///
    /// Assumes neither side carries duplicate triples. The config provider
    /// rejects duplicate ports and instances before a configuration gets here.
    pub fn is_equivalent(&self, snapshot: &[EndpointSpec]) -> bool {
        if self.proxies.len() != snapshot.len() {
            return false;
        }
        let mut ours: Vec<&EndpointSpec> = self.proxies.iter().collect();
        let mut theirs: Vec<&EndpointSpec> = snapshot.iter().collect();
        ours.sort();
        theirs.sort();
        ours == theirs
    }
}

impl<'a> IntoIterator for &'a DesiredConfiguration {
    type Item = &'a EndpointSpec;
    type IntoIter = std::slice::Iter<'a, EndpointSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.proxies.iter()
    }
}

// ---------------------------------------------------------------------------
// Persisted daemon state
// ---------------------------------------------------------------------------

/// Snapshot written by a daemon once every forwarder has bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonState {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub proxies: Vec<EndpointSpec>,
}

impl DaemonState {
    pub fn new(pid: u32, config: &DesiredConfiguration) -> Self {
        Self {
            pid,
            started_at: Utc::now(),
            proxies: config.proxies.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
