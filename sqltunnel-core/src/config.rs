//! YAML configuration loading and validation.
//!
//! # File format
//!
//! ```yaml
//! proxies:
//!   - instance: "my-project:us-central1:orders"
//!     port: 5432
//!     secret: "orders-db-password"
//! ```
//!
//! Validation errors carry a dotted field path (`proxies.1.port`) so the CLI
//! can point at the offending entry. The daemon only ever sees a
//! [`DesiredConfiguration`] that passed every check here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;
use crate::types::{DesiredConfiguration, EndpointSpec};

/// Source of validated, deduplicated endpoint configuration.
pub trait ConfigProvider: Send + Sync {
    fn load(&self, path: &Path) -> Result<DesiredConfiguration, ConfigError>;
}

/// Reads the YAML file format above.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlConfigProvider;

impl ConfigProvider for YamlConfigProvider {
    fn load(&self, path: &Path) -> Result<DesiredConfiguration, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse(path, &contents)
    }
}

/// `~/.config/sqltunnel/config.yaml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
    Ok(default_config_path_at(&home))
}

/// `<home>/.config/sqltunnel/config.yaml` — pure, no I/O.
pub fn default_config_path_at(home: &Path) -> PathBuf {
    home.join(".config").join("sqltunnel").join("config.yaml")
}

// ---------------------------------------------------------------------------
// Schema validation
// ---------------------------------------------------------------------------

const SCHEMA: &str = include_str!("config.schema.json");

#[derive(Debug, Deserialize)]
struct RawConfig {
    proxies: Vec<RawProxy>,
}

#[derive(Debug, Deserialize)]
struct RawProxy {
    instance: String,
    port: u16,
    secret: String,
}

/// Parse and validate a config document. `source` is only used in error messages.
///
/// The document is checked against the embedded JSON Schema before it is
/// deserialized, then duplicate ports and instances are rejected.
pub fn parse(source: &Path, contents: &str) -> Result<DesiredConfiguration, ConfigError> {
    let document: Value = serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse {
        path: source.to_path_buf(),
        source: e,
    })?;
    validate_schema(&document)?;

    let raw: RawConfig =
        serde_json::from_value(document).map_err(|e| ConfigError::invalid("proxies", e.to_string()))?;
    let proxies: Vec<EndpointSpec> = raw
        .proxies
        .into_iter()
        .map(|p| EndpointSpec::new(p.instance, p.port, p.secret))
        .collect();
    validate_uniqueness(&proxies)?;

    Ok(DesiredConfiguration::new(proxies))
}

fn validate_schema(document: &Value) -> Result<(), ConfigError> {
    let schema: Value = serde_json::from_str(SCHEMA).map_err(|e| ConfigError::Schema(e.to_string()))?;
    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Schema(e.to_string()))?;

    validator
        .validate(document)
        .map_err(|error| ConfigError::invalid(dotted_path(&error.instance_path.to_string()), error.to_string()))
}

/// `/proxies/1/port` → `proxies.1.port`; the document root is `/`.
fn dotted_path(pointer: &str) -> String {
    let segments: Vec<&str> = pointer.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        segments.join(".")
    }
}

fn validate_uniqueness(proxies: &[EndpointSpec]) -> Result<(), ConfigError> {
    let mut ports: HashMap<u16, usize> = HashMap::new();
    let mut instances: HashMap<&str, usize> = HashMap::new();

    for (i, proxy) in proxies.iter().enumerate() {
        if let Some(prev) = ports.insert(proxy.port, i) {
            return Err(ConfigError::invalid(
                format!("proxies.{i}.port"),
                format!("duplicate port {} (same as proxies.{prev})", proxy.port),
            ));
        }
        if let Some(prev) = instances.insert(proxy.instance.as_str(), i) {
            return Err(ConfigError::invalid(
                format!("proxies.{i}.instance"),
                format!("duplicate instance '{}' (same as proxies.{prev})", proxy.instance),
            ));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
