//! sqltunnel core library — endpoint types, config loading, collaborator seams.
//!
//! Public API surface:
//! - [`types`] — [`EndpointSpec`], [`DesiredConfiguration`], [`DaemonState`]
//! - [`config`] — [`ConfigProvider`] and the YAML-backed provider
//! - [`credentials`] — credential preflight
//! - [`secrets`] — secret lookup and parallel fan-out
//! - [`error`] — error enums for the above

pub mod config;
pub mod credentials;
pub mod error;
pub mod secrets;
pub mod types;

pub use config::{ConfigProvider, YamlConfigProvider};
pub use credentials::{AdcCredentialChecker, CredentialChecker};
pub use error::{ConfigError, CredentialError, SecretError};
pub use secrets::{fetch_secrets, GcloudSecretClient, SecretClient};
pub use types::{DaemonState, DesiredConfiguration, EndpointSpec, InstanceName, SecretName};
