//! Error types for sqltunnel-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the proxy configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML.
    #[error("invalid config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A field violated the schema or a uniqueness rule. `path` is the dotted
    /// field path, e.g. `proxies.1.port`, or `/` for the whole document.
    #[error("invalid config: {path}: {constraint}")]
    Invalid { path: String, constraint: String },

    #[error("embedded config schema is invalid: {0}")]
    Schema(String),

    /// `dirs::home_dir()` returned `None`, so no default config path exists.
    #[error("cannot determine home directory; set $HOME or pass --config")]
    HomeNotFound,
}

impl ConfigError {
    pub(crate) fn invalid(path: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            constraint: constraint.into(),
        }
    }
}

/// Credential preflight failures.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("No Google Cloud credentials found.\n\nRun: gcloud auth application-default login")]
    Missing,

    #[error("GOOGLE_APPLICATION_CREDENTIALS points to {path}, which does not exist.\n\nRun: gcloud auth application-default login")]
    ExplicitFileMissing { path: PathBuf },
}

/// Secret lookup failures.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Failed to access secret {secret:?} in project {project:?}.\n\nEnsure you have the Secret Manager Secret Accessor role.")]
    Access { secret: String, project: String },

    #[error("secret {secret:?} in project {project:?} is not valid UTF-8")]
    NotUtf8 { secret: String, project: String },

    #[error("secret lookup task failed: {0}")]
    Join(String),
}
