//! Application Default Credentials preflight.
//!
//! Mirrors the lookup order of the Google client libraries for the two file
//! based sources: an explicit `GOOGLE_APPLICATION_CREDENTIALS` path, then the
//! well-known file written by `gcloud auth application-default login`.

use std::path::{Path, PathBuf};

use crate::error::CredentialError;

pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const GCLOUD_CONFIG_ENV: &str = "CLOUDSDK_CONFIG";
pub const WELL_KNOWN_FILE: &str = "application_default_credentials.json";

/// Preflight check run before starting the daemon or revealing secrets.
pub trait CredentialChecker: Send + Sync {
    fn check(&self) -> Result<(), CredentialError>;
}

#[derive(Debug, Clone, Default)]
pub struct AdcCredentialChecker {
    explicit: Option<PathBuf>,
    well_known: Option<PathBuf>,
}

impl AdcCredentialChecker {
    pub fn new(explicit: Option<PathBuf>, well_known: Option<PathBuf>) -> Self {
        Self {
            explicit,
            well_known,
        }
    }

    /// Resolve both candidate paths from the process environment.
    pub fn from_env() -> Self {
        let explicit = std::env::var_os(CREDENTIALS_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let gcloud_dir = std::env::var_os(GCLOUD_CONFIG_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(default_gcloud_dir);
        Self::new(explicit, gcloud_dir.map(|dir| dir.join(WELL_KNOWN_FILE)))
    }
}

impl CredentialChecker for AdcCredentialChecker {
    fn check(&self) -> Result<(), CredentialError> {
        if let Some(path) = &self.explicit {
            return if path.is_file() {
                Ok(())
            } else {
                Err(CredentialError::ExplicitFileMissing { path: path.clone() })
            };
        }
        match &self.well_known {
            Some(path) if path.is_file() => Ok(()),
            _ => Err(CredentialError::Missing),
        }
    }
}

#[cfg(not(windows))]
fn default_gcloud_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| gcloud_dir_at(&home))
}

#[cfg(windows)]
fn default_gcloud_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|appdata| appdata.join("gcloud"))
}

/// `<home>/.config/gcloud` — gcloud ignores `XDG_CONFIG_HOME`.
pub fn gcloud_dir_at(home: &Path) -> PathBuf {
    home.join(".config").join("gcloud")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn well_known_file_satisfies_check() {
        let home = TempDir::new().unwrap();
        let dir = gcloud_dir_at(home.path());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(WELL_KNOWN_FILE), "{}").unwrap();

        let checker = AdcCredentialChecker::new(None, Some(dir.join(WELL_KNOWN_FILE)));
        checker.check().expect("credentials present");
    }

    #[test]
    fn missing_credentials_suggest_login() {
        let home = TempDir::new().unwrap();
        let checker =
            AdcCredentialChecker::new(None, Some(gcloud_dir_at(home.path()).join(WELL_KNOWN_FILE)));
        let err = checker.check().unwrap_err();
        assert!(matches!(err, CredentialError::Missing));
        assert!(err.to_string().contains("gcloud auth application-default login"));
    }

    #[test]
    fn explicit_path_wins_even_when_missing() {
        let home = TempDir::new().unwrap();
        let well_known = home.path().join(WELL_KNOWN_FILE);
        std::fs::write(&well_known, "{}").unwrap();

        let checker = AdcCredentialChecker::new(Some(home.path().join("nope.json")), Some(well_known));
        let err = checker.check().unwrap_err();
        assert!(matches!(err, CredentialError::ExplicitFileMissing { .. }), "got: {err}");
    }
}
