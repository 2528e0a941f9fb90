//! Secret lookup for `list --show-passwords`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::error::SecretError;
use crate::types::{EndpointSpec, InstanceName, SecretName};

/// Fetches the latest version of a named secret.
pub trait SecretClient: Send + Sync {
    fn fetch(&self, project: &str, secret: &SecretName) -> Result<String, SecretError>;
}

/// Shells out to `gcloud secrets versions access latest`.
#[derive(Debug, Clone)]
pub struct GcloudSecretClient {
    program: PathBuf,
}

impl GcloudSecretClient {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GcloudSecretClient {
    fn default() -> Self {
        Self::new("gcloud")
    }
}

impl SecretClient for GcloudSecretClient {
    fn fetch(&self, project: &str, secret: &SecretName) -> Result<String, SecretError> {
        let access_error = || SecretError::Access {
            secret: secret.0.clone(),
            project: project.to_string(),
        };

        let output = Command::new(&self.program)
            .args(["secrets", "versions", "access", "latest"])
            .arg(format!("--secret={secret}"))
            .arg(format!("--project={project}"))
            .output()
            .map_err(|_| access_error())?;
        if !output.status.success() {
            return Err(access_error());
        }

        let value = String::from_utf8(output.stdout).map_err(|_| SecretError::NotUtf8 {
            secret: secret.0.clone(),
            project: project.to_string(),
        })?;
        Ok(value.trim().to_string())
    }
}

/// Fetch every endpoint's secret in parallel, keyed by instance.
///
/// Fails with the first error observed; outstanding lookups are abandoned.
pub async fn fetch_secrets(
    client: Arc<dyn SecretClient>,
    proxies: &[EndpointSpec],
) -> Result<HashMap<InstanceName, String>, SecretError> {
    let mut tasks = JoinSet::new();
    for proxy in proxies {
        let client = Arc::clone(&client);
        let proxy = proxy.clone();
        tasks.spawn_blocking(move || {
            let value = client.fetch(proxy.project(), &proxy.secret)?;
            Ok::<_, SecretError>((proxy.instance, value))
        });
    }

    let mut values = HashMap::with_capacity(proxies.len());
    while let Some(joined) = tasks.join_next().await {
        let (instance, value) = joined.map_err(|e| SecretError::Join(e.to_string()))??;
        values.insert(instance, value);
    }
    Ok(values)
}
