use serde::Serialize;

use crate::config::SecretSpec;
use crate::error::{DeployError, Result};
use crate::kubectl::ClusterApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretOutcome {
    Created,
    Updated,
    Skipped,
}

/// Upsert the webhook secret when a value is present; otherwise touch nothing.
pub fn provision(
    cluster: &dyn ClusterApi,
    secret: &SecretSpec,
    namespace: &str,
) -> Result<SecretOutcome> {
    let Some(value) = secret.value.as_deref() else {
        tracing::info!(secret = %secret.name, "no webhook value provided, skipping secret");
        return Ok(SecretOutcome::Skipped);
    };

    let wrap = |e: DeployError| DeployError::Secret {
        name: secret.name.clone(),
        source: Box::new(e),
    };
    let existed = cluster.secret_exists(namespace, &secret.name).map_err(wrap)?;
    cluster
        .apply_secret(namespace, secret, value)
        .map_err(wrap)?;

    let outcome = if existed {
        SecretOutcome::Updated
    } else {
        SecretOutcome::Created
    };
    tracing::info!(secret = %secret.name, namespace = %namespace, ?outcome, "secret applied");
    Ok(outcome)
}
