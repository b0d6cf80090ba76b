use serde::Serialize;

use crate::error::{DeployError, Result};
use crate::kubectl::ClusterApi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceOutcome {
    Created,
    AlreadyExists,
}

/// Make sure `namespace` exists. Existing is success; a create that loses a
/// race with another creator is also success.
pub fn ensure(cluster: &dyn ClusterApi, namespace: &str) -> Result<NamespaceOutcome> {
    let exists = cluster
        .namespace_exists(namespace)
        .map_err(|e| DeployError::NamespaceCheck {
            namespace: namespace.to_string(),
            source: Box::new(e),
        })?;
    if exists {
        tracing::info!(namespace = %namespace, "namespace already exists");
        return Ok(NamespaceOutcome::AlreadyExists);
    }

    match cluster.create_namespace(namespace) {
        Ok(()) => {
            tracing::info!(namespace = %namespace, "namespace created");
            Ok(NamespaceOutcome::Created)
        }
        Err(e) if e.is_already_exists() => {
            tracing::info!(namespace = %namespace, "namespace appeared concurrently");
            Ok(NamespaceOutcome::AlreadyExists)
        }
        Err(e) => Err(DeployError::NamespaceCreate {
            namespace: namespace.to_string(),
            source: Box::new(e),
        }),
    }
}
