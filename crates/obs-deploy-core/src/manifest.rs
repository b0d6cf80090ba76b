use std::path::Path;

use serde::Serialize;

use crate::config::ManifestSet;
use crate::error::{DeployError, Result};
use crate::kubectl::ClusterApi;

const MANIFEST_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ManifestOutcome {
    Applied { resources: Vec<String> },
    Skipped { reason: String },
}

/// Apply the manifest directory as one bundle into `namespace`.
///
/// A missing or empty directory is skipped with no cluster calls. Invalid
/// resources do not stop the others from being applied; their errors are
/// collected into a single [`DeployError::Manifest`].
pub fn apply(
    cluster: &dyn ClusterApi,
    manifests: &ManifestSet,
    namespace: &str,
) -> Result<ManifestOutcome> {
    let dir = manifests.source_directory.as_path();
    if !dir.exists() {
        tracing::info!(path = %dir.display(), "manifest directory not found, skipping");
        return Ok(ManifestOutcome::Skipped {
            reason: format!("{} does not exist", dir.display()),
        });
    }

    let files = count_manifest_files(dir).map_err(|source| DeployError::ManifestRead {
        path: dir.to_path_buf(),
        source,
    })?;
    if files == 0 {
        tracing::info!(path = %dir.display(), "manifest directory has no manifests, skipping");
        return Ok(ManifestOutcome::Skipped {
            reason: format!("{} contains no manifests", dir.display()),
        });
    }

    let report = cluster
        .apply_manifests(dir, namespace)
        .map_err(|e| DeployError::ManifestApply {
            path: dir.to_path_buf(),
            source: Box::new(e),
        })?;

    for resource in &report.applied {
        tracing::info!(resource = %resource, "manifest applied");
    }
    if !report.failures.is_empty() {
        return Err(DeployError::Manifest {
            path: dir.to_path_buf(),
            failures: report.failures,
        });
    }

    Ok(ManifestOutcome::Applied {
        resources: report.applied,
    })
}

/// Number of manifest files under `dir`, recursively.
pub fn count_manifest_files(dir: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            count += count_manifest_files(&path)?;
        } else if is_manifest(&path) {
            count += 1;
        }
    }
    Ok(count)
}

fn is_manifest(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| MANIFEST_EXTENSIONS.contains(&e))
}
