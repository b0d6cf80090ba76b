use std::path::PathBuf;

use serde::Serialize;

use crate::config::{DeploymentTarget, ReleaseRole, ReleaseSpec};
use crate::error::{DeployError, Result};
use crate::helm::PackageManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseAction {
    Installed,
    Upgraded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseOutcome {
    pub role: ReleaseRole,
    pub release: String,
    pub chart: String,
    pub action: ReleaseAction,
    /// Values file actually passed to the chart; `None` means chart defaults.
    pub values: Option<PathBuf>,
}

/// Converge one release to the desired chart and values.
///
/// Returns only after the package manager reports the release ready; a
/// failed operation is rolled back by the package manager and is fatal here.
pub fn install_or_upgrade(
    helm: &dyn PackageManager,
    spec: &ReleaseSpec,
    target: &DeploymentTarget,
) -> Result<ReleaseOutcome> {
    let wrap = |e: DeployError| DeployError::Release {
        release: spec.release_name.clone(),
        source: Box::new(e),
    };

    let values = match &spec.values_file {
        Some(path) if path.is_file() => Some(path.clone()),
        Some(path) => {
            tracing::warn!(
                release = %spec.release_name,
                path = %path.display(),
                "values file not found, using chart defaults"
            );
            None
        }
        None => None,
    };

    let previous = helm
        .release_status(&spec.release_name, &target.namespace)
        .map_err(wrap)?;
    let action = match previous {
        Some(_) => ReleaseAction::Upgraded,
        None => ReleaseAction::Installed,
    };

    tracing::info!(
        release = %spec.release_name,
        chart = %spec.chart_reference,
        namespace = %target.namespace,
        ?action,
        "applying release"
    );
    helm.upgrade_install(spec, values.as_deref(), target)
        .map_err(wrap)?;

    Ok(ReleaseOutcome {
        role: spec.role,
        release: spec.release_name.clone(),
        chart: spec.chart_reference.clone(),
        action,
        values,
    })
}

/// Install every release in plan order, stopping at the first failure.
pub fn install_all(
    helm: &dyn PackageManager,
    releases: &[ReleaseSpec],
    target: &DeploymentTarget,
) -> Result<Vec<ReleaseOutcome>> {
    releases
        .iter()
        .map(|spec| install_or_upgrade(helm, spec, target))
        .collect()
}
