//! The ordered reconciliation sequence.
//!
//! namespace → repositories → releases → secret → manifests → readiness →
//! service checks. Any fatal step returns immediately and leaves earlier
//! steps in place; readiness and service checks only add warnings.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::DeployPlan;
use crate::error::Result;
use crate::helm::PackageManager;
use crate::kubectl::ClusterApi;
use crate::manifest::{self, ManifestOutcome};
use crate::namespace::{self, NamespaceOutcome};
use crate::readiness::{self, Clock, ReadinessOutcome};
use crate::release::{self, ReleaseOutcome};
use crate::repository;
use crate::secret::{self, SecretOutcome};
use crate::verify;

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub namespace: String,
    pub namespace_outcome: NamespaceOutcome,
    pub repositories: Vec<String>,
    pub releases: Vec<ReleaseOutcome>,
    pub secret: SecretOutcome,
    pub manifests: ManifestOutcome,
    pub readiness: ReadinessOutcome,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct Reconciler<'a> {
    cluster: &'a dyn ClusterApi,
    helm: &'a dyn PackageManager,
    clock: &'a dyn Clock,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        cluster: &'a dyn ClusterApi,
        helm: &'a dyn PackageManager,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            cluster,
            helm,
            clock,
        }
    }

    pub fn run(&self, plan: &DeployPlan) -> Result<ReconcileReport> {
        let started_at = Utc::now();
        let ns = plan.target.namespace.as_str();
        tracing::info!(namespace = %ns, "reconciling observability stack");

        let namespace_outcome = namespace::ensure(self.cluster, ns)?;
        repository::register(self.helm, &plan.repositories)?;
        let releases = release::install_all(self.helm, &plan.releases, &plan.target)?;
        let secret = secret::provision(self.cluster, &plan.secret, ns)?;
        let manifests = manifest::apply(self.cluster, &plan.manifests, ns)?;

        let mut warnings = Vec::new();
        let readiness = readiness::wait(self.cluster, self.clock, ns, plan.target.wait_timeout);
        if let ReadinessOutcome::TimedOut { pending, .. } = &readiness {
            warnings.push(format!(
                "pods not ready after {}s: {}",
                plan.target.wait_timeout.as_secs(),
                if pending.is_empty() {
                    "pod status unknown, last poll failed".to_string()
                } else {
                    pending.join(", ")
                }
            ));
        }
        warnings.extend(verify::check_services(self.cluster, &plan.releases, ns));

        tracing::info!(namespace = %ns, warnings = warnings.len(), "reconciliation complete");
        Ok(ReconcileReport {
            namespace: ns.to_string(),
            namespace_outcome,
            repositories: plan.repositories.iter().map(|r| r.name.clone()).collect(),
            releases,
            secret,
            manifests,
            readiness,
            warnings,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
