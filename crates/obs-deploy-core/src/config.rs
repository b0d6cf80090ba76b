use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "observability";
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_VALUES_DIR: &str = "helm";
pub const DEFAULT_MANIFESTS_DIR: &str = "k8s";
pub const DEFAULT_SECRET_NAME: &str = "alertmanager-slack";
pub const SECRET_KEY: &str = "slack_url";

// ---------------------------------------------------------------------------
// DeploymentTarget
// ---------------------------------------------------------------------------

/// Where the stack goes and how long the run may wait for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentTarget {
    pub namespace: String,
    pub wait_timeout: Duration,
    pub kube_context: Option<String>,
}

impl DeploymentTarget {
    pub fn new(namespace: impl Into<String>, wait_timeout: Duration) -> Self {
        Self {
            namespace: namespace.into(),
            wait_timeout,
            kube_context: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_dns_label(&self.namespace) {
            return Err(DeployError::InvalidPlan(format!(
                "namespace '{}' must be a non-empty lowercase DNS label",
                self.namespace
            )));
        }
        if self.wait_timeout.is_zero() {
            return Err(DeployError::InvalidPlan(
                "wait timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// RFC 1123 label: 1-63 chars of `[a-z0-9-]`, alphanumeric at both ends.
fn is_dns_label(s: &str) -> bool {
    let bytes = s.as_bytes();
    let edge_ok = |b: Option<&u8>| b.is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    !s.is_empty()
        && s.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && edge_ok(bytes.first())
        && edge_ok(bytes.last())
}

// ---------------------------------------------------------------------------
// RepoSpec / ReleaseSpec
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoSpec {
    pub name: String,
    pub url: String,
}

impl RepoSpec {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

pub fn default_repositories() -> Vec<RepoSpec> {
    vec![
        RepoSpec::new(
            "prometheus-community",
            "https://prometheus-community.github.io/helm-charts",
        ),
        RepoSpec::new("grafana", "https://grafana.github.io/helm-charts"),
    ]
}

/// The three releases of the stack, in install order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseRole {
    Metrics,
    Dashboards,
    Logs,
}

impl ReleaseRole {
    pub const ORDER: [ReleaseRole; 3] = [
        ReleaseRole::Metrics,
        ReleaseRole::Dashboards,
        ReleaseRole::Logs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseRole::Metrics => "metrics",
            ReleaseRole::Dashboards => "dashboards",
            ReleaseRole::Logs => "logs",
        }
    }

    pub fn default_release_name(&self) -> &'static str {
        match self {
            ReleaseRole::Metrics => "prometheus",
            ReleaseRole::Dashboards => "grafana",
            ReleaseRole::Logs => "loki",
        }
    }

    pub fn default_chart(&self) -> &'static str {
        match self {
            ReleaseRole::Metrics => "prometheus-community/kube-prometheus-stack",
            ReleaseRole::Dashboards => "grafana/grafana",
            ReleaseRole::Logs => "grafana/loki-stack",
        }
    }

    pub fn default_values_file(&self) -> &'static str {
        match self {
            ReleaseRole::Metrics => "prometheus-values.yaml",
            ReleaseRole::Dashboards => "grafana-values.yaml",
            ReleaseRole::Logs => "loki-values.yaml",
        }
    }
}

impl std::fmt::Display for ReleaseRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseSpec {
    pub role: ReleaseRole,
    pub release_name: String,
    pub chart_reference: String,
    pub chart_version: Option<String>,
    pub values_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// SecretSpec / ManifestSet
// ---------------------------------------------------------------------------

/// The alert-routing webhook secret. `value` comes from the environment and
/// is never serialized.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct SecretSpec {
    pub name: String,
    pub key: String,
    #[serde(skip)]
    pub value: Option<String>,
}

impl std::fmt::Debug for SecretSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretSpec")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("value", &self.value.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestSet {
    pub source_directory: PathBuf,
}

// ---------------------------------------------------------------------------
// PlanFile: optional YAML overrides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseOverride {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub chart: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub values: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseOverrides {
    #[serde(default)]
    pub metrics: ReleaseOverride,
    #[serde(default)]
    pub dashboards: ReleaseOverride,
    #[serde(default)]
    pub logs: ReleaseOverride,
}

impl ReleaseOverrides {
    fn get(&self, role: ReleaseRole) -> &ReleaseOverride {
        match role {
            ReleaseRole::Metrics => &self.metrics,
            ReleaseRole::Dashboards => &self.dashboards,
            ReleaseRole::Logs => &self.logs,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretOverride {
    #[serde(default)]
    pub name: Option<String>,
}

/// On-disk plan file. Every field is optional; unset fields fall back to
/// built-in defaults and are overridden by command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanFile {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub wait_timeout_secs: Option<u64>,
    #[serde(default)]
    pub kube_context: Option<String>,
    #[serde(default)]
    pub values_dir: Option<PathBuf>,
    #[serde(default)]
    pub manifests_dir: Option<PathBuf>,
    #[serde(default)]
    pub repositories: Option<Vec<RepoSpec>>,
    #[serde(default)]
    pub releases: ReleaseOverrides,
    #[serde(default)]
    pub secret: SecretOverride,
}

impl PlanFile {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|source| DeployError::PlanRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&data)?)
    }
}

// ---------------------------------------------------------------------------
// PlanOptions → DeployPlan
// ---------------------------------------------------------------------------

/// Values supplied on the command line or through the environment.
/// `None` means "not given"; the plan file or default applies.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub namespace: Option<String>,
    pub wait_timeout_secs: Option<u64>,
    pub kube_context: Option<String>,
    pub values_dir: Option<PathBuf>,
    pub manifests_dir: Option<PathBuf>,
    pub metrics_release: Option<String>,
    pub dashboards_release: Option<String>,
    pub logs_release: Option<String>,
    pub slack_webhook: Option<String>,
}

impl PlanOptions {
    fn release_name(&self, role: ReleaseRole) -> Option<&String> {
        match role {
            ReleaseRole::Metrics => self.metrics_release.as_ref(),
            ReleaseRole::Dashboards => self.dashboards_release.as_ref(),
            ReleaseRole::Logs => self.logs_release.as_ref(),
        }
    }
}

/// Everything one reconciliation run needs. Built once, then borrowed
/// read-only by every step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployPlan {
    pub target: DeploymentTarget,
    pub repositories: Vec<RepoSpec>,
    pub releases: Vec<ReleaseSpec>,
    pub secret: SecretSpec,
    pub manifests: ManifestSet,
}

impl DeployPlan {
    /// Plan with built-in defaults only.
    pub fn defaults() -> Result<Self> {
        Self::resolve(PlanOptions::default(), PlanFile::default())
    }

    /// Merge flags over the plan file over defaults, then validate.
    pub fn resolve(opts: PlanOptions, file: PlanFile) -> Result<Self> {
        let namespace = opts
            .namespace
            .clone()
            .or(file.namespace)
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let timeout_secs = opts
            .wait_timeout_secs
            .or(file.wait_timeout_secs)
            .unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS);
        let values_dir = opts
            .values_dir
            .clone()
            .or(file.values_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VALUES_DIR));
        let manifests_dir = opts
            .manifests_dir
            .clone()
            .or(file.manifests_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFESTS_DIR));

        let target = DeploymentTarget {
            namespace,
            wait_timeout: Duration::from_secs(timeout_secs),
            kube_context: opts.kube_context.clone().or(file.kube_context),
        };

        let releases = ReleaseRole::ORDER
            .iter()
            .map(|&role| {
                let over = file.releases.get(role);
                let values = over
                    .values
                    .clone()
                    .unwrap_or_else(|| values_dir.join(role.default_values_file()));
                ReleaseSpec {
                    role,
                    release_name: opts
                        .release_name(role)
                        .cloned()
                        .or_else(|| over.name.clone())
                        .unwrap_or_else(|| role.default_release_name().to_string()),
                    chart_reference: over
                        .chart
                        .clone()
                        .unwrap_or_else(|| role.default_chart().to_string()),
                    chart_version: over.version.clone(),
                    values_file: Some(values),
                }
            })
            .collect();

        let plan = DeployPlan {
            target,
            repositories: file.repositories.unwrap_or_else(default_repositories),
            releases,
            secret: SecretSpec {
                name: file
                    .secret
                    .name
                    .unwrap_or_else(|| DEFAULT_SECRET_NAME.to_string()),
                key: SECRET_KEY.to_string(),
                value: opts.slack_webhook.filter(|v| !v.trim().is_empty()),
            },
            manifests: ManifestSet {
                source_directory: manifests_dir,
            },
        };
        plan.validate()?;
        Ok(plan)
    }

    pub fn validate(&self) -> Result<()> {
        self.target.validate()?;

        let mut seen = HashSet::new();
        for release in &self.releases {
            if release.release_name.trim().is_empty() {
                return Err(DeployError::InvalidPlan(format!(
                    "{} release name must not be empty",
                    release.role
                )));
            }
            if release.chart_reference.trim().is_empty() {
                return Err(DeployError::InvalidPlan(format!(
                    "{} chart reference must not be empty",
                    release.role
                )));
            }
            if !seen.insert(release.release_name.as_str()) {
                return Err(DeployError::InvalidPlan(format!(
                    "release name '{}' is used more than once",
                    release.release_name
                )));
            }
        }

        for repo in &self.repositories {
            if repo.name.trim().is_empty() || repo.url.trim().is_empty() {
                return Err(DeployError::InvalidPlan(
                    "repository entries need both a name and a url".into(),
                ));
            }
        }

        if self.secret.name.trim().is_empty() {
            return Err(DeployError::InvalidPlan("secret name must not be empty".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
