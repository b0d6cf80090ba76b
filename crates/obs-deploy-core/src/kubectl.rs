//! Cluster control-plane access through `kubectl`.

use std::path::Path;

use serde::Deserialize;

use crate::config::SecretSpec;
use crate::error::{DeployError, Result};
use crate::readiness::PodReadiness;
use crate::runner::CommandRunner;

/// Result of applying a manifest bundle. kubectl keeps going past invalid
/// resources, so both lists can be non-empty at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<String>,
    pub failures: Vec<String>,
}

/// The cluster operations the reconciler needs.
pub trait ClusterApi {
    fn namespace_exists(&self, namespace: &str) -> Result<bool>;
    fn create_namespace(&self, namespace: &str) -> Result<()>;
    fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool>;
    /// Create or replace `secret` with `value` under its key.
    fn apply_secret(&self, namespace: &str, secret: &SecretSpec, value: &str) -> Result<()>;
    fn apply_manifests(&self, dir: &Path, namespace: &str) -> Result<ApplyReport>;
    fn list_pods(&self, namespace: &str) -> Result<Vec<PodReadiness>>;
    /// Names of Services carrying the Helm instance label for `release`.
    fn release_services(&self, namespace: &str, release: &str) -> Result<Vec<String>>;
}

pub struct Kubectl<R> {
    runner: R,
    context: Option<String>,
}

impl<R: CommandRunner> Kubectl<R> {
    pub fn new(runner: R, context: Option<String>) -> Self {
        Self { runner, context }
    }

    fn args(&self, rest: &[&str]) -> Vec<String> {
        let mut args = Vec::with_capacity(rest.len() + 2);
        if let Some(ctx) = &self.context {
            args.push("--context".to_string());
            args.push(ctx.clone());
        }
        args.extend(rest.iter().map(|s| s.to_string()));
        args
    }

    fn exec(&self, args: Vec<String>, stdin: Option<&[u8]>) -> Result<String> {
        let out = self.runner.run("kubectl", &args, stdin)?;
        Ok(out.into_success("kubectl", &args)?.stdout)
    }

    /// `kubectl get <kind> <name>`; NotFound maps to `false`.
    fn exists(&self, rest: &[&str]) -> Result<bool> {
        match self.exec(self.args(rest), None) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl<R: CommandRunner> ClusterApi for Kubectl<R> {
    fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        self.exists(&["get", "namespace", namespace, "-o", "name"])
    }

    fn create_namespace(&self, namespace: &str) -> Result<()> {
        self.exec(self.args(&["create", "namespace", namespace]), None)?;
        Ok(())
    }

    fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        self.exists(&["get", "secret", name, "-n", namespace, "-o", "name"])
    }

    fn apply_secret(&self, namespace: &str, secret: &SecretSpec, value: &str) -> Result<()> {
        let doc = secret_document(namespace, secret, value);
        self.exec(
            self.args(&["apply", "-n", namespace, "-f", "-"]),
            Some(doc.as_bytes()),
        )?;
        Ok(())
    }

    fn apply_manifests(&self, dir: &Path, namespace: &str) -> Result<ApplyReport> {
        let dir = dir.to_string_lossy();
        let args = self.args(&["apply", "-n", namespace, "-R", "-f", &*dir]);
        let out = self.runner.run("kubectl", &args, None)?;
        let mut report = parse_apply_output(&out.stdout, &out.stderr, out.success());
        if !out.success() && report.failures.is_empty() {
            report
                .failures
                .push(format!("kubectl apply exited with status {}", out.status));
        }
        Ok(report)
    }

    fn list_pods(&self, namespace: &str) -> Result<Vec<PodReadiness>> {
        let json = self.exec(self.args(&["get", "pods", "-n", namespace, "-o", "json"]), None)?;
        parse_pod_list(&json)
    }

    fn release_services(&self, namespace: &str, release: &str) -> Result<Vec<String>> {
        let selector = format!("app.kubernetes.io/instance={release}");
        let out = self.exec(
            self.args(&["get", "services", "-n", namespace, "-l", selector.as_str(), "-o", "name"]),
            None,
        )?;
        Ok(non_empty_lines(&out))
    }
}

fn non_empty_lines(s: &str) -> Vec<String> {
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split `kubectl apply` output into applied resources (stdout lines such as
/// `configmap/rules created`) and per-resource errors. Stderr only carries
/// errors when the apply failed; otherwise it is client chatter.
pub fn parse_apply_output(stdout: &str, stderr: &str, succeeded: bool) -> ApplyReport {
    let stderr = non_empty_lines(stderr);
    let failures = if succeeded {
        for line in &stderr {
            tracing::debug!(line = %line, "kubectl apply stderr");
        }
        Vec::new()
    } else {
        stderr
            .into_iter()
            .filter(|l| !l.starts_with("Warning:"))
            .collect()
    };
    ApplyReport {
        applied: non_empty_lines(stdout),
        failures,
    }
}

/// Opaque Secret with the value under `stringData`, fed to `kubectl apply`
/// on stdin so it never reaches a command line.
fn secret_document(namespace: &str, secret: &SecretSpec, value: &str) -> String {
    serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "type": "Opaque",
        "metadata": {
            "name": secret.name,
            "namespace": namespace,
        },
        "stringData": {
            secret.key.as_str(): value,
        },
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// Pod list JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: PodMeta,
    #[serde(default)]
    spec: PodSpec,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Deserialize)]
struct PodMeta {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatus {
    #[serde(default)]
    phase: Option<String>,
    #[serde(default)]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    #[serde(default)]
    ready: bool,
}

/// Parse `kubectl get pods -o json` into per-pod container readiness.
pub fn parse_pod_list(json: &str) -> Result<Vec<PodReadiness>> {
    let list: PodList = serde_json::from_str(json).map_err(|source| DeployError::Parse {
        what: "pod list",
        source,
    })?;
    Ok(list
        .items
        .into_iter()
        .map(|pod| PodReadiness {
            name: pod.metadata.name,
            ready: pod
                .status
                .container_statuses
                .iter()
                .filter(|c| c.ready)
                .count(),
            total: pod.spec.containers.len(),
            phase: pod.status.phase,
        })
        .collect())
}
