//! Chart repository and release management through `helm`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::config::{DeploymentTarget, ReleaseSpec};
use crate::error::{DeployError, Result};
use crate::runner::CommandRunner;

pub trait PackageManager {
    fn add_repo(&self, name: &str, url: &str) -> Result<()>;
    fn update_repos(&self) -> Result<()>;
    /// Current status of `release` (e.g. `deployed`), or `None` when absent.
    fn release_status(&self, release: &str, namespace: &str) -> Result<Option<String>>;
    /// `upgrade --install` with rollback on failure, blocking until the
    /// release's own resources are ready. `values` is only passed when the
    /// caller has confirmed the file exists.
    fn upgrade_install(
        &self,
        spec: &ReleaseSpec,
        values: Option<&Path>,
        target: &DeploymentTarget,
    ) -> Result<()>;
}

pub struct Helm<R> {
    runner: R,
    kube_context: Option<String>,
}

impl<R: CommandRunner> Helm<R> {
    pub fn new(runner: R, kube_context: Option<String>) -> Self {
        Self {
            runner,
            kube_context,
        }
    }

    fn exec(&self, mut args: Vec<String>) -> Result<String> {
        if let Some(ctx) = &self.kube_context {
            args.push("--kube-context".to_string());
            args.push(ctx.clone());
        }
        let out = self.runner.run("helm", &args, None)?;
        Ok(out.into_success("helm", &args)?.stdout)
    }
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Helm's `--timeout` flag accepts Go durations.
fn go_duration(d: Duration) -> String {
    format!("{}s", d.as_secs().max(1))
}

#[derive(Debug, Deserialize)]
struct StatusDoc {
    info: StatusInfo,
}

#[derive(Debug, Deserialize)]
struct StatusInfo {
    status: String,
}

impl<R: CommandRunner> PackageManager for Helm<R> {
    fn add_repo(&self, name: &str, url: &str) -> Result<()> {
        self.exec(strings(&["repo", "add", name, url]))?;
        Ok(())
    }

    fn update_repos(&self) -> Result<()> {
        self.exec(strings(&["repo", "update"]))?;
        Ok(())
    }

    fn release_status(&self, release: &str, namespace: &str) -> Result<Option<String>> {
        match self.exec(strings(&["status", release, "-n", namespace, "-o", "json"])) {
            Ok(json) => {
                let doc: StatusDoc =
                    serde_json::from_str(&json).map_err(|source| DeployError::Parse {
                        what: "helm status",
                        source,
                    })?;
                Ok(Some(doc.info.status))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn upgrade_install(
        &self,
        spec: &ReleaseSpec,
        values: Option<&Path>,
        target: &DeploymentTarget,
    ) -> Result<()> {
        let mut args = strings(&[
            "upgrade",
            "--install",
            spec.release_name.as_str(),
            spec.chart_reference.as_str(),
            "--namespace",
            target.namespace.as_str(),
            "--atomic",
            "--wait",
            "--timeout",
            go_duration(target.wait_timeout).as_str(),
        ]);
        if let Some(version) = &spec.chart_version {
            args.push("--version".to_string());
            args.push(version.clone());
        }
        if let Some(path) = values {
            args.push("-f".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        self.exec(args)?;
        Ok(())
    }
}
