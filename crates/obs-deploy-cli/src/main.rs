mod output;

use anyhow::Context;
use clap::Parser;
use obs_deploy_core::config::{DeployPlan, PlanFile, PlanOptions};
use obs_deploy_core::helm::Helm;
use obs_deploy_core::kubectl::Kubectl;
use obs_deploy_core::readiness::SystemClock;
use obs_deploy_core::reconcile::Reconciler;
use obs_deploy_core::runner::{self, SystemRunner};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "obs-deploy",
    about = "Install or upgrade the observability stack (metrics, dashboards, logs) and wait for it to become ready",
    version
)]
struct Cli {
    /// Target namespace [default: observability]
    #[arg(long, env = "OBS_NAMESPACE")]
    namespace: Option<String>,

    /// Release name for the metrics stack [default: prometheus]
    #[arg(long)]
    prom_release: Option<String>,

    /// Release name for the dashboard tool [default: grafana]
    #[arg(long)]
    grafana_release: Option<String>,

    /// Release name for the log stack [default: loki]
    #[arg(long)]
    loki_release: Option<String>,

    /// Directory holding <role>-values.yaml files [default: helm]
    #[arg(long)]
    values_dir: Option<PathBuf>,

    /// Directory of manifests applied after the releases [default: k8s]
    #[arg(long)]
    manifests_dir: Option<PathBuf>,

    /// Seconds to wait for releases and pods to become ready [default: 300]
    #[arg(long, env = "WAIT_TIMEOUT", value_name = "SECONDS")]
    wait_timeout: Option<u64>,

    /// YAML plan file; flags take precedence over its values
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// kubeconfig context passed to kubectl and helm
    #[arg(long)]
    kube_context: Option<String>,

    /// Print the run report as JSON
    #[arg(long, short = 'j')]
    json: bool,
}

impl Cli {
    fn plan_options(&self, slack_webhook: Option<String>) -> PlanOptions {
        PlanOptions {
            namespace: self.namespace.clone(),
            wait_timeout_secs: self.wait_timeout,
            kube_context: self.kube_context.clone(),
            values_dir: self.values_dir.clone(),
            manifests_dir: self.manifests_dir.clone(),
            metrics_release: self.prom_release.clone(),
            dashboards_release: self.grafana_release.clone(),
            logs_release: self.loki_release.clone(),
            slack_webhook,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli) {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let file = match &cli.config {
        Some(path) => PlanFile::load(path)
            .with_context(|| format!("failed to load plan file {}", path.display()))?,
        None => PlanFile::default(),
    };
    // read from the environment only so the value never shows up in argv
    let webhook = std::env::var("SLACK_WEBHOOK").ok();
    let plan = DeployPlan::resolve(cli.plan_options(webhook), file)
        .context("invalid configuration")?;

    runner::require_tools(&runner::REQUIRED_TOOLS)?;

    let kubectl = Kubectl::new(SystemRunner, plan.target.kube_context.clone());
    let helm = Helm::new(SystemRunner, plan.target.kube_context.clone());
    let report = Reconciler::new(&kubectl, &helm, &SystemClock)
        .run(&plan)
        .with_context(|| format!("deployment to namespace '{}' failed", plan.target.namespace))?;

    if cli.json {
        output::print_json(&report)?;
    } else {
        output::print_summary(&report);
    }
    Ok(())
}
