//! In-memory stand-ins for kubectl, helm, subprocesses and time.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::{DeploymentTarget, ReleaseSpec, SecretSpec};
use crate::error::{DeployError, Result};
use crate::helm::PackageManager;
use crate::kubectl::{ApplyReport, ClusterApi};
use crate::readiness::{Clock, PodReadiness};
use crate::runner::{render_command, CommandOutput, CommandRunner};

fn command_failed(command: &str, stderr: &str) -> DeployError {
    DeployError::CommandFailed {
        command: command.to_string(),
        status: 1,
        stderr: stderr.to_string(),
    }
}

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

/// Replays canned outputs in order and records every call.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: RefCell<VecDeque<CommandOutput>>,
    calls: RefCell<Vec<String>>,
    raw_args: RefCell<Vec<Vec<String>>>,
    stdins: RefCell<Vec<Option<String>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(self, status: i32, stdout: &str, stderr: &str) -> Self {
        self.responses.borrow_mut().push_back(CommandOutput {
            status,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        });
        self
    }

    pub fn ok(self, stdout: &str) -> Self {
        self.output(0, stdout, "")
    }

    pub fn fail(self, status: i32, stderr: &str) -> Self {
        self.output(status, "", stderr)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Arguments exactly as the child process would receive them.
    pub fn raw_args(&self) -> Vec<Vec<String>> {
        self.raw_args.borrow().clone()
    }

    pub fn stdins(&self) -> Vec<Option<String>> {
        self.stdins.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[String], stdin: Option<&[u8]>) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(render_command(program, args));
        self.raw_args.borrow_mut().push(args.to_vec());
        self.stdins
            .borrow_mut()
            .push(stdin.map(|b| String::from_utf8_lossy(b).into_owned()));
        Ok(self.responses.borrow_mut().pop_front().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// FakeCluster
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeCluster {
    namespaces: RefCell<BTreeSet<String>>,
    secrets: RefCell<BTreeMap<(String, String), String>>,
    resources: RefCell<BTreeSet<(String, String)>>,
    services: RefCell<HashMap<(String, String), Vec<String>>>,
    pod_script: RefCell<VecDeque<Result<Vec<PodReadiness>>>>,
    default_pods: RefCell<Vec<PodReadiness>>,
    namespace_check_error: RefCell<Option<String>>,
    create_namespace_error: RefCell<Option<String>>,
    calls: Cell<usize>,
    mutations: Cell<usize>,
    pod_polls: Cell<usize>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(self, namespace: &str) -> Self {
        self.namespaces.borrow_mut().insert(namespace.to_string());
        self
    }

    pub fn fail_namespace_check(&self, stderr: &str) {
        *self.namespace_check_error.borrow_mut() = Some(stderr.to_string());
    }

    pub fn fail_create_namespace(&self, stderr: &str) {
        *self.create_namespace_error.borrow_mut() = Some(stderr.to_string());
    }

    pub fn push_pods(&self, pods: Vec<PodReadiness>) {
        self.pod_script.borrow_mut().push_back(Ok(pods));
    }

    pub fn push_pod_error(&self, stderr: &str) {
        self.pod_script
            .borrow_mut()
            .push_back(Err(command_failed("kubectl get pods", stderr)));
    }

    pub fn set_default_pods(&self, pods: Vec<PodReadiness>) {
        *self.default_pods.borrow_mut() = pods;
    }

    pub fn add_service(&self, namespace: &str, release: &str, service: &str) {
        self.services
            .borrow_mut()
            .entry((namespace.to_string(), release.to_string()))
            .or_default()
            .push(service.to_string());
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.borrow().contains(namespace)
    }

    pub fn has_resource(&self, namespace: &str, name: &str) -> bool {
        self.resources
            .borrow()
            .contains(&(namespace.to_string(), name.to_string()))
    }

    pub fn resource_count(&self, namespace: &str) -> usize {
        self.resources
            .borrow()
            .iter()
            .filter(|(ns, _)| ns == namespace)
            .count()
    }

    pub fn secret_count(&self, namespace: &str) -> usize {
        self.secrets
            .borrow()
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .count()
    }

    pub fn secret_value(&self, namespace: &str, name: &str) -> Option<String> {
        self.secrets
            .borrow()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Every cluster call, read or write.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn mutations(&self) -> usize {
        self.mutations.get()
    }

    pub fn pod_polls(&self) -> usize {
        self.pod_polls.get()
    }

    /// Observable cluster state, for comparing runs.
    pub fn state_fingerprint(&self) -> String {
        format!(
            "{:?}|{:?}|{:?}",
            self.namespaces.borrow(),
            self.secrets.borrow(),
            self.resources.borrow()
        )
    }

    fn touch(&self) {
        self.calls.set(self.calls.get() + 1);
    }

    fn mutate(&self) {
        self.mutations.set(self.mutations.get() + 1);
    }
}

fn manifest_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            manifest_files(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|e| e == "yaml" || e == "yml" || e == "json")
        {
            out.push(path);
        }
    }
    Ok(())
}

impl ClusterApi for FakeCluster {
    fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        self.touch();
        if let Some(stderr) = self.namespace_check_error.borrow().as_deref() {
            return Err(command_failed("kubectl get namespace", stderr));
        }
        Ok(self.has_namespace(namespace))
    }

    fn create_namespace(&self, namespace: &str) -> Result<()> {
        self.touch();
        if let Some(stderr) = self.create_namespace_error.borrow().as_deref() {
            return Err(command_failed("kubectl create namespace", stderr));
        }
        self.mutate();
        self.namespaces.borrow_mut().insert(namespace.to_string());
        Ok(())
    }

    fn secret_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        self.touch();
        Ok(self.secret_value(namespace, name).is_some())
    }

    fn apply_secret(&self, namespace: &str, secret: &SecretSpec, value: &str) -> Result<()> {
        self.touch();
        self.mutate();
        self.secrets
            .borrow_mut()
            .insert((namespace.to_string(), secret.name.clone()), value.to_string());
        Ok(())
    }

    /// Files whose content contains `invalid` are rejected; every other file
    /// becomes one resource named after its stem.
    fn apply_manifests(&self, dir: &Path, namespace: &str) -> Result<ApplyReport> {
        self.touch();
        self.mutate();
        let unreadable = |path: &Path, source: std::io::Error| DeployError::ManifestRead {
            path: path.to_path_buf(),
            source,
        };
        let mut files = Vec::new();
        manifest_files(dir, &mut files).map_err(|e| unreadable(dir, e))?;

        let mut report = ApplyReport::default();
        for file in files {
            let content = std::fs::read_to_string(&file).map_err(|e| unreadable(&file, e))?;
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            if content.contains("invalid") {
                report.failures.push(format!(
                    "error: error parsing {}: invalid manifest",
                    file.display()
                ));
                continue;
            }
            let created = self
                .resources
                .borrow_mut()
                .insert((namespace.to_string(), stem.clone()));
            let verb = if created { "created" } else { "unchanged" };
            report.applied.push(format!("{stem} {verb}"));
        }
        Ok(report)
    }

    fn list_pods(&self, _namespace: &str) -> Result<Vec<PodReadiness>> {
        self.touch();
        self.pod_polls.set(self.pod_polls.get() + 1);
        match self.pod_script.borrow_mut().pop_front() {
            Some(next) => next,
            None => Ok(self.default_pods.borrow().clone()),
        }
    }

    fn release_services(&self, namespace: &str, release: &str) -> Result<Vec<String>> {
        self.touch();
        Ok(self
            .services
            .borrow()
            .get(&(namespace.to_string(), release.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// FakeHelm
// ---------------------------------------------------------------------------

struct FakeRelease {
    chart: String,
    revision: u32,
    values: Option<PathBuf>,
}

#[derive(Default)]
pub struct FakeHelm {
    repos: RefCell<BTreeMap<String, String>>,
    releases: RefCell<BTreeMap<String, FakeRelease>>,
    order: RefCell<Vec<String>>,
    add_error: RefCell<Option<String>>,
    update_error: RefCell<Option<String>>,
    release_errors: RefCell<HashMap<String, String>>,
    refreshes: Cell<usize>,
}

impl FakeHelm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_add_repo(&self, stderr: &str) {
        *self.add_error.borrow_mut() = Some(stderr.to_string());
    }

    pub fn fail_update(&self, stderr: &str) {
        *self.update_error.borrow_mut() = Some(stderr.to_string());
    }

    pub fn fail_release(&self, release: &str, stderr: &str) {
        self.release_errors
            .borrow_mut()
            .insert(release.to_string(), stderr.to_string());
    }

    pub fn has_repo(&self, name: &str) -> bool {
        self.repos.borrow().contains_key(name)
    }

    pub fn repo_count(&self) -> usize {
        self.repos.borrow().len()
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.get()
    }

    pub fn release_count(&self) -> usize {
        self.releases.borrow().len()
    }

    pub fn revision(&self, release: &str) -> Option<u32> {
        self.releases.borrow().get(release).map(|r| r.revision)
    }

    pub fn release_chart(&self, release: &str) -> Option<String> {
        self.releases.borrow().get(release).map(|r| r.chart.clone())
    }

    pub fn last_values(&self, release: &str) -> Option<Option<PathBuf>> {
        self.releases.borrow().get(release).map(|r| r.values.clone())
    }

    /// Release names in the order upgrade_install succeeded.
    pub fn install_order(&self) -> Vec<String> {
        self.order.borrow().clone()
    }
}

impl PackageManager for FakeHelm {
    fn add_repo(&self, name: &str, url: &str) -> Result<()> {
        if let Some(stderr) = self.add_error.borrow().as_deref() {
            return Err(command_failed("helm repo add", stderr));
        }
        self.repos
            .borrow_mut()
            .insert(name.to_string(), url.to_string());
        Ok(())
    }

    fn update_repos(&self) -> Result<()> {
        if let Some(stderr) = self.update_error.borrow().as_deref() {
            return Err(command_failed("helm repo update", stderr));
        }
        self.refreshes.set(self.refreshes.get() + 1);
        Ok(())
    }

    fn release_status(&self, release: &str, _namespace: &str) -> Result<Option<String>> {
        Ok(self
            .releases
            .borrow()
            .get(release)
            .map(|_| "deployed".to_string()))
    }

    fn upgrade_install(
        &self,
        spec: &ReleaseSpec,
        values: Option<&Path>,
        _target: &DeploymentTarget,
    ) -> Result<()> {
        // atomic: a failure leaves the previous state untouched
        if let Some(stderr) = self.release_errors.borrow().get(&spec.release_name) {
            return Err(command_failed("helm upgrade --install", stderr));
        }
        let mut releases = self.releases.borrow_mut();
        let revision = releases
            .get(&spec.release_name)
            .map(|r| r.revision + 1)
            .unwrap_or(1);
        releases.insert(
            spec.release_name.clone(),
            FakeRelease {
                chart: spec.chart_reference.clone(),
                revision,
                values: values.map(Path::to_path_buf),
            },
        );
        self.order.borrow_mut().push(spec.release_name.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeClock
// ---------------------------------------------------------------------------

/// A clock that only moves when slept on.
pub struct FakeClock {
    origin: Instant,
    offset: Cell<Duration>,
    sleeps: Cell<usize>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Cell::new(Duration::ZERO),
            sleeps: Cell::new(0),
        }
    }

    pub fn sleeps(&self) -> usize {
        self.sleeps.get()
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
        self.offset.set(self.offset.get() + duration);
    }
}
