use std::path::PathBuf;
use thiserror::Error;

type BoxedSource = Box<DeployError>;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("required command not found on PATH: {0}")]
    MissingTool(String),

    #[error("invalid deployment plan: {0}")]
    InvalidPlan(String),

    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("cannot check namespace '{namespace}'")]
    NamespaceCheck {
        namespace: String,
        #[source]
        source: BoxedSource,
    },

    #[error("cannot create namespace '{namespace}'")]
    NamespaceCreate {
        namespace: String,
        #[source]
        source: BoxedSource,
    },

    #[error("failed to refresh chart repositories")]
    RepoRefresh(#[source] BoxedSource),

    #[error("release '{release}' failed")]
    Release {
        release: String,
        #[source]
        source: BoxedSource,
    },

    #[error("secret '{name}' could not be applied")]
    Secret {
        name: String,
        #[source]
        source: BoxedSource,
    },

    #[error("cannot read manifest directory {}", .path.display())]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} manifest error(s) in {}:\n  {}", .failures.len(), .path.display(), .failures.join("\n  "))]
    Manifest { path: PathBuf, failures: Vec<String> },

    #[error("cannot apply manifests in {}", .path.display())]
    ManifestApply {
        path: PathBuf,
        #[source]
        source: BoxedSource,
    },

    #[error("failed to parse {what} output: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot read plan file {}: {source}", .path.display())]
    PlanRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl DeployError {
    /// Stderr of a failed external command, if that is what this error is.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            DeployError::CommandFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// True when the external tool rejected the call because the object is
    /// already there. Namespace and repository steps treat this as success.
    pub fn is_already_exists(&self) -> bool {
        self.stderr()
            .map(|s| {
                let s = s.to_ascii_lowercase();
                s.contains("alreadyexists") || s.contains("already exists")
            })
            .unwrap_or(false)
    }

    pub fn is_not_found(&self) -> bool {
        self.stderr()
            .map(|s| {
                let s = s.to_ascii_lowercase();
                s.contains("notfound") || s.contains("not found")
            })
            .unwrap_or(false)
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
