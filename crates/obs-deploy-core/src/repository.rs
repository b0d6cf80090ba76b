use crate::config::RepoSpec;
use crate::error::{DeployError, Result};
use crate::helm::PackageManager;

/// Register every repository, then refresh the indices.
///
/// A failed add never stops the run: "already exists" is informational and
/// anything else is a warning, since a later install against a missing repo
/// fails loudly on its own. The refresh is fatal.
pub fn register(helm: &dyn PackageManager, repos: &[RepoSpec]) -> Result<()> {
    for repo in repos {
        match helm.add_repo(&repo.name, &repo.url) {
            Ok(()) => tracing::info!(repo = %repo.name, url = %repo.url, "repository registered"),
            Err(e) if e.is_already_exists() => {
                tracing::info!(repo = %repo.name, "repository already registered")
            }
            Err(e) => tracing::warn!(repo = %repo.name, error = %e, "repository add failed"),
        }
    }

    helm.update_repos()
        .map_err(|e| DeployError::RepoRefresh(Box::new(e)))?;
    tracing::info!(count = repos.len(), "repository indices refreshed");
    Ok(())
}
