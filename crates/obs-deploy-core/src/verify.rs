use crate::config::ReleaseSpec;
use crate::kubectl::ClusterApi;

/// Check that each release exposes at least one Service. Problems come back
/// as warnings; nothing here fails the run.
pub fn check_services(
    cluster: &dyn ClusterApi,
    releases: &[ReleaseSpec],
    namespace: &str,
) -> Vec<String> {
    let mut warnings = Vec::new();
    for release in releases {
        match cluster.release_services(namespace, &release.release_name) {
            Ok(services) if services.is_empty() => {
                tracing::warn!(release = %release.release_name, "no service found for release");
                warnings.push(format!(
                    "no service found for release '{}' in namespace '{}'",
                    release.release_name, namespace
                ));
            }
            Ok(services) => {
                tracing::info!(release = %release.release_name, services = services.len(), "release services present");
            }
            Err(e) => {
                tracing::warn!(release = %release.release_name, error = %e, "service check failed");
                warnings.push(format!(
                    "could not list services for release '{}': {e}",
                    release.release_name
                ));
            }
        }
    }
    warnings
}
