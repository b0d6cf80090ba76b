//! Cluster-wide pod readiness polling.
//!
//! Starts in Polling and ends in Ready (every counted pod has all containers
//! ready) or TimedOut (deadline reached). The deadline is checked before each
//! poll and polls are spaced by a fixed interval. A timeout is a warning for
//! the caller, never an error.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::kubectl::ClusterApi;

pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Phase of pods that ran to completion; they never report ready containers.
const SUCCEEDED: &str = "Succeeded";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodReadiness {
    pub name: String,
    pub ready: usize,
    pub total: usize,
    pub phase: Option<String>,
}

impl PodReadiness {
    pub fn is_ready(&self) -> bool {
        self.ready == self.total
    }

    fn is_completed(&self) -> bool {
        self.phase.as_deref() == Some(SUCCEEDED)
    }
}

/// One poll's view of the namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadinessSnapshot {
    pub pods: Vec<PodReadiness>,
}

impl ReadinessSnapshot {
    pub fn all_ready(&self) -> bool {
        self.pods
            .iter()
            .filter(|p| !p.is_completed())
            .all(PodReadiness::is_ready)
    }

    pub fn pending(&self) -> Vec<String> {
        self.pods
            .iter()
            .filter(|p| !p.is_completed() && !p.is_ready())
            .map(|p| format!("{} {}/{}", p.name, p.ready, p.total))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReadinessOutcome {
    Ready { polls: u32 },
    TimedOut { polls: u32, pending: Vec<String> },
}

impl ReadinessOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadinessOutcome::Ready { .. })
    }
}

/// Time source for the poll loop; tests substitute a manual clock.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Poll pods in `namespace` until all are ready or `timeout` elapses.
pub fn wait(
    cluster: &dyn ClusterApi,
    clock: &dyn Clock,
    namespace: &str,
    timeout: Duration,
) -> ReadinessOutcome {
    let start = clock.now();
    let mut polls = 0u32;
    let mut pending = Vec::new();

    loop {
        let elapsed = clock.now().saturating_duration_since(start);
        if elapsed >= timeout {
            tracing::warn!(
                namespace = %namespace,
                timeout_secs = timeout.as_secs(),
                pending = ?pending,
                "pods not ready before timeout"
            );
            return ReadinessOutcome::TimedOut { polls, pending };
        }

        polls += 1;
        match cluster.list_pods(namespace) {
            Ok(pods) => {
                let snapshot = ReadinessSnapshot { pods };
                if snapshot.all_ready() {
                    tracing::info!(namespace = %namespace, polls, pods = snapshot.pods.len(), "all pods ready");
                    return ReadinessOutcome::Ready { polls };
                }
                pending = snapshot.pending();
                tracing::info!(namespace = %namespace, waiting = pending.len(), "waiting for pods");
            }
            Err(e) => {
                // only the latest poll is reported
                pending.clear();
                tracing::warn!(namespace = %namespace, error = %e, "pod readiness check failed");
            }
        }

        // never sleep past the deadline
        let remaining = timeout.saturating_sub(clock.now().saturating_duration_since(start));
        clock.sleep(POLL_INTERVAL.min(remaining));
    }
}
