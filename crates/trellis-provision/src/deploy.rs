//! Dependency-ordered deployment of a resource plan.
//!
//! [`Orchestrator::deploy`] validates the descriptor set, orders it, and
//! drives each resource in turn with the handles of its dependencies in
//! hand. A failure never takes the whole run down unless asked to: the
//! transitive dependents of the failed resource are skipped and every
//! independent branch still converges. The returned [`DeploymentReport`]
//! accounts for every descriptor it acted on, with handles in creation
//! order.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use trellis_core::DeploymentId;

use crate::descriptor::{Plan, ResourceDescriptor};
use crate::driver::{DriverConfig, ResourceDriver};
use crate::error::{FailureCause, FailureKind, Result};
use crate::events::{ProgressReporter, ProgressSink, Transition};
use crate::handle::{ResourceHandle, ResourceStatus};
use crate::metrics::ProvisionMetrics;
use crate::remote::RemoteApi;

/// Failure handling for a deployment run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployPolicy {
    /// Stop at the first failure instead of continuing with the branches
    /// that do not depend on it.
    pub abort_on_failure: bool,
}

/// How a deployment run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeploymentOutcome {
    /// Every resource reached readiness.
    Converged,
    /// Some resources failed or were skipped; the rest converged.
    Partial,
    /// A failure stopped the run under `abort_on_failure`.
    Aborted,
    /// Cancellation stopped the run before it could finish.
    Cancelled,
}

impl DeploymentOutcome {
    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::Partial => "partial",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for DeploymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

/// One failed resource and why it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFailure {
    /// Name of the resource that failed.
    pub name: String,
    /// What went wrong.
    pub cause: FailureCause,
}

/// The full account of one deployment run.
///
/// Handles appear in creation order. A resource appears in `errors`
/// exactly when its handle is `Failed`; resources skipped because an
/// upstream dependency failed appear in `skipped` and nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReport {
    /// Identifier of this run.
    pub deployment_id: DeploymentId,
    /// How the run ended.
    pub outcome: DeploymentOutcome,
    /// Handles for every resource acted on, in creation order.
    pub handles: Vec<ResourceHandle>,
    /// Failures, in the order they occurred.
    pub errors: Vec<ResourceFailure>,
    /// Resources not attempted because an upstream dependency failed,
    /// in creation order.
    pub skipped: Vec<String>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl DeploymentReport {
    /// Returns the handle for a resource, if the run acted on it.
    #[must_use]
    pub fn handle(&self, name: &str) -> Option<&ResourceHandle> {
        self.handles.iter().find(|handle| handle.name == name)
    }

    /// Returns true if every resource reached readiness.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.outcome == DeploymentOutcome::Converged
    }

    /// Returns how many resources reached readiness.
    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.handles.iter().filter(|h| h.is_ready()).count()
    }

    /// Returns the names of the resources that failed, in failure order.
    #[must_use]
    pub fn failed_names(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.name.as_str()).collect()
    }

    /// Returns the wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Drives whole plans to readiness, one resource at a time.
///
/// Resources are provisioned sequentially in creation order. Sequential
/// order keeps the report and event stream deterministic and matches how
/// the remote systems gate on one another in practice.
#[derive(Debug)]
pub struct Orchestrator {
    driver: ResourceDriver,
    metrics: ProvisionMetrics,
}

impl Orchestrator {
    /// Creates an orchestrator with default driver timing.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteApi>) -> Self {
        Self::with_config(remote, DriverConfig::default())
    }

    /// Creates an orchestrator with explicit driver timing.
    #[must_use]
    pub fn with_config(remote: Arc<dyn RemoteApi>, config: DriverConfig) -> Self {
        Self {
            driver: ResourceDriver::with_config(remote, config),
            metrics: ProvisionMetrics::new(),
        }
    }

    /// Deploys a descriptor set to readiness.
    ///
    /// # Errors
    ///
    /// Returns a graph error (duplicate name, unknown or self dependency,
    /// cycle) before touching the remote system. Resource-level failures
    /// do not error; they are reported per resource in the returned
    /// [`DeploymentReport`].
    pub async fn deploy(
        &self,
        descriptors: Vec<ResourceDescriptor>,
        policy: DeployPolicy,
        progress: &mut dyn ProgressSink,
    ) -> Result<DeploymentReport> {
        let cancel = CancellationToken::new();
        self.deploy_cancellable(descriptors, policy, progress, &cancel)
            .await
    }

    /// Deploys a descriptor set, stopping early if `cancel` fires.
    ///
    /// Cancellation never abandons a remote call in flight: the resource
    /// being worked on finishes its current call, its handle keeps the
    /// status it reached, and no further resource is started.
    ///
    /// # Errors
    ///
    /// Same contract as [`Orchestrator::deploy`].
    #[tracing::instrument(
        skip_all,
        fields(deployment_id = tracing::field::Empty, resource_count = descriptors.len())
    )]
    pub async fn deploy_cancellable(
        &self,
        descriptors: Vec<ResourceDescriptor>,
        policy: DeployPolicy,
        progress: &mut dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<DeploymentReport> {
        let plan = Plan::from_descriptors(descriptors)?;
        let deployment_id = DeploymentId::generate();
        tracing::Span::current().record("deployment_id", tracing::field::display(deployment_id));

        let started_at = Utc::now();
        let timer = std::time::Instant::now();
        let mut reporter = ProgressReporter::new(progress);
        let mut handles: Vec<ResourceHandle> = Vec::with_capacity(plan.len());
        let mut errors: Vec<ResourceFailure> = Vec::new();
        let mut skipped: Vec<String> = Vec::new();
        // First failed upstream for each resource to be skipped, claimed
        // by the earliest failure so the skip reason is deterministic.
        let mut skip_roots: HashMap<String, String> = HashMap::new();
        let mut aborted = false;
        let mut cancelled = false;

        for descriptor in plan.descriptors() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            if let Some(root) = skip_roots.get(&descriptor.name) {
                reporter.emit(
                    &descriptor.name,
                    descriptor.kind,
                    Transition::Skipped,
                    Some(format!("upstream failure: {root}")),
                );
                self.metrics
                    .record_resource_outcome(descriptor.kind, Transition::Skipped);
                skipped.push(descriptor.name.clone());
                continue;
            }

            let dependencies: Vec<ResourceHandle> = descriptor
                .depends_on
                .iter()
                .filter_map(|dep| handles.iter().find(|handle| handle.name == *dep))
                .cloned()
                .collect();

            let handle = self
                .driver
                .provision(descriptor, &dependencies, &mut reporter, cancel)
                .await;

            match handle.status {
                ResourceStatus::Ready => handles.push(handle),
                ResourceStatus::Failed => {
                    let cause = handle.error.clone().unwrap_or_else(|| {
                        FailureCause::new(FailureKind::Remote, "failure cause not recorded")
                    });
                    errors.push(ResourceFailure {
                        name: handle.name.clone(),
                        cause,
                    });
                    for dependent in plan.dependents_of(&handle.name) {
                        skip_roots
                            .entry(dependent)
                            .or_insert_with(|| handle.name.clone());
                    }
                    handles.push(handle);
                    if policy.abort_on_failure {
                        aborted = true;
                        break;
                    }
                }
                _ => {
                    // Cancellation interrupted this resource mid-drive;
                    // its handle records how far it got.
                    handles.push(handle);
                    cancelled = true;
                    break;
                }
            }
        }

        let outcome = if cancelled {
            DeploymentOutcome::Cancelled
        } else if aborted {
            DeploymentOutcome::Aborted
        } else if errors.is_empty() {
            DeploymentOutcome::Converged
        } else {
            DeploymentOutcome::Partial
        };

        let finished_at = Utc::now();
        self.metrics
            .observe_deployment(outcome.as_label(), timer.elapsed().as_secs_f64());
        tracing::info!(
            outcome = %outcome,
            ready = handles.iter().filter(|handle| handle.is_ready()).count(),
            failed = errors.len(),
            skipped = skipped.len(),
            "deployment finished"
        );

        Ok(DeploymentReport {
            deployment_id,
            outcome,
            handles,
            errors,
            skipped,
            started_at,
            finished_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ResourceKind;
    use crate::error::Error;
    use crate::events::{MemoryProgress, NullProgress};
    use crate::remote::InMemoryRemote;

    #[tokio::test]
    async fn empty_plan_converges_without_remote_calls() {
        let remote = InMemoryRemote::new();
        let orchestrator = Orchestrator::new(Arc::new(remote.clone()));
        let mut progress = MemoryProgress::new();

        let report = orchestrator
            .deploy(Vec::new(), DeployPolicy::default(), &mut progress)
            .await
            .unwrap();

        assert!(report.is_converged());
        assert!(report.handles.is_empty());
        assert!(report.errors.is_empty());
        assert!(report.skipped.is_empty());
        assert_eq!(remote.counters(), Default::default());
    }

    #[tokio::test]
    async fn graph_errors_fail_before_any_remote_work() {
        let remote = InMemoryRemote::new();
        let orchestrator = Orchestrator::new(Arc::new(remote.clone()));
        let mut progress = MemoryProgress::new();

        let descriptors = vec![
            ResourceDescriptor::new("a", ResourceKind::Role).with_dependency("b"),
            ResourceDescriptor::new("b", ResourceKind::Bucket).with_dependency("a"),
        ];
        let result = orchestrator
            .deploy(descriptors, DeployPolicy::default(), &mut progress)
            .await;

        assert!(matches!(result, Err(Error::CycleDetected { .. })));
        assert_eq!(remote.counters().finds, 0);
        assert_eq!(remote.counters().creates, 0);
        assert!(progress.events().is_empty());
    }

    #[tokio::test]
    async fn report_helpers_reflect_the_run() {
        let remote = InMemoryRemote::new();
        let orchestrator = Orchestrator::new(Arc::new(remote));
        // Callers that do not observe progress pass the discarding sink.
        let mut progress = NullProgress;

        let report = orchestrator
            .deploy(
                vec![ResourceDescriptor::new("assets", ResourceKind::Bucket)],
                DeployPolicy::default(),
                &mut progress,
            )
            .await
            .unwrap();

        assert_eq!(report.ready_count(), 1);
        assert!(report.failed_names().is_empty());
        assert!(report.handle("assets").is_some());
        assert!(report.handle("ghost").is_none());
        assert!(report.duration() >= chrono::Duration::zero());
    }
}
