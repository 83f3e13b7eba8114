//! Best-effort removal of provisioned resources.
//!
//! [`Teardown::run`] sweeps a set of handles in reverse creation order,
//! so dependents go before the resources they depend on. The sweep never
//! stops early: a failed deletion is recorded and the walk moves on to
//! the next resource. A resource that is already gone counts as success,
//! which makes teardown as re-runnable as deployment.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::descriptor::ResourceKind;
use crate::driver::{retry_remote, RetryOutcome, RetryPolicy};
use crate::error::{FailureCause, FailureKind};
use crate::events::{ProgressReporter, ProgressSink, Transition};
use crate::handle::{ResourceHandle, ResourceStatus};
use crate::metrics::ProvisionMetrics;
use crate::remote::{DeleteOutcome, RemoteApi};

/// What happened to one resource during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TeardownDisposition {
    /// The resource existed and was removed.
    Deleted,
    /// Nothing by that identity existed; success.
    AlreadyAbsent,
    /// The deletion call failed; the resource may still exist.
    Failed,
}

impl TeardownDisposition {
    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::AlreadyAbsent => "already_absent",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TeardownDisposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

/// The teardown record for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownOutcome {
    /// Name of the resource swept.
    pub name: String,
    /// Kind of the resource swept.
    pub kind: ResourceKind,
    /// How the sweep of this resource ended.
    pub disposition: TeardownDisposition,
    /// Why deletion failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureCause>,
}

impl TeardownOutcome {
    /// Returns true if the resource is gone, whether removed by this
    /// sweep or already absent.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.disposition != TeardownDisposition::Failed
    }
}

/// Removes provisioned resources in reverse creation order.
pub struct Teardown {
    remote: Arc<dyn RemoteApi>,
    retry: RetryPolicy,
    metrics: ProvisionMetrics,
}

impl Teardown {
    /// Creates a coordinator with default retry timing.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteApi>) -> Self {
        Self::with_retry(remote, RetryPolicy::default())
    }

    /// Creates a coordinator with explicit retry timing.
    #[must_use]
    pub fn with_retry(remote: Arc<dyn RemoteApi>, retry: RetryPolicy) -> Self {
        Self {
            remote,
            retry,
            metrics: ProvisionMetrics::new(),
        }
    }

    /// Sweeps the handles in reverse creation order, returning one
    /// outcome per handle in sweep order.
    ///
    /// Handles whose deletion succeeds move to
    /// [`ResourceStatus::Deleted`]; failed ones keep their status so a
    /// later sweep can retry them.
    #[tracing::instrument(skip_all, fields(resource_count = handles.len()))]
    pub async fn run(
        &self,
        handles: &mut [ResourceHandle],
        progress: &mut dyn ProgressSink,
    ) -> Vec<TeardownOutcome> {
        let mut reporter = ProgressReporter::new(progress);
        let mut outcomes = Vec::with_capacity(handles.len());

        for handle in handles.iter_mut().rev() {
            let outcome = self.remove(handle, &mut reporter).await;
            self.metrics
                .record_deletion(outcome.kind, outcome.disposition.as_label());
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        tracing::info!(
            swept = outcomes.len(),
            failed,
            "teardown finished"
        );
        outcomes
    }

    async fn remove(
        &self,
        handle: &mut ResourceHandle,
        progress: &mut ProgressReporter<'_>,
    ) -> TeardownOutcome {
        if handle.status == ResourceStatus::Deleted {
            progress.emit(
                &handle.name,
                handle.kind,
                Transition::AlreadyAbsent,
                Some("already deleted".to_string()),
            );
            return self.outcome(handle, TeardownDisposition::AlreadyAbsent, None);
        }

        progress.emit(&handle.name, handle.kind, Transition::Deleting, None);

        let deleted = retry_remote(&self.retry, "delete", None, || {
            self.remote
                .delete(handle.kind, &handle.name, handle.remote_id.as_deref())
        })
        .await;

        match deleted {
            Ok(RetryOutcome::Done {
                value: DeleteOutcome::Deleted,
                ..
            }) => {
                handle.status = ResourceStatus::Deleted;
                progress.emit(&handle.name, handle.kind, Transition::Deleted, None);
                self.outcome(handle, TeardownDisposition::Deleted, None)
            }
            Ok(RetryOutcome::Done {
                value: DeleteOutcome::NotFound,
                ..
            }) => {
                handle.status = ResourceStatus::Deleted;
                progress.emit(&handle.name, handle.kind, Transition::AlreadyAbsent, None);
                self.outcome(handle, TeardownDisposition::AlreadyAbsent, None)
            }
            Ok(RetryOutcome::Cancelled) => {
                // Not reachable without a cancel token; recorded as a
                // failure so the sweep stays accountable.
                let cause =
                    FailureCause::new(FailureKind::Remote, "deletion interrupted before the call");
                progress.emit(
                    &handle.name,
                    handle.kind,
                    Transition::DeleteFailed,
                    Some(cause.to_string()),
                );
                self.outcome(handle, TeardownDisposition::Failed, Some(cause))
            }
            Err(retry) if retry.error.is_not_found() => {
                handle.status = ResourceStatus::Deleted;
                progress.emit(&handle.name, handle.kind, Transition::AlreadyAbsent, None);
                self.outcome(handle, TeardownDisposition::AlreadyAbsent, None)
            }
            Err(retry) => {
                let cause = retry.into_cause();
                tracing::warn!(
                    resource = %handle.name,
                    kind = %handle.kind,
                    error = %cause,
                    "deletion failed, continuing the sweep"
                );
                progress.emit(
                    &handle.name,
                    handle.kind,
                    Transition::DeleteFailed,
                    Some(cause.to_string()),
                );
                self.outcome(handle, TeardownDisposition::Failed, Some(cause))
            }
        }
    }

    fn outcome(
        &self,
        handle: &ResourceHandle,
        disposition: TeardownDisposition,
        error: Option<FailureCause>,
    ) -> TeardownOutcome {
        TeardownOutcome {
            name: handle.name.clone(),
            kind: handle.kind,
            disposition,
            error,
        }
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Teardown")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
