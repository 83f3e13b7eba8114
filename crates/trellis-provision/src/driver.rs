//! Idempotent provisioning of a single resource.
//!
//! [`ResourceDriver::provision`] walks one resource through the sequence
//! that makes re-running a deployment safe:
//!
//! 1. **Existence check**: if the resource is already there and usable,
//!    it is adopted as-is and nothing is created
//! 2. **Create**: an "already exists" conflict from the remote system is
//!    treated as step 1 having raced a concurrent creator, not as failure
//! 3. **Wait for readiness**: asynchronous kinds are polled until ready,
//!    failed, or out of budget
//!
//! Transient remote failures are retried with exponential backoff;
//! permission, conflict, and validation failures surface immediately.
//! Cancellation is honored between remote calls, never by abandoning one
//! in flight, so a cancelled run leaves no call half-issued.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::descriptor::{Readiness, ResourceDescriptor};
use crate::error::{FailureCause, FailureKind};
use crate::events::{ProgressReporter, Transition};
use crate::handle::{ResourceHandle, ResourceStatus};
use crate::metrics::ProvisionMetrics;
use crate::remote::{RemoteApi, RemoteError, RemoteState, RemoteStatus};

/// Bounded exponential backoff for transient remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Remote calls attempted before a transient failure becomes final.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles per attempt.
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound on any single backoff delay.
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Returns the backoff delay after the given 1-based attempt fails.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 2_u32.saturating_pow(exponent);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Bounded readiness polling for asynchronously provisioned kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollPolicy {
    /// Pause between consecutive status polls.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Total time a resource may stay pending before it counts as failed.
    #[serde(with = "humantime_serde")]
    pub budget: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            budget: Duration::from_secs(600),
        }
    }
}

/// Tunable timing for the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriverConfig {
    /// Backoff for transient remote failures.
    pub retry: RetryPolicy,
    /// Readiness polling cadence and budget.
    pub poll: PollPolicy,
}

/// How a drive attempt ended, short of failure.
enum DriveOutcome {
    /// The resource reached readiness.
    Completed,
    /// Cancellation arrived first; the handle keeps its last status.
    Cancelled,
}

/// Result of a retried remote call.
pub(crate) enum RetryOutcome<T> {
    /// The call succeeded on the given 1-based attempt.
    Done {
        /// Value the remote call produced.
        value: T,
        /// Remote calls issued, including the successful one.
        attempts: u32,
    },
    /// Cancellation arrived during a backoff pause.
    Cancelled,
}

/// A remote failure the retry loop gave up on, with the attempt count.
pub(crate) struct RetryError {
    pub(crate) error: RemoteError,
    pub(crate) attempts: u32,
}

impl RetryError {
    pub(crate) fn into_cause(self) -> FailureCause {
        FailureCause::from_remote(&self.error, self.attempts)
    }
}

/// Runs a remote call, retrying transient failures with backoff.
///
/// Non-transient failures and transient failures that exhaust the policy
/// come back as a [`RetryError`] keeping the original classification. A
/// `None` cancel token means the call runs to completion or failure.
pub(crate) async fn retry_remote<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    cancel: Option<&CancellationToken>,
    mut call: F,
) -> Result<RetryOutcome<T>, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 0_u32;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => {
                return Ok(RetryOutcome::Done {
                    value,
                    attempts: attempt,
                })
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient remote failure, backing off"
                );
                match cancel {
                    Some(token) => {
                        tokio::select! {
                            () = token.cancelled() => return Ok(RetryOutcome::Cancelled),
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => tokio::time::sleep(delay).await,
                }
            }
            Err(error) => {
                return Err(RetryError {
                    error,
                    attempts: attempt,
                })
            }
        }
    }
}

/// Drives individual resources to readiness against a [`RemoteApi`].
pub struct ResourceDriver {
    remote: Arc<dyn RemoteApi>,
    config: DriverConfig,
    metrics: ProvisionMetrics,
}

impl ResourceDriver {
    /// Creates a driver with default timing.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteApi>) -> Self {
        Self::with_config(remote, DriverConfig::default())
    }

    /// Creates a driver with explicit timing.
    #[must_use]
    pub fn with_config(remote: Arc<dyn RemoteApi>, config: DriverConfig) -> Self {
        Self {
            remote,
            config,
            metrics: ProvisionMetrics::new(),
        }
    }

    /// Returns the driver's timing configuration.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Provisions one resource, already-provisioned dependencies in hand.
    ///
    /// Never returns an error: every outcome is encoded in the handle.
    /// `Ready` means usable, `Failed` carries the cause, and an active
    /// status (`Pending`, `Creating`) means cancellation interrupted the
    /// drive with the resource possibly half-created remotely.
    #[tracing::instrument(
        skip_all,
        fields(resource = %descriptor.name, kind = %descriptor.kind)
    )]
    pub async fn provision(
        &self,
        descriptor: &ResourceDescriptor,
        dependencies: &[ResourceHandle],
        progress: &mut ProgressReporter<'_>,
        cancel: &CancellationToken,
    ) -> ResourceHandle {
        let mut handle = ResourceHandle::new(&descriptor.name, descriptor.kind);
        match self
            .drive(descriptor, dependencies, &mut handle, progress, cancel)
            .await
        {
            Ok(DriveOutcome::Completed) => {
                self.metrics
                    .record_resource_outcome(descriptor.kind, Transition::Ready);
            }
            Ok(DriveOutcome::Cancelled) => {
                tracing::info!(status = %handle.status, "provisioning interrupted by cancellation");
            }
            Err(cause) => {
                tracing::warn!(error = %cause, "resource provisioning failed");
                progress.emit(
                    &descriptor.name,
                    descriptor.kind,
                    Transition::Failed,
                    Some(cause.to_string()),
                );
                handle.mark_failed(cause);
                self.metrics
                    .record_resource_outcome(descriptor.kind, Transition::Failed);
            }
        }
        handle
    }

    async fn drive(
        &self,
        descriptor: &ResourceDescriptor,
        dependencies: &[ResourceHandle],
        handle: &mut ResourceHandle,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<DriveOutcome, FailureCause> {
        // A resource that already exists is a success, not a conflict.
        let found = match retry_remote(&self.config.retry, "find", Some(cancel), || {
            self.remote.find(descriptor.kind, &descriptor.name)
        })
        .await
        .map_err(RetryError::into_cause)?
        {
            RetryOutcome::Done { value, attempts } => {
                self.metrics
                    .record_retries(descriptor.kind, attempts.saturating_sub(1));
                value
            }
            RetryOutcome::Cancelled => return Ok(DriveOutcome::Cancelled),
        };

        if let Some(state) = found {
            return self
                .adopt_existing(descriptor, state, handle, progress, cancel)
                .await;
        }

        handle.status = ResourceStatus::Creating;
        progress.emit(&descriptor.name, descriptor.kind, Transition::Creating, None);

        let created = match retry_remote(&self.config.retry, "create", Some(cancel), || {
            self.remote.create(descriptor, dependencies)
        })
        .await
        {
            Ok(RetryOutcome::Done { value, attempts }) => {
                handle.attempts = attempts;
                self.metrics
                    .record_retries(descriptor.kind, attempts.saturating_sub(1));
                value
            }
            Ok(RetryOutcome::Cancelled) => return Ok(DriveOutcome::Cancelled),
            Err(retry) if retry.error.is_conflict() => {
                handle.attempts = retry.attempts;
                return self
                    .reconcile_conflict(descriptor, retry.into_cause(), handle, progress, cancel)
                    .await;
            }
            Err(retry) => {
                handle.attempts = retry.attempts;
                return Err(retry.into_cause());
            }
        };

        handle.remote_id = created.remote_id;
        progress.emit(&descriptor.name, descriptor.kind, Transition::Created, None);
        self.wait_ready(descriptor, handle, progress, cancel).await
    }

    /// Folds a found resource into the run as if this deployment made it.
    async fn adopt_existing(
        &self,
        descriptor: &ResourceDescriptor,
        state: RemoteState,
        handle: &mut ResourceHandle,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<DriveOutcome, FailureCause> {
        handle.preexisting = true;
        handle.remote_id = state.remote_id;

        match state.status {
            RemoteStatus::Ready => {
                progress.emit(
                    &descriptor.name,
                    descriptor.kind,
                    Transition::Found,
                    Some("already provisioned".to_string()),
                );
                handle.mark_ready();
                progress.emit(&descriptor.name, descriptor.kind, Transition::Ready, None);
                Ok(DriveOutcome::Completed)
            }
            RemoteStatus::Pending => {
                progress.emit(
                    &descriptor.name,
                    descriptor.kind,
                    Transition::Found,
                    Some("already provisioning, waiting for readiness".to_string()),
                );
                handle.status = ResourceStatus::Creating;
                self.wait_ready(descriptor, handle, progress, cancel).await
            }
            RemoteStatus::Failed => Err(FailureCause::new(
                FailureKind::Conflict,
                "a resource by this identity exists remotely in a failed state",
            )),
        }
    }

    /// Handles an "already exists" response to a creation call.
    ///
    /// The conflict usually means a concurrent creator won the race, in
    /// which case a fresh existence check sees the resource and the
    /// adoption path applies. If the re-check still sees nothing, the
    /// original conflict stands.
    async fn reconcile_conflict(
        &self,
        descriptor: &ResourceDescriptor,
        conflict: FailureCause,
        handle: &mut ResourceHandle,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<DriveOutcome, FailureCause> {
        let refound = match retry_remote(&self.config.retry, "find", Some(cancel), || {
            self.remote.find(descriptor.kind, &descriptor.name)
        })
        .await
        .map_err(RetryError::into_cause)?
        {
            RetryOutcome::Done { value, .. } => value,
            RetryOutcome::Cancelled => return Ok(DriveOutcome::Cancelled),
        };

        match refound {
            Some(state) => {
                self.adopt_existing(descriptor, state, handle, progress, cancel)
                    .await
            }
            None => Err(conflict),
        }
    }

    /// Polls the remote status until ready, failed, or out of budget.
    async fn wait_ready(
        &self,
        descriptor: &ResourceDescriptor,
        handle: &mut ResourceHandle,
        progress: &mut ProgressReporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<DriveOutcome, FailureCause> {
        if descriptor.kind.readiness() == Readiness::Immediate {
            handle.mark_ready();
            progress.emit(&descriptor.name, descriptor.kind, Transition::Ready, None);
            return Ok(DriveOutcome::Completed);
        }

        let Some(remote_id) = handle.remote_id.clone() else {
            return Err(FailureCause::new(
                FailureKind::Remote,
                "remote system returned no identifier for a polled resource",
            ));
        };

        let poll = self.config.poll;
        let started = tokio::time::Instant::now();
        loop {
            match self.remote.poll_status(descriptor.kind, &remote_id).await {
                Ok(RemoteStatus::Ready) => {
                    handle.mark_ready();
                    progress.emit(&descriptor.name, descriptor.kind, Transition::Ready, None);
                    self.metrics
                        .observe_wait_ready(descriptor.kind, started.elapsed().as_secs_f64());
                    return Ok(DriveOutcome::Completed);
                }
                Ok(RemoteStatus::Failed) => {
                    return Err(FailureCause::new(
                        FailureKind::Remote,
                        "remote system reports the resource failed while provisioning",
                    ));
                }
                Ok(RemoteStatus::Pending) => {}
                Err(err) if err.is_transient() => {
                    // Tolerated; the budget bounds how long flaky polls
                    // can stall the wait.
                    tracing::debug!(error = %err, "transient failure polling readiness");
                }
                Err(err) => return Err(FailureCause::from_remote(&err, 1)),
            }

            if started.elapsed() >= poll.budget {
                return Err(FailureCause::timeout(poll.budget));
            }

            tokio::select! {
                () = cancel.cancelled() => return Ok(DriveOutcome::Cancelled),
                () = tokio::time::sleep(poll.interval) => {}
            }
        }
    }
}

impl std::fmt::Debug for ResourceDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDriver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
