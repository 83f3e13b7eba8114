//! In-process [`RemoteApi`] implementation with scriptable failures.
//!
//! Backs the test suite and the `simulate` command. Resources live in a
//! shared map keyed by `(kind, name)`; per-resource scripts inject the
//! failure modes a real provider exhibits (throttling, permission denials,
//! concurrent-creation conflicts, readiness that never arrives) without
//! any network in the loop. Call counters make creation-call assertions
//! possible, which is how re-run idempotency gets verified.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use async_trait::async_trait;

use crate::descriptor::{Readiness, ResourceDescriptor, ResourceKind};
use crate::handle::ResourceHandle;
use crate::remote::{
    Created, DeleteOutcome, RemoteApi, RemoteError, RemoteErrorKind, RemoteState, RemoteStatus,
};

/// How many polls a freshly created asynchronous resource reports
/// `PENDING` for before flipping to `READY`, absent a script.
const DEFAULT_POLLS_UNTIL_READY: u32 = 1;

/// Running totals of remote calls, by operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounters {
    /// Existence checks served.
    pub finds: u64,
    /// Creation calls served, including ones that failed.
    pub creates: u64,
    /// Status polls served.
    pub polls: u64,
    /// Deletion calls served.
    pub deletes: u64,
}

#[derive(Debug, Clone, Default)]
struct FailureScript {
    fail_find: Option<RemoteErrorKind>,
    fail_create: Option<RemoteErrorKind>,
    fail_delete: Option<RemoteErrorKind>,
    transient_creates: u32,
    conflict_create_then_visible: bool,
    ready_after_polls: Option<u32>,
    never_ready: bool,
    poll_reports_failure: bool,
}

#[derive(Debug, Clone)]
struct StoredResource {
    remote_id: Option<String>,
    status: RemoteStatus,
    polls_remaining: u32,
    never_ready: bool,
    poll_reports_failure: bool,
}

#[derive(Debug, Default)]
struct RemoteInner {
    resources: HashMap<(ResourceKind, String), StoredResource>,
    scripts: HashMap<String, FailureScript>,
    counters: CallCounters,
    next_id: u64,
}

impl RemoteInner {
    fn assign_id(&mut self, kind: ResourceKind) -> Option<String> {
        if !kind.has_remote_identity() {
            return None;
        }
        self.next_id += 1;
        Some(format!("{}-{:04x}", kind.as_label(), self.next_id))
    }
}

/// Shared, clonable in-memory remote.
///
/// Clones share state, so a test can keep one clone for assertions while
/// the engine owns another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRemote {
    state: Arc<RwLock<RemoteInner>>,
}

impl InMemoryRemote {
    /// Creates an empty remote with no resources and no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, RemoteInner>, RemoteError> {
        self.state
            .write()
            .map_err(|_| RemoteError::internal("remote state lock poisoned"))
    }

    fn script(&self, name: &str) -> FailureScript {
        self.state
            .read()
            .ok()
            .and_then(|state| state.scripts.get(name).cloned())
            .unwrap_or_default()
    }

    fn edit_script(self, name: &str, edit: impl FnOnce(&mut FailureScript)) -> Self {
        if let Ok(mut state) = self.write_state() {
            edit(state.scripts.entry(name.to_string()).or_default());
        }
        self
    }

    /// Seeds a resource that already exists and is ready.
    #[must_use]
    pub fn with_existing(self, kind: ResourceKind, name: &str) -> Self {
        if let Ok(mut state) = self.write_state() {
            let remote_id = state.assign_id(kind);
            state.resources.insert(
                (kind, name.to_string()),
                StoredResource {
                    remote_id,
                    status: RemoteStatus::Ready,
                    polls_remaining: 0,
                    never_ready: false,
                    poll_reports_failure: false,
                },
            );
        }
        self
    }

    /// Seeds a resource that exists but is still materializing; it reports
    /// `PENDING` for the given number of polls before turning ready.
    #[must_use]
    pub fn with_existing_in_progress(
        self,
        kind: ResourceKind,
        name: &str,
        ready_after_polls: u32,
    ) -> Self {
        if let Ok(mut state) = self.write_state() {
            let remote_id = state.assign_id(kind);
            state.resources.insert(
                (kind, name.to_string()),
                StoredResource {
                    remote_id,
                    status: RemoteStatus::Pending,
                    polls_remaining: ready_after_polls,
                    never_ready: false,
                    poll_reports_failure: false,
                },
            );
        }
        self
    }

    /// Seeds a resource the remote system has given up on.
    #[must_use]
    pub fn with_existing_failed(self, kind: ResourceKind, name: &str) -> Self {
        if let Ok(mut state) = self.write_state() {
            let remote_id = state.assign_id(kind);
            state.resources.insert(
                (kind, name.to_string()),
                StoredResource {
                    remote_id,
                    status: RemoteStatus::Failed,
                    polls_remaining: 0,
                    never_ready: false,
                    poll_reports_failure: false,
                },
            );
        }
        self
    }

    /// Scripts every existence check for `name` to fail with `kind`.
    #[must_use]
    pub fn fail_find(self, name: &str, kind: RemoteErrorKind) -> Self {
        self.edit_script(name, |script| script.fail_find = Some(kind))
    }

    /// Scripts every creation call for `name` to fail with `kind`.
    #[must_use]
    pub fn fail_create(self, name: &str, kind: RemoteErrorKind) -> Self {
        self.edit_script(name, |script| script.fail_create = Some(kind))
    }

    /// Scripts every deletion call for `name` to fail with `kind`.
    #[must_use]
    pub fn fail_delete(self, name: &str, kind: RemoteErrorKind) -> Self {
        self.edit_script(name, |script| script.fail_delete = Some(kind))
    }

    /// Scripts the first `count` creation calls for `name` to fail with a
    /// throttling error before one succeeds.
    #[must_use]
    pub fn transient_failures_before_create(self, name: &str, count: u32) -> Self {
        self.edit_script(name, |script| script.transient_creates = count)
    }

    /// Scripts the first creation call for `name` to lose a race: the call
    /// reports a conflict, and the resource becomes visible to the next
    /// existence check, as if another actor created it concurrently.
    #[must_use]
    pub fn conflict_with_concurrent_create(self, name: &str) -> Self {
        self.edit_script(name, |script| script.conflict_create_then_visible = true)
    }

    /// Scripts `name` to report `PENDING` for the given number of polls
    /// after creation before turning ready.
    #[must_use]
    pub fn ready_after_polls(self, name: &str, count: u32) -> Self {
        self.edit_script(name, |script| script.ready_after_polls = Some(count))
    }

    /// Scripts `name` to report `PENDING` forever.
    #[must_use]
    pub fn never_ready(self, name: &str) -> Self {
        self.edit_script(name, |script| script.never_ready = true)
    }

    /// Scripts `name` to report `FAILED` once polled.
    #[must_use]
    pub fn poll_reports_failure(self, name: &str) -> Self {
        self.edit_script(name, |script| script.poll_reports_failure = true)
    }

    /// Returns a snapshot of the call counters.
    #[must_use]
    pub fn counters(&self) -> CallCounters {
        self.state
            .read()
            .map(|state| state.counters)
            .unwrap_or_default()
    }

    /// Returns true if a resource by that identity currently exists.
    #[must_use]
    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.state
            .read()
            .map(|state| state.resources.contains_key(&(kind, name.to_string())))
            .unwrap_or(false)
    }

    /// Returns the stored status of a resource, if it exists.
    #[must_use]
    pub fn resource_status(&self, kind: ResourceKind, name: &str) -> Option<RemoteStatus> {
        self.state
            .read()
            .ok()
            .and_then(|state| {
                state
                    .resources
                    .get(&(kind, name.to_string()))
                    .map(|resource| resource.status)
            })
    }
}

#[async_trait]
impl RemoteApi for InMemoryRemote {
    async fn find(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<RemoteState>, RemoteError> {
        let mut state = self.write_state()?;
        state.counters.finds += 1;

        if let Some(error_kind) = state.scripts.get(name).and_then(|s| s.fail_find) {
            return Err(RemoteError::new(
                error_kind,
                format!("injected {error_kind} failure finding {name}"),
            ));
        }

        Ok(state
            .resources
            .get(&(kind, name.to_string()))
            .map(|resource| RemoteState {
                remote_id: resource.remote_id.clone(),
                status: resource.status,
            }))
    }

    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        _dependencies: &[ResourceHandle],
    ) -> Result<Created, RemoteError> {
        let script = self.script(&descriptor.name);
        let mut state = self.write_state()?;
        state.counters.creates += 1;

        if let Some(error_kind) = script.fail_create {
            return Err(RemoteError::new(
                error_kind,
                format!(
                    "injected {error_kind} failure creating {} {}",
                    descriptor.kind, descriptor.name
                ),
            ));
        }

        if script.transient_creates > 0 {
            if let Some(live) = state.scripts.get_mut(&descriptor.name) {
                live.transient_creates -= 1;
            }
            return Err(RemoteError::transient(format!(
                "throttled creating {}",
                descriptor.name
            )));
        }

        let key = (descriptor.kind, descriptor.name.clone());

        if script.conflict_create_then_visible && !state.resources.contains_key(&key) {
            // Another actor wins the race: the conflict surfaces here and
            // the resource is visible to the next existence check.
            let remote_id = state.assign_id(descriptor.kind);
            state.resources.insert(
                key,
                StoredResource {
                    remote_id,
                    status: RemoteStatus::Ready,
                    polls_remaining: 0,
                    never_ready: false,
                    poll_reports_failure: false,
                },
            );
            if let Some(live) = state.scripts.get_mut(&descriptor.name) {
                live.conflict_create_then_visible = false;
            }
            return Err(RemoteError::conflict(format!(
                "{} {} already exists",
                descriptor.kind, descriptor.name
            )));
        }

        if state.resources.contains_key(&key) {
            return Err(RemoteError::conflict(format!(
                "{} {} already exists",
                descriptor.kind, descriptor.name
            )));
        }

        let remote_id = state.assign_id(descriptor.kind);
        let (status, polls_remaining) = match descriptor.kind.readiness() {
            Readiness::Immediate => (RemoteStatus::Ready, 0),
            Readiness::Polled => (
                RemoteStatus::Pending,
                script.ready_after_polls.unwrap_or(DEFAULT_POLLS_UNTIL_READY),
            ),
        };
        state.resources.insert(
            key,
            StoredResource {
                remote_id: remote_id.clone(),
                status,
                polls_remaining,
                never_ready: script.never_ready,
                poll_reports_failure: script.poll_reports_failure,
            },
        );

        Ok(Created { remote_id })
    }

    async fn poll_status(
        &self,
        kind: ResourceKind,
        remote_id: &str,
    ) -> Result<RemoteStatus, RemoteError> {
        let mut state = self.write_state()?;
        state.counters.polls += 1;

        let resource = state
            .resources
            .values_mut()
            .find(|resource| resource.remote_id.as_deref() == Some(remote_id))
            .ok_or_else(|| {
                RemoteError::not_found(format!("no {kind} with identifier {remote_id}"))
            })?;

        if resource.poll_reports_failure {
            resource.status = RemoteStatus::Failed;
            return Ok(RemoteStatus::Failed);
        }
        if resource.never_ready {
            return Ok(RemoteStatus::Pending);
        }
        if resource.polls_remaining > 0 {
            resource.polls_remaining -= 1;
            return Ok(RemoteStatus::Pending);
        }

        resource.status = RemoteStatus::Ready;
        Ok(RemoteStatus::Ready)
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        _remote_id: Option<&str>,
    ) -> Result<DeleteOutcome, RemoteError> {
        let mut state = self.write_state()?;
        state.counters.deletes += 1;

        if let Some(error_kind) = state.scripts.get(name).and_then(|s| s.fail_delete) {
            return Err(RemoteError::new(
                error_kind,
                format!("injected {error_kind} failure deleting {name}"),
            ));
        }

        match state.resources.remove(&(kind, name.to_string())) {
            Some(_) => Ok(DeleteOutcome::Deleted),
            None => Ok(DeleteOutcome::NotFound),
        }
    }
}
