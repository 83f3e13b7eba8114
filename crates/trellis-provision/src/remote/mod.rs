//! The boundary between the engine and the systems it provisions against.
//!
//! [`RemoteApi`] is the only surface the driver and teardown coordinator
//! talk to. Implementations translate these four calls into whatever their
//! backing service speaks; the engine never sees provider SDK types, only
//! [`RemoteState`], [`Created`], [`DeleteOutcome`], and [`RemoteError`].
//!
//! [`InMemoryRemote`] is the in-process implementation used by tests and
//! the `simulate` command.

mod memory;

pub use memory::{CallCounters, InMemoryRemote};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::descriptor::{ResourceDescriptor, ResourceKind};
use crate::handle::ResourceHandle;

/// Status of a resource as reported by the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    /// Still materializing.
    Pending,
    /// Usable.
    Ready,
    /// The remote system gave up on it.
    Failed,
}

/// What an existence check found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteState {
    /// Remote identifier, when the kind has one.
    pub remote_id: Option<String>,
    /// Status as the remote system reports it.
    pub status: RemoteStatus,
}

/// Result of a successful creation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Created {
    /// Identifier the remote system assigned, when the kind has one.
    pub remote_id: Option<String>,
}

/// Result of a deletion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The resource existed and was removed.
    Deleted,
    /// Nothing by that identity exists remotely.
    NotFound,
}

/// Classification of a remote call failure.
///
/// The kind decides what the engine does next: `Transient` failures are
/// retried with backoff, everything else surfaces immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemoteErrorKind {
    /// Throttling, timeouts, connection resets. Safe to retry.
    Transient,
    /// The caller lacks permission. Retrying cannot help.
    Permission,
    /// Something by that identity already exists.
    Conflict,
    /// The remote system rejected the request payload.
    Validation,
    /// The target of the call does not exist.
    NotFound,
    /// Anything the provider reports that fits no other bucket.
    Internal,
}

impl RemoteErrorKind {
    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permission => "permission",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

/// A failure reported by a [`RemoteApi`] call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Classification driving retry behavior.
    pub kind: RemoteErrorKind,
    /// Provider-facing description of what went wrong.
    pub message: String,
}

impl RemoteError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a retryable failure.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transient, message)
    }

    /// Creates a permission failure.
    #[must_use]
    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Permission, message)
    }

    /// Creates an already-exists conflict.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Conflict, message)
    }

    /// Creates a request-rejected failure.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Validation, message)
    }

    /// Creates a no-such-resource failure.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    /// Creates a provider-internal failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Internal, message)
    }

    /// Returns true if the failure is safe to retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind == RemoteErrorKind::Transient
    }

    /// Returns true if the failure means the resource already exists.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.kind == RemoteErrorKind::Conflict
    }

    /// Returns true if the failure means the target does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == RemoteErrorKind::NotFound
    }
}

/// Provider-facing operations the engine needs.
///
/// Implementations must be safe to call repeatedly with the same inputs;
/// the engine leans on that to make whole deployments re-runnable.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Looks up a resource by kind and name.
    ///
    /// Returns `Ok(None)` when nothing by that identity exists. Absence is
    /// an answer, not an error.
    async fn find(
        &self,
        kind: ResourceKind,
        name: &str,
    ) -> Result<Option<RemoteState>, RemoteError>;

    /// Creates a resource. Handles for the descriptor's dependencies are
    /// provided so implementations can wire remote identifiers together.
    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        dependencies: &[ResourceHandle],
    ) -> Result<Created, RemoteError>;

    /// Reports the current status of a resource by remote identifier.
    async fn poll_status(
        &self,
        kind: ResourceKind,
        remote_id: &str,
    ) -> Result<RemoteStatus, RemoteError>;

    /// Deletes a resource. Kinds without a remote identity are addressed
    /// by `(kind, name)` alone.
    async fn delete(
        &self,
        kind: ResourceKind,
        name: &str,
        remote_id: Option<&str>,
    ) -> Result<DeleteOutcome, RemoteError>;
}
