//! Resource handles and the provisioning status machine.
//!
//! A [`ResourceHandle`] is the durable record of one resource's passage
//! through the engine: what it is, what the remote system calls it, where
//! it sits in the [`ResourceStatus`] lifecycle, and what went wrong if
//! anything did. Handles are plain data; the driver owns the transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::ResourceKind;
use crate::error::FailureCause;

/// Lifecycle status of a provisioned resource.
///
/// ```text
/// PENDING -> CREATING -> READY ---> DELETED
///    |           |         ^
///    |           +-> FAILED +-> DELETED
///    +-> READY (found already provisioned)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    /// Known to the plan, not yet acted on.
    Pending,
    /// Creation requested; the remote system is still materializing it.
    Creating,
    /// Exists remotely and is usable.
    Ready,
    /// Creation failed or readiness never arrived.
    Failed,
    /// Removed during teardown, or confirmed absent.
    Deleted,
}

impl ResourceStatus {
    /// Returns true if no further provisioning work applies.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Deleted)
    }

    /// Returns true if the engine may still be working on the resource.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Creating)
    }

    /// Returns whether the status machine permits moving to `next`.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Creating | Self::Ready | Self::Failed | Self::Deleted)
                | (Self::Creating, Self::Ready | Self::Failed | Self::Deleted)
                | (Self::Ready | Self::Failed, Self::Deleted)
        )
    }

    /// Returns the statuses reachable from this one.
    #[must_use]
    pub const fn valid_transitions(&self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Creating, Self::Ready, Self::Failed, Self::Deleted],
            Self::Creating => &[Self::Ready, Self::Failed, Self::Deleted],
            Self::Ready | Self::Failed => &[Self::Deleted],
            Self::Deleted => &[],
        }
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

/// The record of one resource produced by a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceHandle {
    /// Name from the originating descriptor.
    pub name: String,
    /// Kind from the originating descriptor.
    pub kind: ResourceKind,
    /// Identifier assigned by the remote system. `None` for kinds without
    /// a remote identity and for resources that never got created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// Where the resource sits in its lifecycle.
    pub status: ResourceStatus,
    /// True if the resource already existed and creation was skipped.
    pub preexisting: bool,
    /// Remote calls spent on creation, including retries.
    pub attempts: u32,
    /// When the engine first acted on this resource.
    pub created_at: DateTime<Utc>,
    /// When the resource was observed ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
    /// Why provisioning failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureCause>,
}

impl ResourceHandle {
    /// Creates a pending handle for a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            remote_id: None,
            status: ResourceStatus::Pending,
            preexisting: false,
            attempts: 0,
            created_at: Utc::now(),
            ready_at: None,
            error: None,
        }
    }

    /// Marks the resource ready and stamps the readiness time.
    pub fn mark_ready(&mut self) {
        self.status = ResourceStatus::Ready;
        self.ready_at = Some(Utc::now());
    }

    /// Marks the resource failed and records the cause.
    pub fn mark_failed(&mut self, cause: FailureCause) {
        self.status = ResourceStatus::Failed;
        self.error = Some(cause);
    }

    /// Returns true if the resource reached [`ResourceStatus::Ready`].
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.status == ResourceStatus::Ready
    }
}
