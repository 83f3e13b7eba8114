//! Error types for the provisioning engine.
//!
//! Two layers of failure exist and are kept apart deliberately:
//!
//! - [`Error`]: graph-shape problems (cycles, unknown dependencies) that
//!   abort a deployment before any remote call is made.
//! - [`FailureCause`]: a per-resource failure recorded inside the deployment
//!   report. One resource failing never raises an error for the whole run.

use serde::{Deserialize, Serialize};

use crate::remote::{RemoteError, RemoteErrorKind};

/// The result type used throughout trellis-provision.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a deployment before provisioning starts.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected: {}", members.join(" -> "))]
    CycleDetected {
        /// Resource names participating in the cycle, in dependency order.
        members: Vec<String>,
    },

    /// A descriptor depends on a name that is not part of the deployment.
    #[error("resource '{resource}' depends on unknown resource '{dependency}'")]
    UnknownDependency {
        /// The resource declaring the dependency.
        resource: String,
        /// The name that could not be resolved.
        dependency: String,
    },

    /// A descriptor lists itself as a dependency.
    #[error("resource '{resource}' depends on itself")]
    SelfDependency {
        /// The offending resource name.
        resource: String,
    },

    /// Two descriptors share the same name.
    #[error("duplicate resource name '{name}' in deployment")]
    DuplicateResource {
        /// The name used more than once.
        name: String,
    },
}

impl Error {
    /// Creates a cycle error from the participating resource names.
    #[must_use]
    pub fn cycle(members: Vec<String>) -> Self {
        Self::CycleDetected { members }
    }

    /// Creates an unknown-dependency error.
    #[must_use]
    pub fn unknown_dependency(resource: impl Into<String>, dependency: impl Into<String>) -> Self {
        Self::UnknownDependency {
            resource: resource.into(),
            dependency: dependency.into(),
        }
    }
}

/// Classification of a per-resource failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// Rate limiting or temporary unavailability; retried before surfacing.
    Transient,
    /// The caller is not authorized for the operation. Never retried.
    Permission,
    /// A name collision the existence check could not reconcile. Never retried.
    Conflict,
    /// The resource spec was rejected by the remote system. Never retried.
    Validation,
    /// The readiness wait budget elapsed before the resource became usable.
    Timeout,
    /// The remote system reported the resource itself as failed.
    Remote,
}

impl FailureKind {
    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permission => "permission",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::Timeout => "timeout",
            Self::Remote => "remote",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

/// Why a single resource failed to provision or delete.
///
/// Stored on the failed handle and echoed in the deployment report's
/// error list. `attempts` counts remote calls made for the failing step,
/// so a transient failure that exhausted its retries is distinguishable
/// from one that failed outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct FailureCause {
    /// Failure classification.
    pub kind: FailureKind,
    /// Human-readable description from the remote system or the driver.
    pub message: String,
    /// Remote calls made for the step that failed.
    pub attempts: u32,
}

impl FailureCause {
    /// Creates a failure cause for a single-attempt failure.
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            attempts: 1,
        }
    }

    /// Creates a timeout cause for an exhausted readiness wait.
    #[must_use]
    pub fn timeout(budget: std::time::Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("resource not ready within {budget:?}"),
        )
    }

    /// Records how many remote calls were made before giving up.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Converts a remote error into a per-resource failure cause.
    #[must_use]
    pub fn from_remote(err: &RemoteError, attempts: u32) -> Self {
        let kind = match err.kind {
            RemoteErrorKind::Transient => FailureKind::Transient,
            RemoteErrorKind::Permission => FailureKind::Permission,
            RemoteErrorKind::Conflict => FailureKind::Conflict,
            RemoteErrorKind::Validation => FailureKind::Validation,
            RemoteErrorKind::NotFound | RemoteErrorKind::Internal => FailureKind::Remote,
        };
        Self {
            kind,
            message: err.message.clone(),
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = Error::cycle(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "dependency cycle detected: a -> b");

        let err = Error::unknown_dependency("agent", "missing-role");
        assert_eq!(
            err.to_string(),
            "resource 'agent' depends on unknown resource 'missing-role'"
        );

        let err = Error::SelfDependency {
            resource: "bucket".to_string(),
        };
        assert_eq!(err.to_string(), "resource 'bucket' depends on itself");
    }

    #[test]
    fn failure_cause_display_prefixes_kind() {
        let cause = FailureCause::new(FailureKind::Permission, "access denied");
        assert_eq!(cause.to_string(), "permission: access denied");
    }

    #[test]
    fn from_remote_maps_kinds() {
        let err = RemoteError::transient("throttled");
        let cause = FailureCause::from_remote(&err, 4);
        assert_eq!(cause.kind, FailureKind::Transient);
        assert_eq!(cause.attempts, 4);

        let err = RemoteError::validation("bad spec");
        assert_eq!(
            FailureCause::from_remote(&err, 1).kind,
            FailureKind::Validation
        );

        let err = RemoteError::internal("wedged");
        assert_eq!(FailureCause::from_remote(&err, 1).kind, FailureKind::Remote);
    }

    #[test]
    fn timeout_cause_mentions_budget() {
        let cause = FailureCause::timeout(std::time::Duration::from_secs(600));
        assert_eq!(cause.kind, FailureKind::Timeout);
        assert!(cause.message.contains("600s"));
    }
}
