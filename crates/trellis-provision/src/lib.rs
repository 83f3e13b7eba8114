//! Idempotent, dependency-ordered provisioning for agent stacks.
//!
//! The engine takes a set of [`ResourceDescriptor`]s, orders them by
//! dependency, and drives each one to readiness through a [`RemoteApi`]:
//!
//! - [`descriptor`]: resource declarations and validated plans
//! - [`dag`]: deterministic dependency ordering
//! - [`driver`]: single-resource provisioning with existence checks,
//!   conflict adoption, bounded retries, and readiness polling
//! - [`deploy`]: whole-plan orchestration that skips the dependents of a
//!   failed resource and finishes every independent branch
//! - [`teardown`]: best-effort removal in reverse creation order
//! - [`remote`]: the provider seam, plus an in-memory implementation
//! - [`events`]: progress reporting through caller-supplied sinks
//!
//! Re-running a deployment converges instead of duplicating work:
//! resources that already exist are adopted as-is, and an "already
//! exists" conflict from the remote system counts as success.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod dag;
pub mod deploy;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod events;
pub mod handle;
pub mod metrics;
pub mod remote;
pub mod teardown;

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::deploy::{DeployPolicy, DeploymentOutcome, DeploymentReport, Orchestrator};
    pub use crate::descriptor::{Plan, ResourceDescriptor, ResourceKind};
    pub use crate::driver::DriverConfig;
    pub use crate::error::{Error, FailureCause, FailureKind, Result};
    pub use crate::events::{MemoryProgress, ProgressSink, TracingProgress};
    pub use crate::handle::{ResourceHandle, ResourceStatus};
    pub use crate::remote::{InMemoryRemote, RemoteApi};
    pub use crate::teardown::{Teardown, TeardownOutcome};
}

pub use dag::ResourceGraph;
pub use deploy::{
    DeployPolicy, DeploymentOutcome, DeploymentReport, Orchestrator, ResourceFailure,
};
pub use descriptor::{Plan, PlanBuilder, Readiness, ResourceDescriptor, ResourceKind};
pub use driver::{DriverConfig, PollPolicy, ResourceDriver, RetryPolicy};
pub use error::{Error, FailureCause, FailureKind, Result};
pub use events::{
    MemoryProgress, NullProgress, ProgressEvent, ProgressReporter, ProgressSink, TracingProgress,
    Transition,
};
pub use handle::{ResourceHandle, ResourceStatus};
pub use metrics::ProvisionMetrics;
pub use remote::{
    CallCounters, Created, DeleteOutcome, InMemoryRemote, RemoteApi, RemoteError, RemoteErrorKind,
    RemoteState, RemoteStatus,
};
pub use teardown::{Teardown, TeardownDisposition, TeardownOutcome};
