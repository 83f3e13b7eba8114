//! Metric names, labels, and recording helpers.
//!
//! Everything goes through the `metrics` facade; binaries choose the
//! exporter. Names are namespaced under `trellis_` and kept in one place
//! so dashboards and alert rules have a single source of truth.

use crate::descriptor::ResourceKind;
use crate::events::Transition;

/// Metric names recorded by the provisioning engine.
pub mod names {
    /// Counter: resources that reached a terminal provisioning outcome,
    /// labeled by kind and outcome.
    pub const RESOURCES_PROVISIONED_TOTAL: &str = "trellis_resources_provisioned_total";
    /// Counter: remote calls retried after a transient failure, labeled
    /// by kind.
    pub const PROVISION_RETRIES_TOTAL: &str = "trellis_provision_retries_total";
    /// Histogram: seconds spent waiting for a resource to become ready,
    /// labeled by kind.
    pub const WAIT_READY_SECONDS: &str = "trellis_wait_ready_seconds";
    /// Histogram: end-to-end deployment duration in seconds, labeled by
    /// outcome.
    pub const DEPLOYMENT_SECONDS: &str = "trellis_deployment_seconds";
    /// Counter: teardown results, labeled by kind and disposition.
    pub const RESOURCES_DELETED_TOTAL: &str = "trellis_resources_deleted_total";
}

/// Label keys attached to the metrics above.
pub mod labels {
    /// Resource kind label.
    pub const KIND: &str = "kind";
    /// Terminal outcome label (`ready`, `failed`, `skipped`).
    pub const OUTCOME: &str = "outcome";
    /// Teardown disposition label (`deleted`, `already_absent`, `failed`).
    pub const DISPOSITION: &str = "disposition";
}

/// Records engine metrics through the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProvisionMetrics;

impl ProvisionMetrics {
    /// Creates a recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records a resource reaching a terminal provisioning outcome.
    pub fn record_resource_outcome(&self, kind: ResourceKind, transition: Transition) {
        metrics::counter!(
            names::RESOURCES_PROVISIONED_TOTAL,
            labels::KIND => kind.as_label(),
            labels::OUTCOME => transition.as_label(),
        )
        .increment(1);
    }

    /// Records remote-call retries spent on one resource.
    pub fn record_retries(&self, kind: ResourceKind, retries: u32) {
        if retries == 0 {
            return;
        }
        metrics::counter!(
            names::PROVISION_RETRIES_TOTAL,
            labels::KIND => kind.as_label(),
        )
        .increment(u64::from(retries));
    }

    /// Records how long a resource took to become ready.
    pub fn observe_wait_ready(&self, kind: ResourceKind, seconds: f64) {
        metrics::histogram!(
            names::WAIT_READY_SECONDS,
            labels::KIND => kind.as_label(),
        )
        .record(seconds);
    }

    /// Records the duration of a whole deployment.
    pub fn observe_deployment(&self, outcome: &'static str, seconds: f64) {
        metrics::histogram!(
            names::DEPLOYMENT_SECONDS,
            labels::OUTCOME => outcome,
        )
        .record(seconds);
    }

    /// Records one teardown result.
    pub fn record_deletion(&self, kind: ResourceKind, disposition: &'static str) {
        metrics::counter!(
            names::RESOURCES_DELETED_TOTAL,
            labels::KIND => kind.as_label(),
            labels::DISPOSITION => disposition,
        )
        .increment(1);
    }
}
