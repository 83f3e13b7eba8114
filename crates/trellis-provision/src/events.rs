//! Progress events emitted while a deployment or teardown runs.
//!
//! The engine reports every observable lifecycle step through a
//! [`ProgressSink`] supplied by the caller, one [`ProgressEvent`] per
//! transition. Sinks are synchronous and infallible; anything slow or
//! fallible (terminals, files, channels) belongs behind the sink, not in
//! the provisioning path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::descriptor::ResourceKind;

/// An observable lifecycle step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transition {
    /// The resource already existed; creation was skipped.
    Found,
    /// A creation call is about to be issued.
    Creating,
    /// The creation call succeeded; readiness may still be pending.
    Created,
    /// The resource is usable.
    Ready,
    /// Provisioning failed; the event detail carries the cause.
    Failed,
    /// Skipped because a resource it depends on failed.
    Skipped,
    /// A deletion call is about to be issued.
    Deleting,
    /// The resource was removed.
    Deleted,
    /// Nothing by that identity existed at deletion time.
    AlreadyAbsent,
    /// The deletion call failed; the event detail carries the cause.
    DeleteFailed,
}

impl Transition {
    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::AlreadyAbsent => "already_absent",
            Self::DeleteFailed => "delete_failed",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

/// One step of one resource's lifecycle, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Position in the run, starting at 1. Strictly increasing per run.
    pub sequence: u64,
    /// Name of the resource the event concerns.
    pub resource_name: String,
    /// Kind of the resource the event concerns.
    pub kind: ResourceKind,
    /// Which lifecycle step occurred.
    pub transition: Transition,
    /// When the engine observed the step.
    pub timestamp: DateTime<Utc>,
    /// Human-readable context: the failure cause, the upstream resource
    /// a skip traces back to, and the like.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Receives progress events as the engine emits them.
pub trait ProgressSink {
    /// Accepts one event. Implementations must not block the caller.
    fn publish(&mut self, event: ProgressEvent);
}

/// Sink that retains every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemoryProgress {
    events: Vec<ProgressEvent>,
}

impl MemoryProgress {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the events received so far.
    #[must_use]
    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }

    /// Removes and returns all received events.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        std::mem::take(&mut self.events)
    }
}

impl ProgressSink for MemoryProgress {
    fn publish(&mut self, event: ProgressEvent) {
        self.events.push(event);
    }
}

/// Sink that logs each event at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn publish(&mut self, event: ProgressEvent) {
        tracing::info!(
            resource = %event.resource_name,
            kind = %event.kind,
            transition = %event.transition,
            detail = event.detail.as_deref().unwrap_or(""),
            "progress"
        );
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn publish(&mut self, _event: ProgressEvent) {}
}

/// Stamps and sequences events on their way to a sink.
///
/// One reporter exists per run, so sequence numbers are strictly
/// increasing across every resource in that run.
pub struct ProgressReporter<'a> {
    sink: &'a mut dyn ProgressSink,
    sequence: u64,
}

impl<'a> ProgressReporter<'a> {
    /// Wraps a sink for one run.
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, sequence: 0 }
    }

    /// Emits one event with the next sequence number and the current time.
    pub fn emit(
        &mut self,
        resource_name: &str,
        kind: ResourceKind,
        transition: Transition,
        detail: Option<String>,
    ) {
        self.sequence += 1;
        self.sink.publish(ProgressEvent {
            sequence: self.sequence,
            resource_name: resource_name.to_string(),
            kind,
            transition,
            timestamp: Utc::now(),
            detail,
        });
    }

    /// Returns how many events have been emitted.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl std::fmt::Debug for ProgressReporter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporter_sequences_from_one() {
        let mut sink = MemoryProgress::new();
        let mut reporter = ProgressReporter::new(&mut sink);
        reporter.emit("role", ResourceKind::Role, Transition::Creating, None);
        reporter.emit("role", ResourceKind::Role, Transition::Ready, None);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[1].sequence, 2);
        assert_eq!(events[0].transition, Transition::Creating);
        assert_eq!(events[1].transition, Transition::Ready);
    }

    #[test]
    fn drain_empties_the_sink() {
        let mut sink = MemoryProgress::new();
        let mut reporter = ProgressReporter::new(&mut sink);
        reporter.emit("b", ResourceKind::Bucket, Transition::Found, None);
        drop(reporter);

        let drained = sink.drain();
        assert_eq!(drained.len(), 1);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn event_json_omits_missing_detail() {
        let event = ProgressEvent {
            sequence: 1,
            resource_name: "kb".to_string(),
            kind: ResourceKind::RetrievalIndex,
            transition: Transition::Ready,
            timestamp: Utc::now(),
            detail: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("detail"));
        assert!(json.contains("\"resourceName\":\"kb\""));
        assert!(json.contains("\"transition\":\"ready\""));
    }

    #[test]
    fn transition_labels_are_snake_case() {
        assert_eq!(Transition::AlreadyAbsent.as_label(), "already_absent");
        assert_eq!(Transition::DeleteFailed.as_label(), "delete_failed");
    }
}
