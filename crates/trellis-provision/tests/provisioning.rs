//! End-to-end deployment and teardown scenarios against the in-memory
//! remote: convergence, idempotent re-runs, failure isolation, abort,
//! cancellation, and reverse-order teardown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use trellis_provision::{
    DeployPolicy, DeploymentOutcome, DeploymentReport, DriverConfig, FailureKind, InMemoryRemote,
    MemoryProgress, Orchestrator, PollPolicy, ProgressEvent, ProgressSink, RemoteErrorKind,
    ResourceDescriptor, ResourceKind, ResourceStatus, Teardown, TeardownDisposition, Transition,
};

/// A small agent stack: a role, an independent bucket, a function that
/// needs the role, and an agent that needs the role and the function.
fn agent_stack() -> Vec<ResourceDescriptor> {
    vec![
        ResourceDescriptor::new("exec-role", ResourceKind::Role),
        ResourceDescriptor::new("assets", ResourceKind::Bucket),
        ResourceDescriptor::new("lookup-fn", ResourceKind::Function).with_dependency("exec-role"),
        ResourceDescriptor::new("supervisor", ResourceKind::Agent)
            .with_dependencies(["exec-role", "lookup-fn"]),
    ]
}

fn orchestrator(remote: &InMemoryRemote) -> Orchestrator {
    Orchestrator::new(Arc::new(remote.clone()))
}

/// A resource appears in `errors` exactly when its handle is failed, and
/// skipped resources have no handle at all.
fn assert_report_invariants(report: &DeploymentReport) {
    for failure in &report.errors {
        let handle = report.handle(&failure.name).expect("failed handle present");
        assert_eq!(handle.status, ResourceStatus::Failed, "{}", failure.name);
    }
    for handle in &report.handles {
        let in_errors = report.errors.iter().any(|e| e.name == handle.name);
        assert_eq!(handle.status == ResourceStatus::Failed, in_errors, "{}", handle.name);
        assert!(!report.skipped.contains(&handle.name), "{}", handle.name);
    }
}

fn names(report: &DeploymentReport) -> Vec<&str> {
    report.handles.iter().map(|h| h.name.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn full_stack_converges_in_dependency_order() {
    let remote = InMemoryRemote::new();
    let mut progress = MemoryProgress::new();

    let report = orchestrator(&remote)
        .deploy(agent_stack(), DeployPolicy::default(), &mut progress)
        .await
        .unwrap();

    assert_eq!(report.outcome, DeploymentOutcome::Converged);
    assert_eq!(
        names(&report),
        vec!["exec-role", "assets", "lookup-fn", "supervisor"]
    );
    assert!(report.handles.iter().all(|h| h.is_ready()));
    assert!(report.errors.is_empty());
    assert!(report.skipped.is_empty());
    assert_eq!(remote.counters().creates, 4);
    assert_report_invariants(&report);
}

#[tokio::test(start_paused = true)]
async fn second_run_adopts_everything_with_zero_creation_calls() {
    let remote = InMemoryRemote::new();
    let orchestrator = orchestrator(&remote);

    let mut progress = MemoryProgress::new();
    let first = orchestrator
        .deploy(agent_stack(), DeployPolicy::default(), &mut progress)
        .await
        .unwrap();
    assert!(first.is_converged());
    assert_eq!(remote.counters().creates, 4);

    let mut progress = MemoryProgress::new();
    let second = orchestrator
        .deploy(agent_stack(), DeployPolicy::default(), &mut progress)
        .await
        .unwrap();

    assert!(second.is_converged());
    assert_eq!(remote.counters().creates, 4, "no new creation calls");
    assert!(second.handles.iter().all(|h| h.preexisting));
    assert!(progress
        .events()
        .iter()
        .all(|e| e.transition != Transition::Creating));
}

#[tokio::test(start_paused = true)]
async fn failure_skips_transitive_dependents_and_finishes_independents() {
    let remote = InMemoryRemote::new().fail_create("exec-role", RemoteErrorKind::Permission);
    let mut progress = MemoryProgress::new();

    let report = orchestrator(&remote)
        .deploy(agent_stack(), DeployPolicy::default(), &mut progress)
        .await
        .unwrap();

    assert_eq!(report.outcome, DeploymentOutcome::Partial);
    assert_eq!(names(&report), vec!["exec-role", "assets"]);
    assert_eq!(
        report.handle("exec-role").map(|h| h.status),
        Some(ResourceStatus::Failed)
    );
    assert_eq!(
        report.handle("assets").map(|h| h.status),
        Some(ResourceStatus::Ready)
    );
    assert_eq!(report.skipped, vec!["lookup-fn", "supervisor"]);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].name, "exec-role");
    assert_eq!(report.errors[0].cause.kind, FailureKind::Permission);
    assert_report_invariants(&report);

    // Skip events name the upstream failure they trace back to.
    let skip_details: Vec<&str> = progress
        .events()
        .iter()
        .filter(|e| e.transition == Transition::Skipped)
        .filter_map(|e| e.detail.as_deref())
        .collect();
    assert_eq!(skip_details.len(), 2);
    assert!(skip_details
        .iter()
        .all(|detail| detail.contains("exec-role")));
}

#[tokio::test(start_paused = true)]
async fn abort_on_failure_stops_at_the_first_failure() {
    let remote = InMemoryRemote::new().fail_create("exec-role", RemoteErrorKind::Validation);
    let mut progress = MemoryProgress::new();

    let report = orchestrator(&remote)
        .deploy(
            agent_stack(),
            DeployPolicy {
                abort_on_failure: true,
            },
            &mut progress,
        )
        .await
        .unwrap();

    assert_eq!(report.outcome, DeploymentOutcome::Aborted);
    assert_eq!(names(&report), vec!["exec-role"]);
    assert!(report.skipped.is_empty(), "nothing after the abort is attempted");
    assert_eq!(remote.counters().creates, 1);
    assert_report_invariants(&report);
}

#[tokio::test(start_paused = true)]
async fn losing_a_creation_race_still_converges() {
    let remote = InMemoryRemote::new().conflict_with_concurrent_create("assets");
    let mut progress = MemoryProgress::new();

    let report = orchestrator(&remote)
        .deploy(agent_stack(), DeployPolicy::default(), &mut progress)
        .await
        .unwrap();

    assert!(report.is_converged());
    let assets = report.handle("assets").expect("assets handle");
    assert!(assets.is_ready());
    assert!(assets.preexisting, "adopted after the conflict");
    assert!(report.errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn readiness_timeout_fails_the_resource_and_skips_its_dependents() {
    let remote = InMemoryRemote::new().never_ready("lookup-fn");
    let config = DriverConfig {
        poll: PollPolicy {
            interval: Duration::from_secs(10),
            budget: Duration::from_secs(60),
        },
        ..DriverConfig::default()
    };
    let orchestrator = Orchestrator::with_config(Arc::new(remote.clone()), config);
    let mut progress = MemoryProgress::new();

    let report = orchestrator
        .deploy(agent_stack(), DeployPolicy::default(), &mut progress)
        .await
        .unwrap();

    assert_eq!(report.outcome, DeploymentOutcome::Partial);
    let failed = report.handle("lookup-fn").expect("lookup-fn handle");
    assert_eq!(failed.status, ResourceStatus::Failed);
    assert_eq!(
        failed.error.as_ref().map(|e| e.kind),
        Some(FailureKind::Timeout)
    );
    assert_eq!(report.skipped, vec!["supervisor"]);
    assert!(report.handle("exec-role").is_some_and(|h| h.is_ready()));
    assert!(report.handle("assets").is_some_and(|h| h.is_ready()));
    assert_report_invariants(&report);
}

#[tokio::test]
async fn cancellation_before_the_run_touches_nothing() {
    let remote = InMemoryRemote::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut progress = MemoryProgress::new();

    let report = orchestrator(&remote)
        .deploy_cancellable(agent_stack(), DeployPolicy::default(), &mut progress, &cancel)
        .await
        .unwrap();

    assert_eq!(report.outcome, DeploymentOutcome::Cancelled);
    assert!(report.handles.is_empty());
    assert_eq!(remote.counters().finds, 0);
    assert_eq!(remote.counters().creates, 0);
}

/// Sink that cancels a token once a given resource reports a transition,
/// driving cancellation from inside a running deployment.
struct CancelOn {
    inner: MemoryProgress,
    token: CancellationToken,
    resource: &'static str,
    transition: Transition,
}

impl ProgressSink for CancelOn {
    fn publish(&mut self, event: ProgressEvent) {
        if event.resource_name == self.resource && event.transition == self.transition {
            self.token.cancel();
        }
        self.inner.publish(event);
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_run_starts_no_further_resources() {
    let remote = InMemoryRemote::new();
    let cancel = CancellationToken::new();
    let mut progress = CancelOn {
        inner: MemoryProgress::new(),
        token: cancel.clone(),
        resource: "assets",
        transition: Transition::Ready,
    };

    let report = orchestrator(&remote)
        .deploy_cancellable(agent_stack(), DeployPolicy::default(), &mut progress, &cancel)
        .await
        .unwrap();

    assert_eq!(report.outcome, DeploymentOutcome::Cancelled);
    assert_eq!(names(&report), vec!["exec-role", "assets"]);
    assert!(report.handles.iter().all(|h| h.is_ready()));
    assert_eq!(remote.counters().creates, 2, "lookup-fn never started");
}

#[tokio::test(start_paused = true)]
async fn teardown_sweeps_in_reverse_creation_order() {
    let remote = InMemoryRemote::new();
    let mut progress = MemoryProgress::new();
    let mut report = orchestrator(&remote)
        .deploy(agent_stack(), DeployPolicy::default(), &mut progress)
        .await
        .unwrap();

    let teardown = Teardown::new(Arc::new(remote.clone()));
    let mut progress = MemoryProgress::new();
    let outcomes = teardown.run(&mut report.handles, &mut progress).await;

    let swept: Vec<&str> = outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(swept, vec!["supervisor", "lookup-fn", "assets", "exec-role"]);
    assert!(outcomes.iter().all(|o| o.is_success()));
    assert_eq!(remote.counters().deletes, 4);
    for descriptor in agent_stack() {
        assert!(!remote.contains(descriptor.kind, &descriptor.name));
    }
}

#[tokio::test(start_paused = true)]
async fn teardown_keeps_sweeping_past_failures_and_is_rerunnable() {
    let remote = InMemoryRemote::new().fail_delete("assets", RemoteErrorKind::Internal);
    let mut progress = MemoryProgress::new();
    let mut report = orchestrator(&remote)
        .deploy(agent_stack(), DeployPolicy::default(), &mut progress)
        .await
        .unwrap();

    let teardown = Teardown::new(Arc::new(remote.clone()));
    let mut progress = MemoryProgress::new();
    let first = teardown.run(&mut report.handles, &mut progress).await;

    let failed: Vec<&str> = first
        .iter()
        .filter(|o| !o.is_success())
        .map(|o| o.name.as_str())
        .collect();
    assert_eq!(failed, vec!["assets"]);
    assert_eq!(
        first.iter().filter(|o| o.disposition == TeardownDisposition::Deleted).count(),
        3,
        "the sweep continued past the failure"
    );

    // A second sweep only revisits what is still standing.
    let deletes_after_first = remote.counters().deletes;
    let mut progress = MemoryProgress::new();
    let second = teardown.run(&mut report.handles, &mut progress).await;
    assert!(second
        .iter()
        .filter(|o| o.name != "assets")
        .all(|o| o.disposition == TeardownDisposition::AlreadyAbsent));
    assert_eq!(
        remote.counters().deletes,
        deletes_after_first + 1,
        "only the failed resource is re-attempted"
    );
}

#[tokio::test(start_paused = true)]
async fn associations_ride_along_without_a_remote_identifier() {
    let descriptors = vec![
        ResourceDescriptor::new("exec-role", ResourceKind::Role),
        ResourceDescriptor::new("supervisor", ResourceKind::Agent).with_dependency("exec-role"),
        ResourceDescriptor::new("collab", ResourceKind::Agent).with_dependency("exec-role"),
        ResourceDescriptor::new("sup-to-collab", ResourceKind::Association)
            .with_dependencies(["supervisor", "collab"]),
    ];
    let remote = InMemoryRemote::new();
    let mut progress = MemoryProgress::new();

    let mut report = orchestrator(&remote)
        .deploy(descriptors, DeployPolicy::default(), &mut progress)
        .await
        .unwrap();

    assert!(report.is_converged());
    let association = report.handle("sup-to-collab").expect("association handle");
    assert!(association.is_ready());
    assert!(association.remote_id.is_none());

    // Teardown addresses it by kind and name alone.
    let teardown = Teardown::new(Arc::new(remote.clone()));
    let mut progress = MemoryProgress::new();
    let outcomes = teardown.run(&mut report.handles, &mut progress).await;
    assert!(outcomes.iter().all(|o| o.is_success()));
    assert!(!remote.contains(ResourceKind::Association, "sup-to-collab"));
}

#[tokio::test(start_paused = true)]
async fn identical_inputs_produce_identical_runs() {
    let run = |remote: InMemoryRemote| async move {
        let mut progress = MemoryProgress::new();
        let report = orchestrator(&remote)
            .deploy(agent_stack(), DeployPolicy::default(), &mut progress)
            .await
            .unwrap();
        let handles: Vec<String> = report.handles.iter().map(|h| h.name.clone()).collect();
        let events: Vec<(String, Transition)> = progress
            .events()
            .iter()
            .map(|e| (e.resource_name.clone(), e.transition))
            .collect();
        (handles, events)
    };

    let (handles_a, events_a) = run(InMemoryRemote::new()).await;
    let (handles_b, events_b) = run(InMemoryRemote::new()).await;
    assert_eq!(handles_a, handles_b);
    assert_eq!(events_a, events_b);
}
