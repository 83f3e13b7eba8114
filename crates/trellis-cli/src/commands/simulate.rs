//! Simulate command - deploy a manifest against an in-memory remote.
//!
//! A dry run with real engine semantics: ordering, dependency handles,
//! readiness polling, and skip sets all behave exactly as they would
//! against a live provider, but every remote call lands in process.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use owo_colors::OwoColorize;

use trellis_provision::{
    DeploymentReport, InMemoryRemote, MemoryProgress, Orchestrator, ProgressEvent,
    ProgressSink, RemoteErrorKind, ResourceStatus, Teardown, TeardownOutcome, TracingProgress,
    Transition,
};

use crate::manifest::Manifest;
use crate::{Config, OutputFormat};

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Path to the manifest file (JSON).
    #[arg(long, short = 'f', default_value = "trellis.json")]
    pub manifest_file: PathBuf,

    /// Stop at the first failure instead of finishing independent branches.
    #[arg(long)]
    pub abort_on_failure: bool,

    /// Seed every resource as already provisioned, so the run exercises
    /// the existence-check path end to end.
    #[arg(long)]
    pub pre_provisioned: bool,

    /// Inject a creation failure for the named resource.
    #[arg(long, value_name = "RESOURCE")]
    pub fail: Option<String>,

    /// Which failure the injected creation call reports.
    #[arg(long, default_value = "internal", requires = "fail")]
    pub fail_kind: FailKind,

    /// After the deploy, tear everything back down and show the sweep
    /// order.
    #[arg(long)]
    pub teardown: bool,
}

/// Failure classifications available for injection.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum FailKind {
    /// Throttling; retried with backoff until the policy gives up.
    Transient,
    /// Access denied; surfaces immediately.
    Permission,
    /// Name collision; reconciled through a fresh existence check.
    Conflict,
    /// Rejected spec; surfaces immediately.
    Validation,
    /// Provider-internal failure; surfaces immediately.
    Internal,
}

impl From<FailKind> for RemoteErrorKind {
    fn from(kind: FailKind) -> Self {
        match kind {
            FailKind::Transient => Self::Transient,
            FailKind::Permission => Self::Permission,
            FailKind::Conflict => Self::Conflict,
            FailKind::Validation => Self::Validation,
            FailKind::Internal => Self::Internal,
        }
    }
}

/// Execute the simulate command.
///
/// # Errors
///
/// Returns an error if the manifest cannot be read or its dependency
/// graph is invalid. Per-resource failures during the simulated run are
/// reported in the output, not as an error.
pub async fn execute(args: SimulateArgs, config: &Config) -> Result<()> {
    let manifest = Manifest::load(&args.manifest_file)?;

    let mut policy = manifest.policy.unwrap_or_default();
    if args.abort_on_failure {
        policy.abort_on_failure = true;
    }
    let driver_config = manifest.driver.unwrap_or_default();

    let mut remote = InMemoryRemote::new();
    if args.pre_provisioned {
        for descriptor in &manifest.resources {
            remote = remote.with_existing(descriptor.kind, &descriptor.name);
        }
    }
    if let Some(name) = &args.fail {
        remote = remote.fail_create(name, args.fail_kind.into());
    }
    let remote = Arc::new(remote);
    let orchestrator = Orchestrator::with_config(remote.clone(), driver_config);

    let mut progress = LoggedProgress::default();
    let mut report = orchestrator
        .deploy(manifest.resources.clone(), policy, &mut progress)
        .await?;

    let sweep = if args.teardown {
        let teardown = Teardown::new(remote);
        Some(teardown.run(&mut report.handles, &mut progress).await)
    } else {
        None
    };

    render(
        &manifest,
        &report,
        sweep.as_deref(),
        progress.captured.events(),
        config,
    )?;
    Ok(())
}

/// Streams each event through the log as it happens and retains it for
/// rendering once the run is over.
#[derive(Debug, Default)]
struct LoggedProgress {
    log: TracingProgress,
    captured: MemoryProgress,
}

impl ProgressSink for LoggedProgress {
    fn publish(&mut self, event: ProgressEvent) {
        self.log.publish(event.clone());
        self.captured.publish(event);
    }
}

fn render(
    manifest: &Manifest,
    report: &DeploymentReport,
    sweep: Option<&[TeardownOutcome]>,
    events: &[ProgressEvent],
    config: &Config,
) -> Result<()> {
    match config.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "name": manifest.name,
                    "report": report,
                    "teardown": sweep,
                    "events": events,
                }))?
            );
        }
        OutputFormat::Text => {
            match &manifest.name {
                Some(name) => println!("Simulated deployment of {name}:"),
                None => println!("Simulated deployment:"),
            }
            println!();
            for event in events {
                let detail = event
                    .detail
                    .as_deref()
                    .map(|d| format!("  ({d})"))
                    .unwrap_or_default();
                println!(
                    "  {:<28} {}{detail}",
                    event.resource_name,
                    colorize_transition(event.transition)
                );
            }
            println!();
            println!(
                "Outcome: {} ({} ready, {} failed, {} skipped)",
                report.outcome,
                report.ready_count(),
                report.errors.len(),
                report.skipped.len()
            );
            if let Some(outcomes) = sweep {
                let failed = outcomes.iter().filter(|o| !o.is_success()).count();
                println!(
                    "Teardown: {} resources swept, {} failed",
                    outcomes.len(),
                    failed
                );
            }
        }
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct Row {
                #[tabled(rename = "Resource")]
                name: String,
                #[tabled(rename = "Kind")]
                kind: String,
                #[tabled(rename = "Status")]
                status: String,
                #[tabled(rename = "Remote ID")]
                remote_id: String,
            }

            let rows: Vec<Row> = report
                .handles
                .iter()
                .map(|handle| Row {
                    name: handle.name.clone(),
                    kind: handle.kind.to_string(),
                    status: colorize_status(handle.status),
                    remote_id: handle.remote_id.clone().unwrap_or_default(),
                })
                .collect();

            println!("{}", Table::new(rows));
        }
    }
    Ok(())
}

fn colorize_transition(transition: Transition) -> String {
    match transition {
        Transition::Ready | Transition::Deleted => transition.to_string().green().to_string(),
        Transition::Failed | Transition::DeleteFailed => {
            transition.to_string().red().to_string()
        }
        Transition::Skipped => transition.to_string().yellow().to_string(),
        _ => transition.to_string(),
    }
}

fn colorize_status(status: ResourceStatus) -> String {
    match status {
        ResourceStatus::Ready => status.to_string().green().to_string(),
        ResourceStatus::Failed => status.to_string().red().to_string(),
        ResourceStatus::Pending | ResourceStatus::Creating => {
            status.to_string().yellow().to_string()
        }
        ResourceStatus::Deleted => status.to_string(),
    }
}
