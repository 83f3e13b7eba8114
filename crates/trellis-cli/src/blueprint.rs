//! The starter blueprint written by `trellis init`.
//!
//! A worked example of a multi-agent document pipeline: two agents doing
//! the work, a supervisor coordinating them, and the storage, index, and
//! function resources they sit on. Every kind the engine knows appears at
//! least once, so the generated manifest doubles as a reference.

use serde_json::json;

use trellis_provision::{ResourceDescriptor, ResourceKind};

use crate::manifest::Manifest;

/// Builds the starter manifest.
#[must_use]
pub fn starter_manifest() -> Manifest {
    let resources = vec![
        ResourceDescriptor::new("agent-exec-role", ResourceKind::Role)
            .with_spec(json!({ "purpose": "agent-runtime" })),
        ResourceDescriptor::new("lambda-exec-role", ResourceKind::Role)
            .with_spec(json!({ "purpose": "function-runtime" })),
        ResourceDescriptor::new("artifact-bucket", ResourceKind::Bucket)
            .with_spec(json!({ "versioning": true })),
        ResourceDescriptor::new("kb-collection", ResourceKind::VectorCollection)
            .with_spec(json!({ "type": "vectorsearch" })),
        ResourceDescriptor::new("doc-index", ResourceKind::RetrievalIndex)
            .with_dependencies(["kb-collection", "artifact-bucket"])
            .with_spec(json!({
                "embeddingModel": "titan-embed-text-v2",
                "chunking": { "maxTokens": 512, "overlapPercentage": 20 },
            })),
        ResourceDescriptor::new("schema-lookup-fn", ResourceKind::Function)
            .with_dependency("lambda-exec-role")
            .with_spec(json!({
                "runtime": "python3.12",
                "handler": "schema_lookup.handler",
                "timeoutSeconds": 60,
            })),
        ResourceDescriptor::new("quality-check-fn", ResourceKind::Function)
            .with_dependency("lambda-exec-role")
            .with_spec(json!({
                "runtime": "python3.12",
                "handler": "quality_check.handler",
                "timeoutSeconds": 120,
            })),
        ResourceDescriptor::new("etl-worker", ResourceKind::Agent)
            .with_dependencies(["agent-exec-role", "schema-lookup-fn", "quality-check-fn"])
            .with_spec(json!({
                "foundationModel": "nova-pro",
                "instruction": "Extract records from incoming documents, validate them \
                                against the target schema, and flag quality issues.",
            })),
        ResourceDescriptor::new("kb-researcher", ResourceKind::Agent)
            .with_dependencies(["agent-exec-role", "doc-index"])
            .with_spec(json!({
                "foundationModel": "nova-pro",
                "instruction": "Answer questions by retrieving passages from the \
                                document index and citing them.",
            })),
        ResourceDescriptor::new("supervisor", ResourceKind::Agent)
            .with_dependency("agent-exec-role")
            .with_spec(json!({
                "foundationModel": "nova-pro",
                "instruction": "Coordinate the worker agents: route extraction tasks \
                                to the ETL worker and research questions to the \
                                knowledge-base researcher.",
            })),
        ResourceDescriptor::new("supervisor-to-etl", ResourceKind::Association)
            .with_dependencies(["supervisor", "etl-worker"])
            .with_spec(json!({
                "collaborationInstruction": "Delegate document extraction and \
                                             validation tasks to this agent.",
            })),
        ResourceDescriptor::new("supervisor-to-researcher", ResourceKind::Association)
            .with_dependencies(["supervisor", "kb-researcher"])
            .with_spec(json!({
                "collaborationInstruction": "Delegate retrieval and research \
                                             questions to this agent.",
            })),
    ];

    Manifest {
        name: Some("document-pipeline".to_string()),
        resources,
        policy: None,
        driver: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_manifest_is_deployable() {
        let manifest = starter_manifest();
        let plan = manifest.plan().unwrap();
        assert_eq!(plan.len(), 12);
    }

    #[test]
    fn starter_manifest_covers_every_kind() {
        let manifest = starter_manifest();
        for kind in [
            ResourceKind::Role,
            ResourceKind::Bucket,
            ResourceKind::VectorCollection,
            ResourceKind::Function,
            ResourceKind::RetrievalIndex,
            ResourceKind::Agent,
            ResourceKind::Association,
        ] {
            assert!(
                manifest.resources.iter().any(|d| d.kind == kind),
                "no {kind} resource in the starter manifest"
            );
        }
    }

    #[test]
    fn associations_come_after_both_agents() {
        let manifest = starter_manifest();
        let plan = manifest.plan().unwrap();
        let order = plan.creation_order();
        let position = |name: &str| order.iter().position(|n| *n == name).unwrap();

        assert!(position("supervisor-to-etl") > position("supervisor"));
        assert!(position("supervisor-to-etl") > position("etl-worker"));
        assert!(position("supervisor-to-researcher") > position("kb-researcher"));
    }

    #[test]
    fn roundtrips_through_json() {
        let manifest = starter_manifest();
        let json = serde_json::to_string(&manifest).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.resources, manifest.resources);
    }
}
