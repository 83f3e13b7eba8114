//! Resource descriptors and validated deployment plans.
//!
//! A [`ResourceDescriptor`] declares one resource: its name, kind,
//! dependencies, and an opaque spec payload the engine never interprets.
//! A [`Plan`] is a set of descriptors that has passed validation (unique
//! names, no self-dependencies, all dependencies resolvable, acyclic) and
//! carries its creation order. Plans are:
//!
//! - **Deterministic**: the same descriptors in the same order always
//!   produce the same creation order
//! - **Validated up front**: holding a `Plan` means no graph-shape error
//!   can occur later in the run

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dag::ResourceGraph;
use crate::error::Result;

/// The closed set of resource kinds the engine can provision.
///
/// The kind selects which provisioning strategy applies: whether the
/// resource becomes usable synchronously or needs readiness polling, and
/// whether the remote system assigns it an identifier of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// An identity role granting the other resources their permissions.
    Role,
    /// An object storage bucket.
    Bucket,
    /// A vector search collection backing a retrieval index.
    VectorCollection,
    /// A serverless compute function.
    Function,
    /// A retrieval index over a vector collection and a bucket.
    RetrievalIndex,
    /// A conversational agent definition.
    Agent,
    /// A link between two already-provisioned resources.
    Association,
}

/// How a kind's creation call completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Readiness {
    /// Usable as soon as the creation call returns.
    Immediate,
    /// Provisioned asynchronously; must be polled until ready.
    Polled,
}

impl ResourceKind {
    /// Returns how resources of this kind become ready.
    ///
    /// Vector collections, retrieval indexes, agents, and functions are
    /// provisioned asynchronously by their backing services and take
    /// anywhere from seconds to several minutes to become usable.
    #[must_use]
    pub const fn readiness(&self) -> Readiness {
        match self {
            Self::Function | Self::VectorCollection | Self::RetrievalIndex | Self::Agent => {
                Readiness::Polled
            }
            Self::Role | Self::Bucket | Self::Association => Readiness::Immediate,
        }
    }

    /// Returns true if the remote system assigns this kind its own identifier.
    ///
    /// Associations are link records between two endpoints; they have the
    /// same status lifecycle as other resources but no identity of their own.
    #[must_use]
    pub const fn has_remote_identity(&self) -> bool {
        !matches!(self, Self::Association)
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::Bucket => "bucket",
            Self::VectorCollection => "vector-collection",
            Self::Function => "function",
            Self::RetrievalIndex => "retrieval-index",
            Self::Agent => "agent",
            Self::Association => "association",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_label())
    }
}

/// A declarative request to provision one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Unique name within the deployment (e.g., "storage-bucket").
    pub name: String,
    /// Which provisioning strategy applies.
    pub kind: ResourceKind,
    /// Names of resources that must be ready before this one is created.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Kind-specific configuration, passed through to the remote system
    /// without interpretation.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub spec: Value,
}

impl ResourceDescriptor {
    /// Creates a descriptor with no dependencies and an empty spec.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            depends_on: Vec::new(),
            spec: Value::Null,
        }
    }

    /// Adds a dependency on another resource by name.
    #[must_use]
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Replaces the dependency list.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the opaque spec payload.
    #[must_use]
    pub fn with_spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }
}

/// A validated, creation-ordered set of resource descriptors.
///
/// Constructed through [`PlanBuilder`] or [`Plan::from_descriptors`]; any
/// `Plan` in hand is guaranteed acyclic with every dependency resolvable.
#[derive(Debug, Clone)]
pub struct Plan {
    descriptors: Vec<ResourceDescriptor>,
    graph: ResourceGraph,
}

impl Plan {
    /// Creates a new plan builder.
    #[must_use]
    pub fn builder() -> PlanBuilder {
        PlanBuilder::new()
    }

    /// Validates descriptors and orders them for creation.
    ///
    /// Resources with no ordering constraint between them keep their input
    /// order, so identical input always yields an identical plan.
    ///
    /// # Errors
    ///
    /// Returns an error if names are duplicated, a descriptor depends on
    /// itself or on an unknown name, or the dependency graph has a cycle.
    pub fn from_descriptors(descriptors: Vec<ResourceDescriptor>) -> Result<Self> {
        let graph = ResourceGraph::from_descriptors(&descriptors)?;
        let order = graph.creation_order()?;

        let mut by_name: std::collections::HashMap<String, ResourceDescriptor> = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        let ordered = order
            .iter()
            .filter_map(|name| by_name.remove(name))
            .collect();

        Ok(Self {
            descriptors: ordered,
            graph,
        })
    }

    /// Returns the descriptors in creation order.
    #[must_use]
    pub fn descriptors(&self) -> &[ResourceDescriptor] {
        &self.descriptors
    }

    /// Returns resource names in creation order.
    #[must_use]
    pub fn creation_order(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.name.as_str()).collect()
    }

    /// Returns the descriptor with the given name, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Returns every resource that transitively depends on `name`,
    /// in creation order. Unknown names yield an empty set.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.graph.dependents_of(name)
    }

    /// Returns the number of resources in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if the plan has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Builder for validated deployment plans.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    descriptors: Vec<ResourceDescriptor>,
}

impl PlanBuilder {
    /// Creates an empty plan builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource to the plan.
    #[must_use]
    pub fn add_resource(mut self, descriptor: ResourceDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Validates the descriptor set and produces an ordered plan.
    ///
    /// # Errors
    ///
    /// Returns an error if names are duplicated, a descriptor depends on
    /// itself or on an unknown name, or the dependency graph has a cycle.
    #[tracing::instrument(skip(self), fields(resource_count = self.descriptors.len()))]
    pub fn build(self) -> Result<Plan> {
        Plan::from_descriptors(self.descriptors)
    }
}
