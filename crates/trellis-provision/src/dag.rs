//! Dependency graph construction and deterministic creation ordering.
//!
//! [`ResourceGraph`] holds the dependency relation between descriptors as a
//! directed graph with one edge per `(dependency, dependent)` pair. Ordering
//! uses Kahn's algorithm with ties broken by descriptor input order, so the
//! creation order is a pure function of the input:
//!
//! - Nodes are seeded and drained in insertion order
//! - Cycles are reported with the participating resource names, not just
//!   the fact that one exists

use std::collections::{BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::descriptor::ResourceDescriptor;
use crate::error::{Error, Result};

/// A directed graph over resource names, edges pointing from a dependency
/// to the resources that require it.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    graph: DiGraph<String, ()>,
    index_map: HashMap<String, NodeIndex>,
    insertion_order: Vec<NodeIndex>,
}

impl ResourceGraph {
    /// Builds the graph from a descriptor set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateResource`] if two descriptors share a name,
    /// [`Error::SelfDependency`] if a descriptor depends on itself, and
    /// [`Error::UnknownDependency`] if a dependency names no descriptor.
    pub fn from_descriptors(descriptors: &[ResourceDescriptor]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index_map = HashMap::with_capacity(descriptors.len());
        let mut insertion_order = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if index_map.contains_key(&descriptor.name) {
                return Err(Error::DuplicateResource {
                    name: descriptor.name.clone(),
                });
            }
            let index = graph.add_node(descriptor.name.clone());
            index_map.insert(descriptor.name.clone(), index);
            insertion_order.push(index);
        }

        for descriptor in descriptors {
            let dependent = index_map[&descriptor.name];
            for dependency in &descriptor.depends_on {
                if *dependency == descriptor.name {
                    return Err(Error::SelfDependency {
                        resource: descriptor.name.clone(),
                    });
                }
                let Some(&provider) = index_map.get(dependency) else {
                    return Err(Error::unknown_dependency(&descriptor.name, dependency));
                };
                graph.add_edge(provider, dependent, ());
            }
        }

        Ok(Self {
            graph,
            index_map,
            insertion_order,
        })
    }

    /// Returns the number of resources in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns true if the graph contains a resource with the given name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index_map.contains_key(name)
    }

    /// Computes a topological creation order using Kahn's algorithm.
    ///
    /// When several resources are simultaneously unblocked, the one that
    /// appeared earliest in the input wins, so repeated runs over the same
    /// descriptors always produce the same order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] naming the members of one cycle if
    /// the graph is not acyclic.
    pub fn creation_order(&self) -> Result<Vec<String>> {
        let position = self.positions();

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .insertion_order
            .iter()
            .map(|&node| {
                let degree = self
                    .graph
                    .neighbors_directed(node, Direction::Incoming)
                    .count();
                (node, degree)
            })
            .collect();

        // Ready set keyed by input position, so ties drain in input order.
        let mut ready: BTreeSet<(usize, NodeIndex)> = self
            .insertion_order
            .iter()
            .copied()
            .filter(|node| in_degree[node] == 0)
            .map(|node| (position[&node], node))
            .collect();

        let mut order = Vec::with_capacity(self.insertion_order.len());
        let mut resolved: BTreeSet<NodeIndex> = BTreeSet::new();

        while let Some((_, node)) = ready.pop_first() {
            if let Some(name) = self.graph.node_weight(node) {
                order.push(name.clone());
            }
            resolved.insert(node);
            for neighbor in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if let Some(degree) = in_degree.get_mut(&neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert((position[&neighbor], neighbor));
                    }
                }
            }
        }

        if order.len() != self.insertion_order.len() {
            return Err(Error::CycleDetected {
                members: self.cycle_members(&resolved),
            });
        }

        Ok(order)
    }

    /// Returns every resource that transitively depends on `name`, ordered
    /// by input position. Unknown names yield an empty set.
    #[must_use]
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        let Some(&start) = self.index_map.get(name) else {
            return Vec::new();
        };
        let position = self.positions();

        let mut seen: BTreeSet<NodeIndex> = BTreeSet::new();
        let mut frontier = vec![start];
        while let Some(node) = frontier.pop() {
            for neighbor in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if seen.insert(neighbor) {
                    frontier.push(neighbor);
                }
            }
        }

        let mut dependents: Vec<NodeIndex> = seen.into_iter().collect();
        dependents.sort_by_key(|node| position[node]);
        dependents
            .iter()
            .filter_map(|&node| self.graph.node_weight(node).cloned())
            .collect()
    }

    fn positions(&self) -> HashMap<NodeIndex, usize> {
        self.insertion_order
            .iter()
            .enumerate()
            .map(|(position, &node)| (node, position))
            .collect()
    }

    /// Extracts the members of one cycle from the unresolved remainder of
    /// an incomplete Kahn pass.
    ///
    /// Every unresolved node still has an unresolved dependency, so walking
    /// the earliest-input unresolved dependency from the earliest-input
    /// unresolved node must revisit a node; the revisited segment is a
    /// cycle. The walk is deterministic, so the reported members are too.
    fn cycle_members(&self, resolved: &BTreeSet<NodeIndex>) -> Vec<String> {
        let position = self.positions();
        let Some(start) = self
            .insertion_order
            .iter()
            .copied()
            .find(|node| !resolved.contains(node))
        else {
            return Vec::new();
        };

        let mut seen_at: HashMap<NodeIndex, usize> = HashMap::new();
        let mut path: Vec<NodeIndex> = Vec::new();
        let mut current = start;
        loop {
            if let Some(&first_visit) = seen_at.get(&current) {
                return path[first_visit..]
                    .iter()
                    .filter_map(|&node| self.graph.node_weight(node).cloned())
                    .collect();
            }
            seen_at.insert(current, path.len());
            path.push(current);

            let mut pending: Vec<NodeIndex> = self
                .graph
                .neighbors_directed(current, Direction::Incoming)
                .filter(|node| !resolved.contains(node))
                .collect();
            pending.sort_by_key(|node| position[node]);
            match pending.first() {
                Some(&next) => current = next,
                None => {
                    return path
                        .iter()
                        .filter_map(|&node| self.graph.node_weight(node).cloned())
                        .collect()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ResourceKind;

    fn descriptor(name: &str, deps: &[&str]) -> ResourceDescriptor {
        ResourceDescriptor::new(name, ResourceKind::Bucket)
            .with_dependencies(deps.iter().copied())
    }

    fn graph(specs: &[(&str, &[&str])]) -> Result<ResourceGraph> {
        let descriptors: Vec<ResourceDescriptor> = specs
            .iter()
            .map(|(name, deps)| descriptor(name, deps))
            .collect();
        ResourceGraph::from_descriptors(&descriptors)
    }

    #[test]
    fn orders_linear_chain() {
        let graph = graph(&[("c", &["b"]), ("b", &["a"]), ("a", &[])]).unwrap();
        assert_eq!(graph.creation_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn independent_nodes_keep_input_order() {
        let graph = graph(&[("x", &[]), ("m", &[]), ("a", &[])]).unwrap();
        assert_eq!(graph.creation_order().unwrap(), vec!["x", "m", "a"]);
    }

    #[test]
    fn ties_after_shared_dependency_break_by_input_order() {
        let graph = graph(&[("root", &[]), ("z", &["root"]), ("a", &["root"])]).unwrap();
        assert_eq!(graph.creation_order().unwrap(), vec!["root", "z", "a"]);
    }

    #[test]
    fn diamond_resolves_deterministically() {
        let graph = graph(&[
            ("top", &[]),
            ("left", &["top"]),
            ("right", &["top"]),
            ("bottom", &["left", "right"]),
        ])
        .unwrap();
        assert_eq!(
            graph.creation_order().unwrap(),
            vec!["top", "left", "right", "bottom"]
        );
    }

    #[test]
    fn duplicate_names_rejected() {
        let result = graph(&[("a", &[]), ("a", &[])]);
        assert!(matches!(result, Err(Error::DuplicateResource { name }) if name == "a"));
    }

    #[test]
    fn self_dependency_rejected() {
        let result = graph(&[("a", &["a"])]);
        assert!(matches!(result, Err(Error::SelfDependency { resource }) if resource == "a"));
    }

    #[test]
    fn unknown_dependency_rejected() {
        let result = graph(&[("a", &["missing"])]);
        assert!(matches!(
            result,
            Err(Error::UnknownDependency { resource, dependency })
                if resource == "a" && dependency == "missing"
        ));
    }

    #[test]
    fn two_node_cycle_names_both_members() {
        let graph = graph(&[("a", &["b"]), ("b", &["a"])]).unwrap();
        let Err(Error::CycleDetected { members }) = graph.creation_order() else {
            panic!("expected cycle error");
        };
        assert_eq!(members.len(), 2);
        assert!(members.contains(&"a".to_string()));
        assert!(members.contains(&"b".to_string()));
    }

    #[test]
    fn cycle_report_excludes_nodes_merely_downstream_of_the_cycle() {
        // "tail" depends on the cycle but is not part of it.
        let graph = graph(&[("a", &["b"]), ("b", &["a"]), ("tail", &["a"])]).unwrap();
        let Err(Error::CycleDetected { members }) = graph.creation_order() else {
            panic!("expected cycle error");
        };
        assert!(!members.contains(&"tail".to_string()));
        assert!(members.contains(&"a".to_string()));
        assert!(members.contains(&"b".to_string()));
    }

    #[test]
    fn cycle_alongside_valid_subgraph_is_still_detected() {
        let graph = graph(&[("ok", &[]), ("a", &["b"]), ("b", &["a"])]).unwrap();
        assert!(matches!(
            graph.creation_order(),
            Err(Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn dependents_are_transitive() {
        let graph = graph(&[
            ("role", &[]),
            ("bucket", &[]),
            ("fn", &["role"]),
            ("agent", &["role", "fn"]),
        ])
        .unwrap();
        assert_eq!(graph.dependents_of("role"), vec!["fn", "agent"]);
        assert_eq!(graph.dependents_of("fn"), vec!["agent"]);
        assert!(graph.dependents_of("agent").is_empty());
        assert!(graph.dependents_of("unknown").is_empty());
    }

    #[test]
    fn dependents_of_shared_dependency_are_input_ordered() {
        let graph = graph(&[
            ("root", &[]),
            ("late", &["mid"]),
            ("mid", &["root"]),
            ("early", &["root"]),
        ])
        .unwrap();
        assert_eq!(graph.dependents_of("root"), vec!["late", "mid", "early"]);
    }
}
