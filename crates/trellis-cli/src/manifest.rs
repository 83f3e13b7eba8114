//! Manifest files: the on-disk form of a deployment.
//!
//! A manifest is a JSON document listing resource descriptors plus
//! optional policy and driver timing overrides. The engine itself never
//! reads files; this module is the only place paths turn into plans.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use trellis_provision::{DeployPolicy, DriverConfig, Plan, ResourceDescriptor};

/// A deployment manifest as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Optional human-facing name for the stack.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The resources to provision, in declaration order.
    pub resources: Vec<ResourceDescriptor>,
    /// Failure handling for deployments of this manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<DeployPolicy>,
    /// Driver timing overrides (retry backoff, readiness polling).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<DriverConfig>,
}

impl Manifest {
    /// Reads and parses a manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid
    /// manifest JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse manifest JSON: {}", path.display()))
    }

    /// Writes the manifest as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("failed to serialize manifest")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write manifest file: {}", path.display()))
    }

    /// Validates the resource set and returns its ordered plan.
    ///
    /// # Errors
    ///
    /// Returns the graph error (duplicate name, unknown or self
    /// dependency, cycle) that makes the manifest undeployable.
    pub fn plan(&self) -> Result<Plan> {
        Plan::from_descriptors(self.resources.clone()).context("manifest is not deployable")
    }

    /// Returns the descriptor with the given name, if declared.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&ResourceDescriptor> {
        self.resources.iter().find(|d| d.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_provision::ResourceKind;

    fn sample() -> Manifest {
        Manifest {
            name: Some("sample".to_string()),
            resources: vec![
                ResourceDescriptor::new("role", ResourceKind::Role),
                ResourceDescriptor::new("fn", ResourceKind::Function).with_dependency("role"),
            ],
            policy: None,
            driver: None,
        }
    }

    #[test]
    fn roundtrips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.json");

        sample().save(&path).unwrap();
        let loaded = Manifest::load(&path).unwrap();

        assert_eq!(loaded.name.as_deref(), Some("sample"));
        assert_eq!(loaded.resources.len(), 2);
        assert_eq!(loaded.resources[1].depends_on, vec!["role"]);
    }

    #[test]
    fn load_reports_the_path_on_missing_files() {
        let err = Manifest::load(Path::new("/nonexistent/stack.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/stack.json"));
    }

    #[test]
    fn plan_surfaces_graph_errors() {
        let mut manifest = sample();
        manifest.resources[0] = ResourceDescriptor::new("role", ResourceKind::Role)
            .with_dependency("fn");
        let err = manifest.plan().unwrap_err();
        assert!(err.to_string().contains("not deployable"));
    }

    #[test]
    fn minimal_manifest_json_parses() {
        let json = r#"{"resources":[{"name":"b","kind":"bucket"}]}"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert!(manifest.name.is_none());
        assert!(manifest.policy.is_none());
        assert_eq!(manifest.resources[0].kind, ResourceKind::Bucket);
    }
}
