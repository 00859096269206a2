use async_trait::async_trait;
use common::types::{parse_semver, WorkflowDefinition};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("workflow not found: {0} (version {1})")]
    NotFound(String, String),
}

/// One of the four external collaborators (§6). Version `"latest"` resolves
/// to the highest semantic version registered for the id.
#[async_trait]
pub trait DefinitionLoader: Send + Sync {
    async fn load_workflow(
        &self,
        workflow_id: &str,
        version: &str,
    ) -> Result<WorkflowDefinition, LoaderError>;
}

/// In-process loader backed by a map, keyed by (id, version). Used by the
/// CLI when pointed at a local JSON file, and throughout the test suite.
#[derive(Default)]
pub struct InMemoryDefinitionLoader {
    definitions: RwLock<HashMap<String, Vec<WorkflowDefinition>>>,
}

impl InMemoryDefinitionLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, def: WorkflowDefinition) {
        let mut map = self.definitions.write().unwrap();
        map.entry(def.id.clone()).or_default().push(def);
    }
}

#[async_trait]
impl DefinitionLoader for InMemoryDefinitionLoader {
    async fn load_workflow(
        &self,
        workflow_id: &str,
        version: &str,
    ) -> Result<WorkflowDefinition, LoaderError> {
        let map = self.definitions.read().unwrap();
        let versions = map
            .get(workflow_id)
            .ok_or_else(|| LoaderError::NotFound(workflow_id.to_string(), version.to_string()))?;

        if version == "latest" {
            versions
                .iter()
                .max_by_key(|d| parse_semver(&d.version))
                .cloned()
                .ok_or_else(|| LoaderError::NotFound(workflow_id.to_string(), version.to_string()))
        } else {
            versions
                .iter()
                .find(|d| d.version == version)
                .cloned()
                .ok_or_else(|| LoaderError::NotFound(workflow_id.to_string(), version.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::{Node, NodeKind, Position, UserInputConfig, InputType};

    fn def(id: &str, version: &str) -> WorkflowDefinition {
        WorkflowDefinition {
            id: id.to_string(),
            version: version.to_string(),
            name: "test".to_string(),
            description: None,
            nodes: vec![Node {
                id: "n1".to_string(),
                name: "n1".to_string(),
                position: Position::default(),
                kind: NodeKind::UserInput(UserInputConfig {
                    prompt: "p".to_string(),
                    input_type: InputType::Text,
                    required: false,
                    validation: None,
                    options: None,
                    default_value: None,
                }),
                timeout_ms: None,
                retry_config: None,
                context_config: Default::default(),
            }],
            edges: vec![],
        }
    }

    #[tokio::test]
    async fn latest_picks_highest_semver() {
        let loader = InMemoryDefinitionLoader::new();
        loader.register(def("wf", "1.0.0"));
        loader.register(def("wf", "1.2.0"));
        loader.register(def("wf", "1.1.5"));

        let resolved = loader.load_workflow("wf", "latest").await.unwrap();
        assert_eq!(resolved.version, "1.2.0");
    }

    #[tokio::test]
    async fn exact_version_lookup() {
        let loader = InMemoryDefinitionLoader::new();
        loader.register(def("wf", "1.0.0"));
        loader.register(def("wf", "2.0.0"));

        let resolved = loader.load_workflow("wf", "1.0.0").await.unwrap();
        assert_eq!(resolved.version, "1.0.0");
    }

    #[tokio::test]
    async fn unknown_workflow_not_found() {
        let loader = InMemoryDefinitionLoader::new();
        let result = loader.load_workflow("missing", "latest").await;
        assert!(result.is_err());
    }
}
