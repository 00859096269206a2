//! Shared fixtures for the end-to-end scenario tests. Each test builds a
//! small [`WorkflowDefinition`] by hand rather than loading JSON, so the
//! scenario under test stays readable in one place.

use async_trait::async_trait;
use common::config::EngineConfig;
use common::types::{
    AgentConfig, ConditionType, ConditionalConfig, ContextConfig, Edge, FileConfig, FileOperation,
    HttpConfig, HttpMethod, JsonValue, LoopConfig, LoopType, Node, NodeKind, Position, RetryConfig,
    SubWorkflowConfig, UserInputConfig, WorkflowDefinition,
};
use std::collections::HashMap;
use std::sync::Arc;
use workflow_engine::{
    InMemoryDefinitionLoader, PromptProvider, PromptResponse, ProviderError, QueuedUserInputBridge,
    SystemClock, UserInputBridge, WorkflowEngine,
};

/// A [`PromptProvider`] that always succeeds with a fixed output, for tests
/// that need an agent node to pass through without exercising an HTTP call.
pub struct FixedPromptProvider {
    pub output: String,
}

#[async_trait]
impl PromptProvider for FixedPromptProvider {
    async fn execute_prompt(
        &self,
        _provider_cfg: &JsonValue,
        _prompt: &str,
        _system_prompt: Option<&str>,
    ) -> Result<PromptResponse, ProviderError> {
        Ok(PromptResponse {
            success: true,
            output: self.output.clone(),
            error: None,
            usage: None,
        })
    }
}

pub fn engine(bridge: Arc<dyn UserInputBridge>) -> Arc<WorkflowEngine> {
    engine_with_provider(bridge, Arc::new(FixedPromptProvider { output: "ok".to_string() }))
}

pub fn engine_with_provider(
    bridge: Arc<dyn UserInputBridge>,
    provider: Arc<dyn PromptProvider>,
) -> Arc<WorkflowEngine> {
    WorkflowEngine::new(
        provider,
        Arc::new(InMemoryDefinitionLoader::new()),
        bridge,
        Arc::new(SystemClock),
        Arc::new(EngineConfig::default()),
    )
}

pub fn engine_with_config(bridge: Arc<dyn UserInputBridge>, config: EngineConfig) -> Arc<WorkflowEngine> {
    WorkflowEngine::new(
        Arc::new(FixedPromptProvider { output: "ok".to_string() }),
        Arc::new(InMemoryDefinitionLoader::new()),
        bridge,
        Arc::new(SystemClock),
        Arc::new(config),
    )
}

pub fn engine_with_loader(
    bridge: Arc<dyn UserInputBridge>,
    provider: Arc<dyn PromptProvider>,
    loader: Arc<InMemoryDefinitionLoader>,
) -> Arc<WorkflowEngine> {
    WorkflowEngine::new(provider, loader, bridge, Arc::new(SystemClock), Arc::new(EngineConfig::default()))
}

pub fn no_input_bridge() -> Arc<dyn UserInputBridge> {
    Arc::new(QueuedUserInputBridge::new(Vec::<JsonValue>::new()))
}

pub fn def(nodes: Vec<Node>, edges: Vec<Edge>) -> WorkflowDefinition {
    WorkflowDefinition {
        id: "wf".to_string(),
        version: "1.0.0".to_string(),
        name: "test workflow".to_string(),
        description: None,
        nodes,
        edges,
    }
}

pub fn edge(from: &str, to: &str) -> Edge {
    Edge { from_node_id: from.to_string(), to_node_id: to.to_string(), label: None }
}

pub fn labeled_edge(from: &str, to: &str, label: &str) -> Edge {
    Edge { from_node_id: from.to_string(), to_node_id: to.to_string(), label: Some(label.to_string()) }
}

fn base_node(id: &str, kind: NodeKind) -> Node {
    Node {
        id: id.to_string(),
        name: id.to_string(),
        position: Position::default(),
        kind,
        timeout_ms: None,
        retry_config: None,
        context_config: ContextConfig::default(),
    }
}

pub fn agent_node(id: &str, gate: bool, gate_condition: Option<&str>) -> Node {
    base_node(
        id,
        NodeKind::Agent(AgentConfig {
            agent: "assistant".to_string(),
            prompt: Some("do the thing".to_string()),
            system_prompt: None,
            provider: JsonValue::Null,
            gate,
            gate_condition: gate_condition.map(|s| s.to_string()),
        }),
    )
}

pub fn conditional_node(id: &str, condition: &str) -> Node {
    base_node(
        id,
        NodeKind::Conditional(ConditionalConfig {
            condition: condition.to_string(),
            condition_type: ConditionType::Jsonpath,
        }),
    )
}

pub fn user_input_node(id: &str, cfg: UserInputConfig) -> Node {
    base_node(id, NodeKind::UserInput(cfg))
}

pub fn file_node(id: &str, cfg: FileConfig) -> Node {
    base_node(id, NodeKind::File(cfg))
}

pub fn http_node(id: &str, url: &str, retry: Option<RetryConfig>) -> Node {
    base_node(
        id,
        NodeKind::Http(HttpConfig {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: HashMap::new(),
            body: None,
            auth: None,
            retry,
        }),
    )
}

pub fn foreach_loop_node(id: &str, iterator_variable: &str, collection: &str, loop_nodes: Vec<String>) -> Node {
    base_node(
        id,
        NodeKind::Loop(LoopConfig {
            loop_type: LoopType::ForEach,
            iterator_variable: iterator_variable.to_string(),
            index_variable: None,
            collection: Some(collection.to_string()),
            while_condition: None,
            count: None,
            max_iterations: None,
            loop_nodes,
        }),
    )
}

pub fn while_loop_node(id: &str, while_condition: &str, loop_nodes: Vec<String>) -> Node {
    base_node(
        id,
        NodeKind::Loop(LoopConfig {
            loop_type: LoopType::While,
            iterator_variable: "i".to_string(),
            index_variable: None,
            collection: None,
            while_condition: Some(while_condition.to_string()),
            count: None,
            max_iterations: Some(10_000),
            loop_nodes,
        }),
    )
}

#[allow(dead_code)]
pub fn subworkflow_node(id: &str, sub_workflow_id: &str) -> Node {
    base_node(
        id,
        NodeKind::SubWorkflow(SubWorkflowConfig {
            sub_workflow_id: sub_workflow_id.to_string(),
            sub_workflow_version: None,
            context_config: ContextConfig::default(),
        }),
    )
}

pub fn initial_vars(pairs: &[(&str, JsonValue)]) -> HashMap<String, JsonValue> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}
