mod support;

use common::types::{ContextConfig, ContextMode, ExecutionState, Node, NodeKind, OutputMapping, Position, SubWorkflowConfig};
use serde_json::json;
use std::sync::Arc;
use support::{agent_node, def, engine_with_loader, initial_vars, no_input_bridge};
use workflow_engine::InMemoryDefinitionLoader;

fn advanced_subworkflow_node(id: &str, sub_workflow_id: &str, mappings: Vec<OutputMapping>) -> Node {
    Node {
        id: id.to_string(),
        name: id.to_string(),
        position: Position::default(),
        kind: NodeKind::SubWorkflow(SubWorkflowConfig {
            sub_workflow_id: sub_workflow_id.to_string(),
            sub_workflow_version: None,
            context_config: ContextConfig { mode: ContextMode::Advanced, inputs: None, outputs: Some(mappings) },
        }),
        timeout_ms: None,
        retry_config: None,
        context_config: ContextConfig::default(),
    }
}

#[tokio::test]
async fn advanced_mode_output_mapping_reads_the_childs_final_variables() {
    let mut child = def(vec![agent_node("childAgent", false, None)], vec![]);
    child.id = "child-wf".to_string();

    let mapping = OutputMapping { source: "$.output".to_string(), target: "greeting".to_string(), transform: None };
    let parent = def(vec![advanced_subworkflow_node("sub", "child-wf", vec![mapping])], vec![]);

    let loader = Arc::new(InMemoryDefinitionLoader::new());
    loader.register(child);

    let engine = engine_with_loader(no_input_bridge(), Arc::new(support::FixedPromptProvider { output: "hello".to_string() }), loader);

    let result = engine.run_definition(parent, initial_vars(&[]), std::env::temp_dir()).await;

    assert_eq!(result.state, ExecutionState::Succeeded);
    assert_eq!(result.outputs["sub"].variables.get("greeting"), Some(&json!("hello")));
}
