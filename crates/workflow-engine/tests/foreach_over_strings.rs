mod support;

use common::types::{AgentConfig, ContextConfig, Node, NodeKind, Position};
use serde_json::json;
use support::{agent_node, def, edge, engine_with_provider, foreach_loop_node, initial_vars, no_input_bridge};

/// Echoes the iterator variable back as the prompt output, so the test can
/// assert each iteration actually saw its own item rather than a stale one.
struct EchoProvider;

#[async_trait::async_trait]
impl workflow_engine::PromptProvider for EchoProvider {
    async fn execute_prompt(
        &self,
        _provider_cfg: &serde_json::Value,
        prompt: &str,
        _system_prompt: Option<&str>,
    ) -> Result<workflow_engine::PromptResponse, workflow_engine::ProviderError> {
        Ok(workflow_engine::PromptResponse {
            success: true,
            output: prompt.to_string(),
            error: None,
            usage: None,
        })
    }
}

fn echoing_agent_node(id: &str) -> Node {
    Node {
        id: id.to_string(),
        name: id.to_string(),
        position: Position::default(),
        kind: NodeKind::Agent(AgentConfig {
            agent: "assistant".to_string(),
            prompt: Some("{{name}}".to_string()),
            system_prompt: None,
            provider: serde_json::Value::Null,
            gate: false,
            gate_condition: None,
        }),
        timeout_ms: None,
        retry_config: None,
        context_config: ContextConfig::default(),
    }
}

#[tokio::test]
async fn iterates_once_per_string_in_order() {
    let body = echoing_agent_node("body");
    let loop_node = foreach_loop_node("loop", "name", "$.names", vec!["body".to_string()]);

    let def = def(vec![loop_node, body], vec![edge("loop", "body")]);

    let names = json!(["alice", "bob", "carol"]);
    let result = engine_with_provider(no_input_bridge(), std::sync::Arc::new(EchoProvider))
        .run_definition(def, initial_vars(&[("names", names)]), std::env::temp_dir())
        .await;

    assert_eq!(result.state, common::types::ExecutionState::Succeeded);
    let loop_output = &result.outputs["loop"];
    assert_eq!(loop_output.output["iterationCount"], json!(3));

    let iterations = loop_output.output["iterations"].as_array().unwrap();
    let seen: Vec<&str> = iterations.iter().map(|i| i["output"]["output"].as_str().unwrap()).collect();
    assert_eq!(seen, vec!["alice", "bob", "carol"]);

    let per_iteration_vars: Vec<&str> =
        iterations.iter().map(|i| i["variables"]["name"].as_str().unwrap()).collect();
    assert_eq!(per_iteration_vars, vec!["alice", "bob", "carol"]);

    // the iterator variable does not leak past the loop at an unexpected value
    assert_eq!(result.final_variables.get("name"), Some(&json!("carol")));
}

#[tokio::test]
async fn empty_collection_completes_with_zero_iterations() {
    let body = agent_node("body", false, None);
    let loop_node = foreach_loop_node("loop", "name", "$.names", vec!["body".to_string()]);
    let def = def(vec![loop_node, body], vec![edge("loop", "body")]);

    let result = engine_with_provider(no_input_bridge(), std::sync::Arc::new(EchoProvider))
        .run_definition(def, initial_vars(&[("names", json!([]))]), std::env::temp_dir())
        .await;

    assert_eq!(result.state, common::types::ExecutionState::Succeeded);
    assert_eq!(result.outputs["loop"].output["iterationCount"], json!(0));
}
