mod support;

use async_trait::async_trait;
use common::types::ExecutionState;
use std::sync::Arc;
use std::time::Duration;
use support::{def, edge, engine_with_loader, while_loop_node};
use workflow_engine::{InMemoryDefinitionLoader, PromptProvider, PromptResponse, ProviderError, QueuedUserInputBridge};

/// An agent node used as the while-loop body; it sleeps briefly on every
/// call so the test has a real window in which to fire `cancel_instance`
/// mid-loop rather than racing a loop that finishes in a single poll.
struct SlowProvider;

#[async_trait]
impl PromptProvider for SlowProvider {
    async fn execute_prompt(
        &self,
        _provider_cfg: &serde_json::Value,
        _prompt: &str,
        _system_prompt: Option<&str>,
    ) -> Result<PromptResponse, ProviderError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(PromptResponse { success: true, output: "ok".to_string(), error: None, usage: None })
    }
}

#[tokio::test]
async fn cancelling_mid_loop_stops_further_iterations() {
    let body = support::agent_node("body", false, None);
    // always-true condition: the loop would otherwise run until max_iterations.
    let loop_node = while_loop_node("loop", "true", vec!["body".to_string()]);
    let workflow = def(vec![loop_node, body], vec![edge("loop", "body")]);

    let loader = Arc::new(InMemoryDefinitionLoader::new());
    loader.register(workflow);
    let engine = engine_with_loader(
        Arc::new(QueuedUserInputBridge::new(Vec::<serde_json::Value>::new())),
        Arc::new(SlowProvider),
        loader,
    );

    let instance_id = engine
        .start_instance("wf", "1.0.0", Default::default(), std::env::temp_dir())
        .await
        .expect("definition was registered with the loader");

    // give the loop a couple of iterations to actually start before cancelling
    tokio::time::sleep(Duration::from_millis(45)).await;
    assert!(engine.cancel_instance(&instance_id));

    let result = engine.await_instance(&instance_id).await.expect("instance was tracked");

    assert_eq!(result.state, ExecutionState::Cancelled);
    // the loop must not have been allowed to run to its configured cap: a
    // handful of 20ms iterations fit in the 45ms window before cancellation,
    // nowhere near the 1000-iteration default.
    let iteration_count = result
        .outputs
        .get("loop")
        .and_then(|o| o.variables.get("iterationCount"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    assert!(iteration_count < 50, "loop should have been cut short by cancellation, saw {iteration_count}");
}

#[tokio::test]
async fn cancelling_unknown_instance_returns_false() {
    let loader = Arc::new(InMemoryDefinitionLoader::new());
    let engine = engine_with_loader(
        Arc::new(QueuedUserInputBridge::new(Vec::<serde_json::Value>::new())),
        Arc::new(SlowProvider),
        loader,
    );
    assert!(!engine.cancel_instance("does-not-exist"));
}
