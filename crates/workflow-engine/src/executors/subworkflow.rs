use crate::context::evaluate_mapping;
use crate::executors::{GraphRunner, NodeExecutor};
use crate::runtime::RunningContext;
use async_trait::async_trait;
use common::types::{ContextMode, ExecutionContext, ExecutionState, JsonValue, Node, NodeError, NodeErrorCode, NodeOutput, NodeKind};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub struct SubWorkflowExecutor {
    graph_runner: Arc<dyn GraphRunner>,
}

impl SubWorkflowExecutor {
    pub fn new(graph_runner: Arc<dyn GraphRunner>) -> Self {
        Self { graph_runner }
    }
}

#[async_trait]
impl NodeExecutor for SubWorkflowExecutor {
    async fn execute(&self, node: &Node, ctx: &mut RunningContext) -> NodeOutput {
        let cfg = match &node.kind {
            NodeKind::SubWorkflow(c) => c.clone(),
            _ => {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrDefinition, "subworkflow executor received a non-subworkflow node"),
                )
            }
        };

        let version = cfg.sub_workflow_version.clone().unwrap_or_else(|| "latest".to_string());
        let definition = match ctx.loader.load_workflow(&cfg.sub_workflow_id, &version).await {
            Ok(def) => Arc::new(def),
            Err(e) => {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrNotFound, e.to_string()),
                )
            }
        };

        let child_instance_id = format!("{}-sub-{}", ctx.data.instance_id, node.id);
        let mut child_data = ExecutionContext::new(
            child_instance_id,
            definition.id.clone(),
            ctx.data.project_folder.clone(),
            ctx.clock.now(),
        );
        child_data.user_id = ctx.data.user_id.clone();
        child_data.series_id = ctx.data.series_id.clone();

        match cfg.context_config.mode {
            ContextMode::Simple => {
                child_data.variables = ctx.data.variables.clone();
                let parent_outputs = serde_json::to_value(&ctx.data.previous_outputs).unwrap_or(JsonValue::Null);
                child_data.variables.insert("_parentOutputs".to_string(), parent_outputs);
            }
            ContextMode::Advanced => {
                if let Some(inputs) = &cfg.context_config.inputs {
                    for mapping in inputs {
                        let value = evaluate_mapping(&mapping.source, &ctx.data);
                        child_data.variables.insert(mapping.target.clone(), value);
                    }
                }
            }
        }

        let timeout_ms = node.timeout_ms.unwrap_or(ctx.config.default_subworkflow_timeout_ms);
        child_data.deadline = Some(ctx.clock.now() + chrono::Duration::milliseconds(timeout_ms as i64));

        let child_ctx = ctx.child_for(child_data, definition);
        let result = self.graph_runner.run_to_terminal(child_ctx).await;

        let now = ctx.clock.now();
        match result.state {
            ExecutionState::Succeeded => {
                let mut variables: HashMap<String, JsonValue> = HashMap::new();
                match cfg.context_config.mode {
                    ContextMode::Simple => {
                        let output = serde_json::to_value(&result).unwrap_or(JsonValue::Null);
                        variables.insert("output".to_string(), output);
                    }
                    ContextMode::Advanced => {
                        if let Some(outputs) = &cfg.context_config.outputs {
                            let root = serde_json::to_value(&result.final_variables).unwrap_or(JsonValue::Null);
                            for mapping in outputs {
                                let value = crate::context::evaluate_mapping_on_root(&mapping.source, &root);
                                variables.insert(mapping.target.clone(), value);
                            }
                        }
                    }
                }
                NodeOutput::success(&node.id, &node.name, now, json!({"output": result.final_variables}))
                    .with_variables(variables)
            }
            ExecutionState::Cancelled => NodeOutput::failed(
                &node.id,
                &node.name,
                now,
                NodeError::new(NodeErrorCode::ErrCancelled, "sub-workflow instance was cancelled"),
            ),
            _ => NodeOutput::failed(
                &node.id,
                &node.name,
                now,
                NodeError::new(
                    NodeErrorCode::ErrEval,
                    result.error.unwrap_or_else(|| "sub-workflow instance failed".to_string()),
                ),
            ),
        }
    }
}
