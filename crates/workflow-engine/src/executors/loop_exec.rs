use crate::context::{evaluate_condition, merged_root};
use crate::executors::{GraphRunner, NodeExecutor};
use crate::runtime::RunningContext;
use async_trait::async_trait;
use common::types::{JsonValue, LoopFrame, LoopType, Node, NodeError, NodeErrorCode, NodeOutput, NodeKind};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

/// The loop node owns a body — a subgraph enumerated by `loopNodes` (§4.4).
/// Nested traversal of that body is delegated to the engine through the
/// narrow [`GraphRunner`] facade rather than a direct engine dependency.
pub struct LoopExecutor {
    graph_runner: Arc<dyn GraphRunner>,
}

impl LoopExecutor {
    pub fn new(graph_runner: Arc<dyn GraphRunner>) -> Self {
        Self { graph_runner }
    }
}

#[async_trait]
impl NodeExecutor for LoopExecutor {
    async fn execute(&self, node: &Node, ctx: &mut RunningContext) -> NodeOutput {
        let cfg = match &node.kind {
            NodeKind::Loop(c) => c.clone(),
            _ => {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrDefinition, "loop executor received a non-loop node"),
                )
            }
        };

        let max_iterations = cfg
            .max_iterations
            .unwrap_or(1000)
            .min(ctx.config.max_while_iterations.max(1));

        let collection: Vec<JsonValue> = match cfg.loop_type {
            LoopType::ForEach => {
                let Some(path) = &cfg.collection else {
                    return NodeOutput::failed(
                        &node.id,
                        &node.name,
                        ctx.clock.now(),
                        NodeError::new(NodeErrorCode::ErrDefinition, "forEach loop has no collection"),
                    );
                };
                let root = merged_root(&ctx.data, &ctx.data.variables);
                let value = crate::context::evaluate_json_path(path, &root);
                match value.as_array() {
                    Some(arr) => arr.clone(),
                    None => Vec::new(),
                }
            }
            _ => Vec::new(),
        };

        let Some(entry_node_id) = cfg.loop_nodes.first() else {
            return NodeOutput::failed(
                &node.id,
                &node.name,
                ctx.clock.now(),
                NodeError::new(NodeErrorCode::ErrDefinition, "loop has no body nodes"),
            );
        };

        if ctx.data.loop_stack.len() >= ctx.config.max_loop_nesting {
            return NodeOutput::failed(
                &node.id,
                &node.name,
                ctx.clock.now(),
                NodeError::new(
                    NodeErrorCode::ErrValidation,
                    format!("loop nesting depth exceeds the configured maximum of {}", ctx.config.max_loop_nesting),
                ),
            );
        }

        let mut iterations: Vec<JsonValue> = Vec::new();
        let mut index: i64 = 0;

        loop {
            if ctx.is_cancelled() {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrCancelled, "instance cancelled during loop execution"),
                );
            }

            let terminate = match cfg.loop_type {
                LoopType::ForEach => index as usize >= collection.len(),
                LoopType::Count => index >= cfg.count.unwrap_or(0),
                LoopType::While => {
                    if index >= max_iterations as i64 {
                        true
                    } else {
                        let condition = cfg.while_condition.clone().unwrap_or_else(|| "false".to_string());
                        let root = merged_root(&ctx.data, &ctx.data.variables);
                        match evaluate_condition(&condition, &root) {
                            Ok(b) => !b,
                            Err(e) => {
                                return NodeOutput::failed(
                                    &node.id,
                                    &node.name,
                                    ctx.clock.now(),
                                    NodeError::new(NodeErrorCode::ErrEval, e.to_string()),
                                )
                            }
                        }
                    }
                }
            };
            if terminate {
                break;
            }
            if index >= max_iterations as i64 {
                break;
            }

            let frame = LoopFrame {
                loop_node_id: node.id.clone(),
                iterator_variable: cfg.iterator_variable.clone(),
                index_variable: cfg.index_variable.clone(),
                current_index: index,
                total_items: if cfg.loop_type == LoopType::ForEach {
                    collection.len() as i64
                } else {
                    -1
                },
                collection_data: if cfg.loop_type == LoopType::ForEach {
                    Some(collection.clone())
                } else {
                    None
                },
            };
            ctx.data.loop_stack.push(frame);

            let iter_value = match cfg.loop_type {
                LoopType::ForEach => collection[index as usize].clone(),
                LoopType::Count | LoopType::While => json!(index),
            };
            ctx.data.variables.insert(cfg.iterator_variable.clone(), iter_value.clone());
            if let Some(idx_var) = &cfg.index_variable {
                ctx.data.variables.insert(idx_var.clone(), json!(index));
            }

            let body_result = self
                .graph_runner
                .run_subgraph(entry_node_id, &cfg.loop_nodes, ctx)
                .await;

            ctx.data.loop_stack.pop();

            match body_result {
                Ok(output) => {
                    let mut iter_variables = serde_json::Map::new();
                    iter_variables.insert(cfg.iterator_variable.clone(), iter_value.clone());
                    iterations.push(json!({
                        "index": index,
                        "variables": JsonValue::Object(iter_variables),
                        "output": output.output,
                    }));
                }
                Err(failed_output) => {
                    let mut variables = HashMap::new();
                    variables.insert(
                        "iterations".to_string(),
                        JsonValue::Array(iterations.clone()),
                    );
                    variables.insert("iterationCount".to_string(), json!(iterations.len()));
                    variables.insert("completed".to_string(), json!(false));
                    return NodeOutput::failed(
                        &node.id,
                        &node.name,
                        ctx.clock.now(),
                        failed_output
                            .error
                            .unwrap_or_else(|| NodeError::new(NodeErrorCode::ErrEval, "loop body failed")),
                    )
                    .with_variables(variables);
                }
            }

            index += 1;
        }

        let mut variables = HashMap::new();
        variables.insert("iterations".to_string(), JsonValue::Array(iterations.clone()));
        variables.insert("iterationCount".to_string(), json!(iterations.len()));
        variables.insert("completed".to_string(), json!(true));

        NodeOutput::success(
            &node.id,
            &node.name,
            ctx.clock.now(),
            json!({
                "iterations": iterations,
                "iterationCount": iterations.len(),
                "completed": true,
            }),
        )
        .with_variables(variables)
    }
}
