use crate::context::{apply_transform, evaluate_condition, evaluate_mapping_on_root, merged_root, substitute};
use crate::executors::NodeExecutor;
use crate::runtime::RunningContext;
use async_trait::async_trait;
use common::types::{ContextMode, JsonValue, Node, NodeError, NodeErrorCode, NodeOutput, NodeKind};
use serde_json::json;
use std::collections::HashMap;

pub struct AgentExecutor;

#[async_trait]
impl NodeExecutor for AgentExecutor {
    async fn execute(&self, node: &Node, ctx: &mut RunningContext) -> NodeOutput {
        let cfg = match &node.kind {
            NodeKind::Agent(c) => c,
            _ => {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrDefinition, "agent executor received a non-agent node"),
                )
            }
        };

        let Some(prompt_template) = &cfg.prompt else {
            return NodeOutput::failed(
                &node.id,
                &node.name,
                ctx.clock.now(),
                NodeError::new(NodeErrorCode::ErrMissingPrompt, "agent node has no prompt"),
            );
        };

        let prompt = substitute(prompt_template, &ctx.data);
        let system_prompt = match &cfg.system_prompt {
            Some(s) => substitute(s, &ctx.data),
            None => format!("You are {}, an AI assistant.", cfg.agent),
        };

        let response = ctx
            .prompt_provider
            .execute_prompt(&cfg.provider, &prompt, Some(&system_prompt))
            .await;

        let now = ctx.clock.now();
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    now,
                    NodeError::new(NodeErrorCode::ErrProvider, e.to_string()),
                )
            }
        };

        if !response.success {
            let message = response.error.unwrap_or_else(|| "prompt provider reported failure".to_string());
            return NodeOutput::failed(&node.id, &node.name, now, NodeError::new(NodeErrorCode::ErrProvider, message));
        }

        let parsed: Option<JsonValue> = serde_json::from_str(&response.output).ok();
        let mut variables: HashMap<String, JsonValue> = HashMap::new();

        match node.context_config.mode {
            ContextMode::Simple => {
                variables.insert("output".to_string(), json!(response.output));
                variables.insert(format!("{}_output", node.name), json!(response.output));
                if let Some(p) = &parsed {
                    variables.insert("parsed".to_string(), p.clone());
                }
            }
            ContextMode::Advanced => {
                let mut extraction_root = merged_root(&ctx.data, &ctx.data.variables);
                if let JsonValue::Object(map) = &mut extraction_root {
                    map.insert("output".to_string(), json!(response.output));
                    if let Some(p) = &parsed {
                        map.insert("parsed".to_string(), p.clone());
                    }
                }
                if let Some(outputs) = &node.context_config.outputs {
                    for mapping in outputs {
                        let mut value = evaluate_mapping_on_root(&mapping.source, &extraction_root);
                        if let Some(transform) = &mapping.transform {
                            value = match apply_transform(transform, &value) {
                                Ok(v) => v,
                                Err(e) => {
                                    return NodeOutput::failed(
                                        &node.id,
                                        &node.name,
                                        now,
                                        NodeError::new(NodeErrorCode::ErrEval, e.to_string()),
                                    )
                                }
                            };
                        }
                        variables.insert(mapping.target.clone(), value);
                    }
                }
            }
        }

        if cfg.gate {
            let gate_condition = cfg.gate_condition.clone().unwrap_or_default();
            let mut gate_variables = ctx.data.variables.clone();
            gate_variables.extend(variables.clone());
            let root = merged_root(&ctx.data, &gate_variables);
            match evaluate_condition(&gate_condition, &root) {
                Ok(true) => {}
                Ok(false) => {
                    return NodeOutput::failed(
                        &node.id,
                        &node.name,
                        now,
                        NodeError::new(NodeErrorCode::ErrGate, "Gate condition not met"),
                    )
                    .with_variables(variables)
                }
                Err(e) => {
                    return NodeOutput::failed(
                        &node.id,
                        &node.name,
                        now,
                        NodeError::new(NodeErrorCode::ErrEval, e.to_string()),
                    )
                }
            }
        }

        NodeOutput::success(&node.id, &node.name, now, json!({"output": response.output}))
            .with_variables(variables)
    }
}
