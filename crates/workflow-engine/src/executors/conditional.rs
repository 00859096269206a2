use crate::context::{evaluate_condition, merged_root};
use crate::executors::NodeExecutor;
use crate::runtime::RunningContext;
use crate::sandbox::expr;
use async_trait::async_trait;
use common::types::{ConditionType, JsonValue, Node, NodeError, NodeErrorCode, NodeOutput, NodeKind};
use serde_json::json;
use std::collections::HashMap;

pub struct ConditionalExecutor;

#[async_trait]
impl NodeExecutor for ConditionalExecutor {
    async fn execute(&self, node: &Node, ctx: &mut RunningContext) -> NodeOutput {
        let cfg = match &node.kind {
            NodeKind::Conditional(c) => c,
            _ => {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrDefinition, "conditional executor received a non-conditional node"),
                )
            }
        };

        let root = merged_root(&ctx.data, &ctx.data.variables);
        let result = match cfg.condition_type {
            ConditionType::Jsonpath => evaluate_condition(&cfg.condition, &root).map_err(|e| e.to_string()),
            ConditionType::Javascript => expr::eval(&cfg.condition, &ctx.data.variables)
                .map(|v| expr::truthy(&v))
                .map_err(|e| e.to_string()),
        };

        let now = ctx.clock.now();
        match result {
            Ok(condition_result) => {
                let mut variables: HashMap<String, JsonValue> = HashMap::new();
                variables.insert("conditionResult".to_string(), json!(condition_result));
                NodeOutput::success(
                    &node.id,
                    &node.name,
                    now,
                    json!({
                        "conditionResult": condition_result,
                        "condition": cfg.condition,
                        "conditionType": cfg.condition_type,
                    }),
                )
                .with_variables(variables)
            }
            Err(message) => NodeOutput::failed(&node.id, &node.name, now, NodeError::new(NodeErrorCode::ErrEval, message)),
        }
    }
}
