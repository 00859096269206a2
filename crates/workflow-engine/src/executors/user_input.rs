use crate::bridge::UserInputRequestEvent;
use crate::context::substitute;
use crate::executors::NodeExecutor;
use crate::runtime::RunningContext;
use async_trait::async_trait;
use common::types::{InputType, JsonValue, Node, NodeError, NodeErrorCode, NodeOutput, NodeKind, UserInputConfig};
use regex::Regex;
use std::collections::HashMap;
use uuid::Uuid;

pub struct UserInputExecutor;

#[async_trait]
impl NodeExecutor for UserInputExecutor {
    async fn execute(&self, node: &Node, ctx: &mut RunningContext) -> NodeOutput {
        let cfg = match &node.kind {
            NodeKind::UserInput(c) => c.clone(),
            _ => {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrDefinition, "user-input executor received a non-user-input node"),
                )
            }
        };

        let prompt = substitute(&cfg.prompt, &ctx.data);
        let mut validation_error: Option<String> = None;
        let mut rejections: u32 = 0;

        loop {
            if ctx.is_cancelled() {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrCancelled, "instance cancelled while awaiting user input"),
                );
            }

            let request = UserInputRequestEvent {
                instance_id: ctx.data.instance_id.clone(),
                request_id: Uuid::new_v4().to_string(),
                node_id: node.id.clone(),
                prompt: prompt.clone(),
                input_type: cfg.input_type,
                required: cfg.required,
                validation: cfg.validation.clone(),
                options: cfg.options.clone(),
                default_value: cfg.default_value.clone(),
                validation_error: validation_error.take(),
            };

            let response = match ctx.bridge.request_input(request).await {
                Ok(r) => r,
                Err(e) => {
                    return NodeOutput::failed(
                        &node.id,
                        &node.name,
                        ctx.clock.now(),
                        NodeError::new(NodeErrorCode::ErrCancelled, e.to_string()),
                    )
                }
            };

            match validate(&cfg, &response.value) {
                Ok(()) => {
                    let mut variables = HashMap::new();
                    variables.insert("userInput".to_string(), response.value.clone());
                    return NodeOutput::success(&node.id, &node.name, ctx.clock.now(), response.value)
                        .with_variables(variables);
                }
                Err(msg) => {
                    rejections += 1;
                    if rejections >= ctx.config.max_input_rejections {
                        return NodeOutput::failed(
                            &node.id,
                            &node.name,
                            ctx.clock.now(),
                            NodeError::new(NodeErrorCode::ErrInputExhausted, "too many consecutive rejected inputs"),
                        );
                    }
                    validation_error = Some(msg);
                }
            }
        }
    }
}

fn is_empty_value(value: &JsonValue) -> bool {
    matches!(value, JsonValue::Null) || matches!(value, JsonValue::String(s) if s.is_empty())
}

fn validate(cfg: &UserInputConfig, value: &JsonValue) -> Result<(), String> {
    if cfg.required && is_empty_value(value) {
        return Err("This field is required".to_string());
    }

    match cfg.input_type {
        InputType::Number => {
            let n = value
                .as_f64()
                .or_else(|| value.as_str().and_then(|s| s.parse::<f64>().ok()));
            let n = match n {
                Some(n) => n,
                None => return Err("Value must be numeric".to_string()),
            };
            if let Some(rules) = &cfg.validation {
                if let Some(min) = rules.min {
                    if n < min {
                        return Err(format!("Value must be at least {min}"));
                    }
                }
                if let Some(max) = rules.max {
                    if n > max {
                        return Err(format!("Value must be at most {max}"));
                    }
                }
            }
        }
        InputType::Text | InputType::Textarea => {
            let s = value.as_str().unwrap_or("");
            if let Some(rules) = &cfg.validation {
                if let Some(min_len) = rules.min_length {
                    if s.len() < min_len {
                        return Err(format!("Value must be at least {min_len} characters"));
                    }
                }
                if let Some(max_len) = rules.max_length {
                    if s.len() > max_len {
                        return Err(format!("Value must be at most {max_len} characters"));
                    }
                }
                if let Some(pattern) = &rules.pattern {
                    let re = Regex::new(pattern).map_err(|e| format!("invalid validation pattern: {e}"))?;
                    if !re.is_match(s) {
                        return Err("Value does not match the required pattern".to_string());
                    }
                }
            }
        }
        InputType::Select => {
            if let Some(options) = &cfg.options {
                if !options.iter().any(|o| &o.value == value) {
                    return Err("Value is not one of the allowed options".to_string());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::ValidationRules;
    use serde_json::json;

    fn text_cfg(required: bool, min_length: Option<usize>) -> UserInputConfig {
        UserInputConfig {
            prompt: "Enter a value".to_string(),
            input_type: InputType::Text,
            required,
            validation: Some(ValidationRules {
                min_length,
                ..Default::default()
            }),
            options: None,
            default_value: None,
        }
    }

    #[test]
    fn required_empty_is_rejected() {
        let cfg = text_cfg(true, None);
        assert!(validate(&cfg, &json!("")).is_err());
    }

    #[test]
    fn min_length_zero_accepts_empty_when_not_required() {
        let cfg = text_cfg(false, Some(0));
        assert!(validate(&cfg, &json!("")).is_ok());
    }

    #[test]
    fn min_length_rejects_short_values() {
        let cfg = text_cfg(true, Some(3));
        assert!(validate(&cfg, &json!("hi")).is_err());
        assert!(validate(&cfg, &json!("hello")).is_ok());
    }
}
