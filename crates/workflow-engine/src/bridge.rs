use async_trait::async_trait;
use common::types::{InputType, JsonValue, SelectOption, ValidationRules};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Emitted when a `user-input` node suspends the instance (§4.6). The shape
/// is bit-exact with the external interface so it can be serialized straight
/// onto whatever transport a bridge implementation uses (websocket, queue).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputRequestEvent {
    pub instance_id: String,
    pub request_id: String,
    pub node_id: String,
    pub prompt: String,
    pub input_type: InputType,
    pub required: bool,
    #[serde(default)]
    pub validation: Option<ValidationRules>,
    #[serde(default)]
    pub options: Option<Vec<SelectOption>>,
    #[serde(default)]
    pub default_value: Option<JsonValue>,
    #[serde(default)]
    pub validation_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputResponseEvent {
    pub instance_id: String,
    pub request_id: String,
    pub value: JsonValue,
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("user input bridge cancelled while awaiting request {0}")]
    Cancelled(String),
    #[error("user input bridge error: {0}")]
    Other(String),
}

/// One of the four external collaborators (§6). `request_input` publishes a
/// request and suspends until a matching response arrives or the instance is
/// cancelled; the engine never polls a bridge directly, it calls this once
/// per rejection round (§4.6 "rejection loop").
#[async_trait]
pub trait UserInputBridge: Send + Sync {
    async fn request_input(
        &self,
        request: UserInputRequestEvent,
    ) -> Result<UserInputResponseEvent, BridgeError>;
}

/// Test/offline bridge driven by a pre-seeded queue of answers, keyed by
/// request id. Mirrors the pattern of a scripted double, not a mock library.
#[derive(Default)]
pub struct QueuedUserInputBridge {
    answers: std::sync::Mutex<std::collections::VecDeque<JsonValue>>,
}

impl QueuedUserInputBridge {
    pub fn new(answers: impl IntoIterator<Item = JsonValue>) -> Self {
        Self {
            answers: std::sync::Mutex::new(answers.into_iter().collect()),
        }
    }
}

#[async_trait]
impl UserInputBridge for QueuedUserInputBridge {
    async fn request_input(
        &self,
        request: UserInputRequestEvent,
    ) -> Result<UserInputResponseEvent, BridgeError> {
        let value = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BridgeError::Other("no queued answer available".to_string()))?;
        Ok(UserInputResponseEvent {
            instance_id: request.instance_id,
            request_id: request.request_id,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn queued_bridge_returns_answers_in_order() {
        let bridge = QueuedUserInputBridge::new(vec![json!("first"), json!("second")]);
        let req = UserInputRequestEvent {
            instance_id: "i1".to_string(),
            request_id: "r1".to_string(),
            node_id: "n1".to_string(),
            prompt: "?".to_string(),
            input_type: InputType::Text,
            required: true,
            validation: None,
            options: None,
            default_value: None,
            validation_error: None,
        };
        let resp = bridge.request_input(req.clone()).await.unwrap();
        assert_eq!(resp.value, json!("first"));
        let resp2 = bridge.request_input(req).await.unwrap();
        assert_eq!(resp2.value, json!("second"));
    }

    #[tokio::test]
    async fn empty_queue_errors() {
        let bridge = QueuedUserInputBridge::new(Vec::<JsonValue>::new());
        let req = UserInputRequestEvent {
            instance_id: "i1".to_string(),
            request_id: "r1".to_string(),
            node_id: "n1".to_string(),
            prompt: "?".to_string(),
            input_type: InputType::Text,
            required: true,
            validation: None,
            options: None,
            default_value: None,
            validation_error: None,
        };
        assert!(bridge.request_input(req).await.is_err());
    }
}
