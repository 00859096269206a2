mod support;

use async_trait::async_trait;
use common::types::{
    ExecutionState, InputType, JsonValue, UserInputConfig, ValidationRules,
};
use serde_json::json;
use std::sync::Mutex;
use support::{def, engine, initial_vars, user_input_node};
use workflow_engine::{BridgeError, UserInputBridge, UserInputRequestEvent, UserInputResponseEvent};

/// Replays a fixed sequence of answers, recording whether each request it
/// received carried a validation error from the previous round — this is
/// what proves the engine re-prompts rather than giving up silently.
struct ScriptedBridge {
    answers: Mutex<Vec<JsonValue>>,
    saw_validation_error: Mutex<Vec<bool>>,
}

impl ScriptedBridge {
    fn new(answers: Vec<JsonValue>) -> Self {
        Self { answers: Mutex::new(answers), saw_validation_error: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl UserInputBridge for ScriptedBridge {
    async fn request_input(
        &self,
        request: UserInputRequestEvent,
    ) -> Result<UserInputResponseEvent, BridgeError> {
        self.saw_validation_error.lock().unwrap().push(request.validation_error.is_some());
        let mut answers = self.answers.lock().unwrap();
        if answers.is_empty() {
            return Err(BridgeError::Other("no more scripted answers".to_string()));
        }
        let value = answers.remove(0);
        Ok(UserInputResponseEvent {
            instance_id: request.instance_id,
            request_id: request.request_id,
            value,
        })
    }
}

fn min_length_cfg() -> UserInputConfig {
    UserInputConfig {
        prompt: "Enter your name".to_string(),
        input_type: InputType::Text,
        required: true,
        validation: Some(ValidationRules { min_length: Some(3), ..Default::default() }),
        options: None,
        default_value: None,
    }
}

#[tokio::test]
async fn rejected_answer_is_reprompted_until_valid() {
    let bridge = std::sync::Arc::new(ScriptedBridge::new(vec![json!(""), json!("hi"), json!("alice")]));
    let def = def(vec![user_input_node("ask", min_length_cfg())], vec![]);

    let result = engine(bridge.clone())
        .run_definition(def, initial_vars(&[]), std::env::temp_dir())
        .await;

    assert_eq!(result.state, ExecutionState::Succeeded);
    assert_eq!(result.final_variables.get("userInput"), Some(&json!("alice")));

    let rounds = bridge.saw_validation_error.lock().unwrap().clone();
    assert_eq!(rounds, vec![false, true, true]);
}

#[tokio::test]
async fn exhausting_rejection_budget_fails_the_node() {
    let answers: Vec<JsonValue> = (0..20).map(|_| json!("")).collect();
    let bridge = std::sync::Arc::new(ScriptedBridge::new(answers));
    let def = def(vec![user_input_node("ask", min_length_cfg())], vec![]);

    let result = engine(bridge).run_definition(def, initial_vars(&[]), std::env::temp_dir()).await;

    assert_eq!(result.state, ExecutionState::Failed);
    assert!(result.error.unwrap().starts_with("ERR_INPUT_EXHAUSTED"));
}
