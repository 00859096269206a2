use async_trait::async_trait;
use common::types::{InputType, JsonValue};
use workflow_engine::{BridgeError, UserInputBridge, UserInputRequestEvent, UserInputResponseEvent};

/// Interactive bridge for the `run` subcommand: prints the prompt to stdout
/// and blocks on a line of stdin. Runs the blocking read on a dedicated
/// thread so it doesn't stall the tokio runtime.
pub struct StdinUserInputBridge;

#[async_trait]
impl UserInputBridge for StdinUserInputBridge {
    async fn request_input(&self, request: UserInputRequestEvent) -> Result<UserInputResponseEvent, BridgeError> {
        let prompt = request.prompt.clone();
        let input_type = request.input_type;
        let line = tokio::task::spawn_blocking(move || {
            println!("{prompt}");
            if let InputType::Select = input_type {
                println!("(enter one of the listed option values)");
            }
            let mut buf = String::new();
            std::io::stdin()
                .read_line(&mut buf)
                .map(|_| buf.trim().to_string())
        })
        .await
        .map_err(|e| BridgeError::Other(e.to_string()))?
        .map_err(|e| BridgeError::Other(e.to_string()))?;

        let value = match input_type {
            InputType::Number => line.parse::<f64>().map(JsonValue::from).unwrap_or(JsonValue::String(line)),
            _ => JsonValue::String(line),
        };

        Ok(UserInputResponseEvent {
            instance_id: request.instance_id,
            request_id: request.request_id,
            value,
        })
    }
}
