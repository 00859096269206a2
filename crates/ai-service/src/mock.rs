use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::Mutex;
use workflow_engine::{PromptProvider, PromptResponse, ProviderError};

/// Deterministic stand-in for a real prompt provider: returns canned
/// responses from a queue (FIFO), falling back to a fixed default once the
/// queue is drained. Used by the integration test suite and for offline
/// workflow development where no API key is available.
pub struct MockPromptProvider {
    queued: Mutex<VecDeque<PromptResponse>>,
    default_output: String,
}

impl MockPromptProvider {
    pub fn new() -> Self {
        Self { queued: Mutex::new(VecDeque::new()), default_output: "mock response".to_string() }
    }

    pub fn with_default(output: impl Into<String>) -> Self {
        Self { queued: Mutex::new(VecDeque::new()), default_output: output.into() }
    }

    /// Queues a successful response to be returned on the next call.
    pub fn push_response(&self, output: impl Into<String>) {
        self.queued.lock().unwrap().push_back(PromptResponse {
            success: true,
            output: output.into(),
            error: None,
            usage: None,
        });
    }

    /// Queues a failed response to be returned on the next call.
    pub fn push_failure(&self, error: impl Into<String>) {
        self.queued.lock().unwrap().push_back(PromptResponse {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            usage: None,
        });
    }
}

impl Default for MockPromptProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PromptProvider for MockPromptProvider {
    async fn execute_prompt(
        &self,
        _provider_cfg: &JsonValue,
        _prompt: &str,
        _system_prompt: Option<&str>,
    ) -> Result<PromptResponse, ProviderError> {
        let queued = self.queued.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_else(|| PromptResponse {
            success: true,
            output: self.default_output.clone(),
            error: None,
            usage: None,
        }))
    }
}
