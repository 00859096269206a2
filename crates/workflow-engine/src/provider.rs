use async_trait::async_trait;
use common::types::JsonValue;
use thiserror::Error;

#[derive(Debug, Clone, Default)]
pub struct PromptUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct PromptResponse {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub usage: Option<PromptUsage>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("prompt provider request failed: {0}")]
    RequestFailed(String),
    #[error("prompt provider returned an error: {0}")]
    ProviderRejected(String),
}

/// One of the four external collaborators (§6). Implementations are out of
/// scope for the engine itself — it only assumes idempotent failures are
/// retryable (`ERR_PROVIDER`).
#[async_trait]
pub trait PromptProvider: Send + Sync {
    async fn execute_prompt(
        &self,
        provider_cfg: &JsonValue,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<PromptResponse, ProviderError>;
}
