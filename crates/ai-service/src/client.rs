use crate::models::ModelConfig;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use workflow_engine::{PromptProvider, PromptResponse, PromptUsage, ProviderError};

/// `providerCfg.kind` selects the backend; everything else in the object is
/// backend-specific (`model`, `temperature`, `maxTokens`, `topP`).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderCfg {
    kind: String,
    #[serde(default = "default_model")]
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    top_p: Option<f32>,
}

fn default_model() -> String {
    "gpt-4".to_string()
}

/// HTTP-backed [`PromptProvider`] speaking either the OpenAI or the
/// Anthropic chat-completion wire format, keyed by `providerCfg.kind`. Ported
/// from the standalone `AIClient` in this crate, generalized to the engine's
/// `PromptProvider` contract instead of returning a bespoke `AIResponse`.
pub struct HttpPromptProvider {
    client: reqwest::Client,
    api_keys: HashMap<String, String>,
}

impl HttpPromptProvider {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new(), api_keys: HashMap::new() }
    }

    pub fn with_api_key(mut self, provider: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.api_keys.insert(provider.into(), api_key.into());
        self
    }

    fn api_key(&self, provider: &str) -> Result<&str, ProviderError> {
        self.api_keys
            .get(provider)
            .map(String::as_str)
            .ok_or_else(|| ProviderError::RequestFailed(format!("no API key configured for provider '{provider}'")))
    }

    async fn call_openai(&self, cfg: &ProviderCfg, prompt: &str, system_prompt: Option<&str>) -> Result<PromptResponse, ProviderError> {
        let api_key = self.api_key("openai")?;
        let mut messages = Vec::new();
        if let Some(sys) = system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": sys}));
        }
        messages.push(serde_json::json!({"role": "user", "content": prompt}));

        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": messages,
        });
        if let Some(t) = cfg.temperature {
            body["temperature"] = JsonValue::from(t);
        }
        if let Some(m) = cfg.max_tokens {
            body["max_tokens"] = JsonValue::from(m);
        }
        if let Some(p) = cfg.top_p {
            body["top_p"] = JsonValue::from(p);
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::ProviderRejected(text));
        }

        let json: JsonValue = response.json().await.map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let content = json["choices"][0]["message"]["content"].as_str().unwrap_or("").to_string();

        Ok(PromptResponse {
            success: true,
            output: content,
            error: None,
            usage: Some(PromptUsage {
                prompt_tokens: json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
                total_tokens: json["usage"]["total_tokens"].as_u64().unwrap_or(0) as u32,
            }),
        })
    }

    async fn call_anthropic(&self, cfg: &ProviderCfg, prompt: &str, system_prompt: Option<&str>) -> Result<PromptResponse, ProviderError> {
        let api_key = self.api_key("anthropic")?;
        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": cfg.max_tokens.unwrap_or(2000),
            "temperature": cfg.temperature.unwrap_or(0.7),
        });
        if let Some(sys) = system_prompt {
            body["system"] = JsonValue::from(sys);
        }

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::ProviderRejected(text));
        }

        let json: JsonValue = response.json().await.map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let content = json["content"][0]["text"].as_str().unwrap_or("").to_string();
        let input_tokens = json["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32;
        let output_tokens = json["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32;

        Ok(PromptResponse {
            success: true,
            output: content,
            error: None,
            usage: Some(PromptUsage {
                prompt_tokens: input_tokens,
                completion_tokens: output_tokens,
                total_tokens: input_tokens + output_tokens,
            }),
        })
    }
}

impl Default for HttpPromptProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PromptProvider for HttpPromptProvider {
    async fn execute_prompt(
        &self,
        provider_cfg: &JsonValue,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<PromptResponse, ProviderError> {
        let cfg: ProviderCfg = serde_json::from_value(provider_cfg.clone())
            .map_err(|e| ProviderError::RequestFailed(format!("invalid providerCfg: {e}")))?;

        match cfg.kind.as_str() {
            "openai" => self.call_openai(&cfg, prompt, system_prompt).await,
            "anthropic" => self.call_anthropic(&cfg, prompt, system_prompt).await,
            other => Err(ProviderError::RequestFailed(format!("unsupported provider kind '{other}'"))),
        }
    }
}

/// Validates a [`ModelConfig`] against provider-agnostic bounds before it is
/// serialized into an agent node's `providerCfg`.
pub fn validate_model_config(config: &ModelConfig) -> Result<(), String> {
    if !(0.0..=2.0).contains(&config.temperature) {
        return Err("temperature must be between 0.0 and 2.0".to_string());
    }
    if config.max_tokens == 0 {
        return Err("max_tokens must be greater than 0".to_string());
    }
    if !(0.0..=1.0).contains(&config.top_p) {
        return Err("top_p must be between 0.0 and 1.0".to_string());
    }
    Ok(())
}
