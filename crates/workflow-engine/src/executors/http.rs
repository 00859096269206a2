use crate::context::substitute;
use crate::executors::NodeExecutor;
use crate::runtime::RunningContext;
use async_trait::async_trait;
use common::types::{AuthConfig, HttpMethod, JsonValue, Node, NodeError, NodeErrorCode, NodeOutput, NodeKind, RetryConfig};
use base64::Engine;
use reqwest::Method;
use serde_json::json;
use std::collections::HashMap;

pub struct HttpExecutor;

#[async_trait]
impl NodeExecutor for HttpExecutor {
    async fn execute(&self, node: &Node, ctx: &mut RunningContext) -> NodeOutput {
        let cfg = match &node.kind {
            NodeKind::Http(c) => c,
            _ => {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrDefinition, "http executor received a non-http node"),
                )
            }
        };

        let url = substitute(&cfg.url, &ctx.data);
        let mut headers: HashMap<String, String> = HashMap::new();
        for (k, v) in &cfg.headers {
            headers.insert(k.clone(), substitute(v, &ctx.data));
        }
        if let Some(auth) = &cfg.auth {
            apply_auth(auth, &ctx.data, &mut headers);
        }
        let body = cfg.body.clone().map(|b| substitute_json(&b, &ctx.data));

        let retry = cfg.retry.clone().unwrap_or(RetryConfig {
            max_retries: 0,
            retry_delay_ms: 0,
            backoff_multiplier: 2.0,
        });

        let client = reqwest::Client::new();
        let method = to_reqwest_method(cfg.method);

        let mut last_error: Option<(NodeErrorCode, String)> = None;
        for attempt in 1..=retry.max_attempts() {
            if ctx.is_cancelled() {
                return NodeOutput::failed(
                    &node.id,
                    &node.name,
                    ctx.clock.now(),
                    NodeError::new(NodeErrorCode::ErrCancelled, "instance cancelled before HTTP attempt"),
                );
            }
            if attempt > 1 {
                tokio::time::sleep(retry.delay_for_attempt(attempt)).await;
            }

            let mut req = client.request(method.clone(), &url);
            for (k, v) in &headers {
                req = req.header(k, v);
            }
            if let Some(b) = &body {
                req = req.json(b);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let resp_headers: HashMap<String, String> = resp
                        .headers()
                        .iter()
                        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
                        .collect();
                    let content_type = resp_headers.get("content-type").cloned().unwrap_or_default();
                    let text = resp.text().await.unwrap_or_default();
                    let response_body = if content_type.contains("json") {
                        serde_json::from_str::<JsonValue>(&text).unwrap_or(JsonValue::String(text))
                    } else {
                        JsonValue::String(text)
                    };

                    if status.is_server_error() {
                        last_error = Some((NodeErrorCode::ErrHttp, format!("server error: {status}")));
                        continue;
                    }
                    if status.is_client_error() {
                        return NodeOutput::failed(
                            &node.id,
                            &node.name,
                            ctx.clock.now(),
                            NodeError::new(NodeErrorCode::ErrHttp, format!("client error: {status}")),
                        );
                    }

                    return NodeOutput::success(
                        &node.id,
                        &node.name,
                        ctx.clock.now(),
                        json!({
                            "response": response_body,
                            "statusCode": status.as_u16(),
                            "headers": resp_headers,
                        }),
                    );
                }
                Err(e) => {
                    last_error = Some((NodeErrorCode::ErrHttp, e.to_string()));
                    continue;
                }
            }
        }

        let (code, message) = last_error.unwrap_or((NodeErrorCode::ErrHttp, "request failed".to_string()));
        NodeOutput::failed(&node.id, &node.name, ctx.clock.now(), NodeError::new(code, message))
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn apply_auth(auth: &AuthConfig, ctx: &common::types::ExecutionContext, headers: &mut HashMap<String, String>) {
    match auth {
        AuthConfig::None => {}
        AuthConfig::Basic { username, password } => {
            let username = substitute(username, ctx);
            let password = substitute(password, ctx);
            let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
            headers.insert("Authorization".to_string(), format!("Basic {encoded}"));
        }
        AuthConfig::Bearer { token } => {
            let token = substitute(token, ctx);
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        AuthConfig::ApiKey { header_name, value } => {
            let value = substitute(value, ctx);
            headers.insert(header_name.clone(), value);
        }
    }
}

fn substitute_json(value: &JsonValue, ctx: &common::types::ExecutionContext) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(substitute(s, ctx)),
        JsonValue::Array(arr) => JsonValue::Array(arr.iter().map(|v| substitute_json(v, ctx)).collect()),
        JsonValue::Object(map) => {
            JsonValue::Object(map.iter().map(|(k, v)| (k.clone(), substitute_json(v, ctx))).collect())
        }
        other => other.clone(),
    }
}
