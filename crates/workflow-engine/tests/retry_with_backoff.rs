mod support;

use common::types::{ExecutionState, RetryConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use support::{def, engine, http_node, initial_vars, no_input_bridge};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Fails the first `failures` requests with 503, then succeeds. Grounds the
/// "eventually succeeds" half of the scenario without relying on mock
/// priority ordering between two separately mounted responders.
struct FlakyThenOk {
    failures: usize,
    calls: AtomicUsize,
}

impl Respond for FlakyThenOk {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            ResponseTemplate::new(503)
        } else {
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true}))
        }
    }
}

#[tokio::test]
async fn retries_on_server_error_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(FlakyThenOk { failures: 2, calls: AtomicUsize::new(0) })
        .expect(3)
        .mount(&server)
        .await;

    let url = format!("{}/flaky", server.uri());
    let retry = RetryConfig { max_retries: 3, retry_delay_ms: 5, backoff_multiplier: 2.0 };
    let def = def(vec![http_node("call", &url, Some(retry))], vec![]);

    let result = engine(no_input_bridge())
        .run_definition(def, initial_vars(&[]), std::env::temp_dir())
        .await;

    assert_eq!(result.state, ExecutionState::Succeeded);
    assert_eq!(result.outputs["call"].output["statusCode"], serde_json::json!(200));

    server.verify().await;
}

#[tokio::test]
async fn exhausts_retries_and_fails_on_persistent_server_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let url = format!("{}/down", server.uri());
    let retry = RetryConfig { max_retries: 1, retry_delay_ms: 1, backoff_multiplier: 1.0 };
    let def = def(vec![http_node("call", &url, Some(retry))], vec![]);

    let result = engine(no_input_bridge())
        .run_definition(def, initial_vars(&[]), std::env::temp_dir())
        .await;

    assert_eq!(result.state, ExecutionState::Failed);
    assert!(result.error.unwrap().starts_with("ERR_HTTP"));
}

#[tokio::test]
async fn client_error_fails_without_retrying() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/missing", server.uri());
    let retry = RetryConfig { max_retries: 5, retry_delay_ms: 1, backoff_multiplier: 2.0 };
    let def = def(vec![http_node("call", &url, Some(retry))], vec![]);

    let result = engine(no_input_bridge())
        .run_definition(def, initial_vars(&[]), std::env::temp_dir())
        .await;

    assert_eq!(result.state, ExecutionState::Failed);
    server.verify().await;
}
