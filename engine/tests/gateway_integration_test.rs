//! Integration tests for the Model Gateway
//!
//! Validates retry, failover and rejection handling against mock
//! chat-completion servers.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use tapwise_engine::config::OpenAIConfig;
use tapwise_engine::llm::gateway::RetryPolicy;
use tapwise_engine::llm::{
    ollama::OllamaProvider, openai::OpenAIProvider, GenerationParams, LLMError, LLMProvider,
    ModelGateway, Prompt,
};

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

fn openai(server: &MockServer) -> Arc<dyn LLMProvider> {
    let config = OpenAIConfig {
        base_url: server.uri(),
        model: "gpt-4o".to_string(),
        ..OpenAIConfig::default()
    };
    Arc::new(OpenAIProvider::with_api_key(config, "test-key"))
}

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(5),
        max_retries,
        backoff: Duration::from_millis(1),
    }
}

fn prompt() -> Prompt {
    Prompt::new("You are the Planner", "Open the settings app")
}

async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| requests.len())
        .unwrap_or(0)
}

#[tokio::test]
async fn test_transport_failure_is_retried_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream reset"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Finished")))
        .mount(&server)
        .await;

    let gateway = ModelGateway::new(vec![openai(&server)], policy(2), GenerationParams::default());
    let result = gateway.predict(&prompt()).await;

    assert_eq!(result, Ok("Finished".to_string()));
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn test_exhausted_provider_fails_over_to_next() {
    let failing = MockServer::start().await;
    let backup = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&failing)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("from backup")))
        .mount(&backup)
        .await;

    let gateway = ModelGateway::new(
        vec![openai(&failing), openai(&backup)],
        policy(2),
        GenerationParams::default(),
    );
    let result = gateway.predict(&prompt()).await;

    assert_eq!(result, Ok("from backup".to_string()));
    // One attempt plus two retries before handing off
    assert_eq!(request_count(&failing).await, 3);
    assert_eq!(request_count(&backup).await, 1);
}

#[tokio::test]
async fn test_openai_fails_over_to_ollama() {
    let failing = MockServer::start().await;
    let local = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&failing)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llava:13b",
            "created_at": "2024-05-01T10:00:00Z",
            "message": { "role": "assistant", "content": "Plan:\n1. Open settings" },
            "done": true
        })))
        .mount(&local)
        .await;

    let ollama: Arc<dyn LLMProvider> = Arc::new(OllamaProvider::new(local.uri(), "llava:13b"));
    let gateway = ModelGateway::new(
        vec![openai(&failing), ollama],
        policy(1),
        GenerationParams::default(),
    );

    let result = gateway.predict(&prompt()).await;
    assert_eq!(result, Ok("Plan:\n1. Open settings".to_string()));
}

#[tokio::test]
async fn test_rejection_surfaces_without_retry_or_failover() {
    let rejecting = MockServer::start().await;
    let backup = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("image too large"))
        .mount(&rejecting)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("unused")))
        .mount(&backup)
        .await;

    let gateway = ModelGateway::new(
        vec![openai(&rejecting), openai(&backup)],
        policy(2),
        GenerationParams::default(),
    );
    let result = gateway.predict(&prompt()).await;

    assert_eq!(
        result,
        Err(LLMError::Rejected {
            status: 400,
            body: "image too large".to_string()
        })
    );
    assert_eq!(request_count(&rejecting).await, 1);
    assert_eq!(request_count(&backup).await, 0);
}

#[tokio::test]
async fn test_bad_credentials_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let gateway = ModelGateway::new(vec![openai(&server)], policy(3), GenerationParams::default());
    let result = gateway.predict(&prompt()).await;

    assert!(matches!(result, Err(LLMError::AuthenticationFailed(_))));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_success_without_content_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-2",
            "choices": []
        })))
        .mount(&server)
        .await;

    let gateway = ModelGateway::new(vec![openai(&server)], policy(2), GenerationParams::default());
    let result = gateway.predict(&prompt()).await;

    assert!(matches!(result, Err(LLMError::MalformedResponse(_))));
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("too late"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let gateway = ModelGateway::new(
        vec![openai(&server)],
        RetryPolicy {
            timeout: Duration::from_millis(50),
            max_retries: 1,
            backoff: Duration::from_millis(1),
        },
        GenerationParams::default(),
    );

    let result = gateway.predict(&prompt()).await;
    assert_eq!(result, Err(LLMError::Timeout));
}
