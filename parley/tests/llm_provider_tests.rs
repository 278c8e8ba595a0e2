use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use parley::config::LlmConfig;
use parley::error::ParleyError;
use parley::llm::{LlmApiClient, LlmBackend, LlmProvider, LlmReasoner, ReasoningCapability};
use parley::pipeline::Stage;

fn llm_config(model: &str) -> LlmConfig {
    LlmConfig {
        model: model.to_string(),
        api_key: Some("test-key".to_string()),
        base_url: None,
        timeout_secs: 30,
        max_retries: 3,
        temperature: None,
    }
}

fn llm_config_with_base_url(model: &str, base_url: String, max_retries: u32) -> LlmConfig {
    LlmConfig {
        base_url: Some(base_url),
        timeout_secs: 5,
        max_retries,
        ..llm_config(model)
    }
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1,
        "model": "gpt-4o-mini",
        "choices": [
            {
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": content
                },
                "finish_reason": "stop"
            }
        ],
        "usage": {
            "prompt_tokens": 1,
            "completion_tokens": 1,
            "total_tokens": 2
        }
    })
}

fn api_error_body(message: &str, error_type: &str, code: &str) -> serde_json::Value {
    json!({
        "error": {
            "message": message,
            "type": error_type,
            "param": serde_json::Value::Null,
            "code": code
        }
    })
}

#[test]
fn test_provider_detection() {
    let cases = [
        ("openai/gpt-4o", LlmBackend::OpenAI),
        ("openrouter/openai/gpt-4o", LlmBackend::OpenRouter),
        ("ollama/llama3.2", LlmBackend::Ollama),
        ("lmstudio/qwen2.5", LlmBackend::LmStudio),
    ];
    for (model, expected) in cases {
        let provider = LlmProvider::new(Some(&llm_config(model)));
        assert_eq!(provider.backend(), &expected, "{model}");
        assert!(provider.is_available(), "{model}");
    }
}

#[test]
fn test_unknown_provider_needs_base_url() {
    let provider = LlmProvider::new(Some(&llm_config("acme/large")));
    assert!(matches!(provider.backend(), LlmBackend::Unavailable { .. }));

    let config = llm_config_with_base_url("acme/large", "http://localhost:9000/v1".into(), 0);
    let provider = LlmProvider::new(Some(&config));
    assert_eq!(
        provider.backend(),
        &LlmBackend::OpenAICompatible {
            base_url: "http://localhost:9000/v1".to_string()
        }
    );
}

#[test]
fn test_unavailable_provider() {
    let provider = LlmProvider::new(None);

    assert!(matches!(provider.backend(), LlmBackend::Unavailable { .. }));
    assert!(!provider.is_available());
}

#[test]
fn test_missing_api_key_makes_hosted_provider_unavailable() {
    let mut config = llm_config("openai/gpt-4o");
    config.api_key = None;
    let provider = LlmProvider::new(Some(&config));

    assert!(!provider.is_available());
    assert!(matches!(provider.backend(), LlmBackend::Unavailable { .. }));

    let mut local = llm_config("ollama/llama3.2");
    local.api_key = None;
    assert!(LlmProvider::new(Some(&local)).is_available());
}

#[test]
fn test_api_client_reports_model() {
    let config = llm_config("openrouter/openai/gpt-4o-mini");
    let client = LlmApiClient::new(&config).unwrap();
    assert_eq!(client.model(), "openai/gpt-4o-mini");
}

#[tokio::test]
async fn test_complete_returns_response_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hello from mock")))
        .expect(1)
        .mount(&server)
        .await;

    let config = llm_config_with_base_url("openai/gpt-4o-mini", format!("{}/v1", server.uri()), 1);
    let provider = LlmProvider::new(Some(&config));

    let result = provider.complete("Hello", None, None).await;

    match result {
        Ok(value) => assert_eq!(value, "Hello from mock"),
        Err(error) => panic!("Expected completion to succeed, got: {error}"),
    }
}

#[tokio::test]
async fn test_retry_on_server_error() {
    let server = MockServer::start().await;
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_for_mock = Arc::clone(&attempts);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(move |_request: &Request| {
            if attempts_for_mock.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(500).set_body_string("upstream temporary failure")
            } else {
                ResponseTemplate::new(200).set_body_json(completion_body("Recovered response"))
            }
        })
        .mount(&server)
        .await;

    let config = llm_config_with_base_url("openai/gpt-4o-mini", format!("{}/v1", server.uri()), 2);
    let provider = LlmProvider::new(Some(&config));

    let result = provider.complete("Retry test", None, None).await;

    match result {
        Ok(value) => assert_eq!(value, "Recovered response"),
        Err(error) => panic!("Expected retry completion to succeed, got: {error}"),
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_rate_limit_handling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "7")
                .set_body_json(api_error_body(
                    "Rate limit exceeded",
                    "insufficient_quota",
                    "insufficient_quota",
                )),
        )
        .mount(&server)
        .await;

    let config = llm_config_with_base_url("openai/gpt-4o-mini", format!("{}/v1", server.uri()), 1);
    let provider = LlmProvider::new(Some(&config));

    let result = provider.complete("Rate limit test", None, None).await;

    assert!(matches!(
        result,
        Err(ParleyError::LlmRateLimit { retry_after: None })
    ));
}

#[tokio::test]
async fn test_auth_error_makes_llm_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(api_error_body(
            "Invalid API key",
            "invalid_request_error",
            "invalid_api_key",
        )))
        .mount(&server)
        .await;

    let config = llm_config_with_base_url("openai/gpt-4o-mini", format!("{}/v1", server.uri()), 1);
    let provider = LlmProvider::new(Some(&config));

    let result = provider.complete("Auth test", None, None).await;

    match result {
        Err(ParleyError::LlmUnavailable(message)) => {
            assert!(message.to_lowercase().contains("authentication failed"));
        }
        other => panic!("Expected auth failure, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_prompt_validation() {
    let config = llm_config("openai/gpt-4o-mini");
    let provider = LlmProvider::new(Some(&config));

    let result = provider.complete("   ", None, None).await;

    match result {
        Err(ParleyError::InvalidRequest(message)) => {
            assert!(message.contains("Prompt cannot be empty"));
        }
        other => panic!("Expected InvalidRequest, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_reasoner_parses_fenced_decision() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Add eggs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            "```json\n{\"route\": \"conversational\", \"reply\": \"Hi\"}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let config = llm_config_with_base_url("openai/gpt-4o-mini", format!("{}/v1", server.uri()), 0);
    let reasoner = LlmReasoner::new(LlmProvider::new(Some(&config)));

    let decision = reasoner
        .decide(Stage::RouteCollection, "User message: Add eggs")
        .await
        .unwrap();

    assert_eq!(decision["route"], "conversational");
    assert_eq!(decision["reply"], "Hi");
}

#[tokio::test]
async fn test_reasoner_rejects_prose() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("I am not sure what you mean.")),
        )
        .mount(&server)
        .await;

    let config = llm_config_with_base_url("openai/gpt-4o-mini", format!("{}/v1", server.uri()), 0);
    let reasoner = LlmReasoner::new(LlmProvider::new(Some(&config)));

    let result = reasoner.decide(Stage::Preprocess, "anything").await;

    assert!(matches!(result, Err(ParleyError::InvalidDecision(_))));
}

#[tokio::test]
async fn test_unavailable_reasoner_fails_fast() {
    let reasoner = LlmReasoner::new(LlmProvider::new(None));

    let result = reasoner.decide(Stage::Preprocess, "anything").await;

    assert!(matches!(result, Err(ParleyError::LlmUnavailable(_))));
}
