//! Wiremock tests for the OpenAI-compatible backend.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tally_core::{Error, GenerationBackend, MerchantKey};
use tally_inference::{MerchantClassifier, OpenAIBackend, OpenAIConfig};

fn backend_for(server: &MockServer) -> OpenAIBackend {
    OpenAIBackend::new(OpenAIConfig {
        base_url: server.uri(),
        api_key: Some("test-key".to_string()),
        ..OpenAIConfig::default()
    })
    .expect("Failed to build backend")
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 50, "completion_tokens": 2, "total_tokens": 52 }
    })
}

#[tokio::test]
async fn test_generate_sends_auth_and_model_params() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "temperature": 0.3,
            "max_tokens": 20
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Groceries")))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let output = backend.generate("categorize WOOLWORTHS").await.unwrap();
    assert_eq!(output, "Groceries");
}

#[tokio::test]
async fn test_429_maps_to_rate_limited_with_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let err = backend.generate("categorize UBER").await.unwrap_err();

    match err {
        Error::RateLimited { retry_after } => {
            let at = retry_after.expect("header should populate retry_after");
            assert!(at > chrono::Utc::now());
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_maps_to_inference_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "boom", "type": "server_error", "code": null }
        })))
        .mount(&server)
        .await;

    let backend = backend_for(&server);
    let err = backend.generate("categorize BP").await.unwrap_err();
    assert!(matches!(err, Error::Inference(msg) if msg.contains("boom")));
}

#[tokio::test]
async fn test_classifier_end_to_end_against_mock_server() {
    let server = MockServer::start().await;

    // First call rate limited, second call succeeds. With retries the
    // classifier should ride it out without surfacing an error.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Transport")))
        .mount(&server)
        .await;

    let classifier = MerchantClassifier::new(std::sync::Arc::new(backend_for(&server)));
    let outcome = classifier
        .classify_with_retry(&MerchantKey::from("UBER"), "UBER *TRIP", 2)
        .await
        .unwrap();

    assert_eq!(outcome.category, "Transport");
    assert_eq!(outcome.attempts, 2);
}
