//! Integration tests for the HTTP service clients.
//!
//! A local axum server stands in for the completion and speech services so
//! the real request encoding, authentication headers and error mapping are
//! exercised end to end.

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use speakwell_orchestrator::{
    ApiStyle, AzureSpeechClient, ChatCompletionClient, CompletionRequest, CompletionService,
    LlmErrorKind, PracticeError, Recognition, SpeechRecognizer, TranscriptionErrorKind,
};

const API_KEY: &str = "test-key";

/// Spawns the mock upstream and returns its base URL.
async fn spawn_upstream() -> String {
    let router = Router::new()
        .route("/openai/v1/chat/completions", post(openai_chat))
        .route(
            "/azure/openai/deployments/:deployment/chat/completions",
            post(azure_chat),
        )
        .route("/status/:code/v1/chat/completions", post(failing_chat))
        .route(
            "/speech/:outcome/speech/recognition/conversation/cognitiveservices/v1",
            post(recognize),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    format!("http://{addr}")
}

/// Echoes the model and messages back so the test can inspect the request.
async fn openai_chat(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    let expected = format!("Bearer {API_KEY}");
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some(expected.as_str());
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": "bad key" } })),
        );
    }

    let content = format!(
        "model={} system={} user={} temperature={}",
        body["model"].as_str().unwrap_or("-"),
        body["messages"][0]["content"].as_str().unwrap_or("-"),
        body["messages"][1]["content"].as_str().unwrap_or("-"),
        body["temperature"],
    );
    (
        StatusCode::OK,
        Json(json!({ "choices": [{ "message": { "content": content } }] })),
    )
}

async fn azure_chat(
    Path(deployment): Path<String>,
    Query(query): Query<std::collections::HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let key = headers.get("api-key").and_then(|v| v.to_str().ok());
    if key != Some(API_KEY) || !query.contains_key("api-version") {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": "bad key" } })),
        );
    }

    let content = format!(
        "deployment={deployment} model_in_body={}",
        body.get("model").is_some()
    );
    (
        StatusCode::OK,
        Json(json!({ "choices": [{ "message": { "content": content } }] })),
    )
}

async fn failing_chat(Path(code): Path<u16>) -> impl IntoResponse {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({ "error": { "message": format!("upstream said {code}") } })),
    )
}

async fn recognize(
    Path(outcome): Path<String>,
    Query(query): Query<std::collections::HashMap<String, String>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let key = headers
        .get("Ocp-Apim-Subscription-Key")
        .and_then(|v| v.to_str().ok());
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if key != Some(API_KEY) || !content_type.starts_with("audio/wav") || body.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({})));
    }

    let language = query.get("language").cloned().unwrap_or_default();
    match outcome.as_str() {
        "success" => (
            StatusCode::OK,
            Json(json!({
                "RecognitionStatus": "Success",
                "DisplayText": format!("Recognized in {language}."),
            })),
        ),
        "silence" => (
            StatusCode::OK,
            Json(json!({ "RecognitionStatus": "InitialSilenceTimeout" })),
        ),
        "nomatch" => (
            StatusCode::OK,
            Json(json!({ "RecognitionStatus": "NoMatch" })),
        ),
        "garbled" => (
            StatusCode::OK,
            Json(json!({ "RecognitionStatus": "BabbleTimeout" })),
        ),
        _ => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({}))),
    }
}

fn request() -> CompletionRequest {
    CompletionRequest {
        system_prompt: "You are an examiner.".to_string(),
        user_prompt: "Topic: Travel".to_string(),
        temperature: 0.7,
        max_tokens: Some(100),
    }
}

fn llm_kind(result: Result<String, PracticeError>) -> LlmErrorKind {
    match result {
        Err(PracticeError::LlmApiError { kind, .. }) => kind,
        other => panic!("expected LLM API error, got {other:?}"),
    }
}

// ============================================================================
// Chat completions
// ============================================================================

#[tokio::test]
async fn test_openai_completion_sends_model_and_messages() {
    let base = spawn_upstream().await;
    let client = ChatCompletionClient::new(
        ApiStyle::OpenAi,
        &format!("{base}/openai"),
        "gpt-test",
        API_KEY,
    );

    let reply = client.complete(&request()).await.expect("completion failed");

    assert_eq!(
        reply,
        "model=gpt-test system=You are an examiner. user=Topic: Travel temperature=0.7"
    );
}

#[tokio::test]
async fn test_azure_completion_routes_by_deployment() {
    let base = spawn_upstream().await;
    let client = ChatCompletionClient::new(
        ApiStyle::Azure,
        &format!("{base}/azure/"),
        "ielts-gpt",
        API_KEY,
    );

    let reply = client.complete(&request()).await.expect("completion failed");

    assert_eq!(reply, "deployment=ielts-gpt model_in_body=false");
}

#[tokio::test]
async fn test_wrong_key_maps_to_authentication() {
    let base = spawn_upstream().await;
    let client =
        ChatCompletionClient::new(ApiStyle::OpenAi, &format!("{base}/openai"), "m", "nope");

    assert_eq!(
        llm_kind(client.complete(&request()).await),
        LlmErrorKind::Authentication
    );
}

#[tokio::test]
async fn test_status_codes_map_to_error_kinds() {
    let base = spawn_upstream().await;

    for (code, expected) in [
        (429, LlmErrorKind::RateLimit),
        (403, LlmErrorKind::Authentication),
        (500, LlmErrorKind::Server),
        (504, LlmErrorKind::Timeout),
        (400, LlmErrorKind::Other),
    ] {
        let client = ChatCompletionClient::new(
            ApiStyle::OpenAi,
            &format!("{base}/status/{code}"),
            "m",
            API_KEY,
        );
        let result = client.complete(&request()).await;
        assert_eq!(llm_kind(result), expected, "status {code}");
    }
}

#[tokio::test]
async fn test_error_body_message_is_surfaced() {
    let base = spawn_upstream().await;
    let client =
        ChatCompletionClient::new(ApiStyle::OpenAi, &format!("{base}/status/429"), "m", API_KEY);

    let err = client.complete(&request()).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(err.to_string().contains("upstream said 429"));
}

#[tokio::test]
async fn test_unreachable_service_is_network_error() {
    let client =
        ChatCompletionClient::new(ApiStyle::OpenAi, "http://127.0.0.1:1", "m", API_KEY);

    assert_eq!(
        llm_kind(client.complete(&request()).await),
        LlmErrorKind::Network
    );
}

// ============================================================================
// Speech recognition
// ============================================================================

fn speech_client(base: &str, outcome: &str) -> AzureSpeechClient {
    AzureSpeechClient::new(&format!("{base}/speech/{outcome}"), "en-GB", API_KEY)
}

#[tokio::test]
async fn test_recognition_success_returns_display_text() {
    let base = spawn_upstream().await;

    let result = speech_client(&base, "success")
        .recognize(b"RIFF....")
        .await
        .expect("recognition failed");

    assert_eq!(
        result,
        Recognition::Recognized("Recognized in en-GB.".to_string())
    );
}

#[tokio::test]
async fn test_no_match_and_silence_are_not_errors() {
    let base = spawn_upstream().await;

    for outcome in ["nomatch", "silence"] {
        let result = speech_client(&base, outcome).recognize(b"RIFF....").await;
        assert_eq!(result.expect("recognition failed"), Recognition::NoMatch);
    }
}

#[tokio::test]
async fn test_recognition_failures_are_service_errors() {
    let base = spawn_upstream().await;

    for outcome in ["garbled", "down"] {
        let err = speech_client(&base, outcome)
            .recognize(b"RIFF....")
            .await
            .unwrap_err();
        assert_eq!(
            err.transcription_kind(),
            Some(TranscriptionErrorKind::Service),
            "outcome {outcome}"
        );
    }
}
