//! End-to-end integration tests for a practice session.
//!
//! The practice API runs on a local port with the real HTTP clients pointed
//! at a mock upstream that plays both the completion and speech services.
//! These tests drive a full session over HTTP, check that an abandoned
//! answer leaves the session intact, and render the final reports.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use speakwell_audio::{wav, CapturedAudio, PcmAudio};
use speakwell_orchestrator::{
    create_router, ApiStyle, AppState, AzureSpeechClient, ChatCompletionClient, Config, Criterion,
    PracticeManager, Session, SessionStatus,
};
use speakwell_report::{
    json::JsonGenerator, CriterionInput, MarkdownGenerator, ReportCriterion, ReportGenerator,
    ReportInput, TurnInput,
};

const QUESTION: &str = "Describe a place you visited recently.";
const TRANSCRIPT: &str = "I went to Lisbon last spring and loved the food.";
const SCORES: &str = "Fluency & Coherence|7|Good pace\n\
    Lexical Resource|6|Use more topic vocabulary\n\
    Grammatical Range & Accuracy|7|Try conditionals\n\
    Pronunciation|6|Work on word stress";

// ============================================================================
// Mock upstream
// ============================================================================

async fn chat(Json(body): Json<Value>) -> Json<Value> {
    let system = body["messages"][0]["content"].as_str().unwrap_or_default();
    let content = if system.contains("Speaking examiner") {
        QUESTION
    } else {
        SCORES
    };
    Json(json!({ "choices": [{ "message": { "content": content } }] }))
}

async fn recognize() -> Json<Value> {
    Json(json!({ "RecognitionStatus": "Success", "DisplayText": TRANSCRIPT }))
}

async fn recognize_slowly() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(60)).await;
    recognize().await
}

/// Spawns `router` on an ephemeral port and returns its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    format!("http://{addr}")
}

async fn spawn_upstream() -> String {
    let speech_path = "/speech/recognition/conversation/cognitiveservices/v1";
    serve(
        Router::new()
            .route("/v1/chat/completions", post(chat))
            .route(&format!("/fast{speech_path}"), post(recognize))
            .route(&format!("/slow{speech_path}"), post(recognize_slowly)),
    )
    .await
}

fn manager(upstream: &str, speech: &str) -> PracticeManager {
    let completion = ChatCompletionClient::new(ApiStyle::OpenAi, upstream, "gpt-test", "key");
    let speech = AzureSpeechClient::new(&format!("{upstream}/{speech}"), "en-US", "key");
    PracticeManager::new(&Config::default(), Arc::new(completion), Arc::new(speech))
}

fn answer_wav() -> Vec<u8> {
    // Two seconds at 44.1 kHz stereo; the pipeline normalizes it.
    wav::encode(&PcmAudio::new(vec![800; 176_400], 44_100, 2))
}

// ============================================================================
// Full session over HTTP
// ============================================================================

#[tokio::test]
async fn test_full_session_over_http() {
    let upstream = spawn_upstream().await;
    let config = Config::default();
    let api = serve(create_router(AppState::new(manager(&upstream, "fast")))).await;
    let http = reqwest::Client::new();

    // Topics come from configuration.
    let topics: Value = http
        .get(format!("{api}/api/topics"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        topics["topics"].as_array().unwrap().len(),
        config.topic_list().len()
    );

    // Start.
    let started = http
        .post(format!("{api}/api/session/start"))
        .json(&json!({ "topic": "Travel" }))
        .send()
        .await
        .unwrap();
    assert_eq!(started.status(), StatusCode::OK);
    let started: Value = started.json().await.unwrap();
    assert_eq!(started["session"]["status"], "awaiting_question");

    // Two full turns.
    for turn in 1..=2 {
        let question: Value = http
            .post(format!("{api}/api/session/question"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(question["question"], QUESTION);
        assert_eq!(question["turn"], turn);

        let answer = http
            .post(format!("{api}/api/session/response"))
            .header("content-type", "audio/wav")
            .body(answer_wav())
            .send()
            .await
            .unwrap();
        assert_eq!(answer.status(), StatusCode::OK);
        let answer: Value = answer.json().await.unwrap();
        assert_eq!(answer["exchange"]["response"], TRANSCRIPT);
        assert_eq!(answer["exchange"]["evaluation"]["overall_score"], 6.5);
        assert!((answer["exchange"]["audio_duration_secs"].as_f64().unwrap() - 2.0).abs() < 0.01);

        // Acknowledge is only legal after an answer.
        let ack: Value = http
            .post(format!("{api}/api/session/acknowledge"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(ack["status"], "turn_complete");
    }

    let summary: Value = http
        .get(format!("{api}/api/session/summary"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["questions_answered"], 2);
    assert_eq!(
        summary["improvement_areas"],
        json!(["lexical", "pronunciation"])
    );

    let ended: Value = http
        .post(format!("{api}/api/session/end"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(ended["ended"], true);
    assert_eq!(ended["summary"]["questions_answered"], 2);

    // The ended session keeps its history.
    let session: Session = http
        .get(format!("{api}/api/session"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Ended);
    assert_eq!(session.history.len(), 2);
    assert!(session.difficulty > 1.0);
}

#[tokio::test]
async fn test_out_of_order_requests_conflict() {
    let upstream = spawn_upstream().await;
    let api = serve(create_router(AppState::new(manager(&upstream, "fast")))).await;
    let http = reqwest::Client::new();

    let no_session = http
        .post(format!("{api}/api/session/question"))
        .send()
        .await
        .unwrap();
    assert_eq!(no_session.status(), StatusCode::CONFLICT);

    http.post(format!("{api}/api/session/start"))
        .json(&json!({ "topic": "Work" }))
        .send()
        .await
        .unwrap();

    let early_ack = http
        .post(format!("{api}/api/session/acknowledge"))
        .send()
        .await
        .unwrap();
    assert_eq!(early_ack.status(), StatusCode::CONFLICT);
    let body: Value = early_ack.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("Invalid state transition"));

    let no_data = http
        .get(format!("{api}/api/session/summary"))
        .send()
        .await
        .unwrap();
    assert_eq!(no_data.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_empty_upload_is_rejected() {
    let upstream = spawn_upstream().await;
    let api = serve(create_router(AppState::new(manager(&upstream, "fast")))).await;
    let http = reqwest::Client::new();

    http.post(format!("{api}/api/session/start"))
        .json(&json!({ "topic": "Food" }))
        .send()
        .await
        .unwrap();
    http.post(format!("{api}/api/session/question"))
        .send()
        .await
        .unwrap();

    let response = http
        .post(format!("{api}/api/session/response"))
        .body(Vec::new())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let session: Session = http
        .get(format!("{api}/api/session"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::AwaitingResponse);
    assert!(session.history.is_empty());
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_abandoned_answer_leaves_session_unchanged() {
    let upstream = spawn_upstream().await;
    let mut manager = manager(&upstream, "slow");

    manager.start_session("Hobbies").unwrap();
    manager.get_next_question().await.unwrap();
    let before = manager.session().clone();

    let audio = CapturedAudio::Wav(answer_wav());
    let outcome = tokio::time::timeout(
        Duration::from_millis(200),
        manager.handle_response(&audio),
    )
    .await;
    assert!(outcome.is_err(), "answer should still be in flight");

    assert_eq!(manager.session().status, SessionStatus::AwaitingResponse);
    assert_eq!(manager.session().history, before.history);
    assert_eq!(manager.session().current_question, before.current_question);
    assert!((manager.session().difficulty - before.difficulty).abs() < f64::EPSILON);

    // Nothing was answered, so ending yields no summary.
    assert!(manager.end_session().unwrap().is_none());
    assert_eq!(manager.session().status, SessionStatus::Ended);
}

// ============================================================================
// Reports
// ============================================================================

const fn report_criterion(criterion: Criterion) -> ReportCriterion {
    match criterion {
        Criterion::Fluency => ReportCriterion::Fluency,
        Criterion::Lexical => ReportCriterion::Lexical,
        Criterion::Grammar => ReportCriterion::Grammar,
        Criterion::Pronunciation => ReportCriterion::Pronunciation,
    }
}

fn report_input(session: &Session) -> ReportInput {
    ReportInput {
        topic: session.topic.clone(),
        started_at: session.started_at,
        ended_at: session.ended_at.unwrap_or(session.updated_at),
        final_difficulty: session.difficulty,
        turns: session
            .history
            .iter()
            .map(|exchange| TurnInput {
                turn: exchange.turn,
                question: exchange.question.clone(),
                response: exchange.response.clone(),
                overall_score: exchange.evaluation.overall_score,
                audio_duration_secs: exchange.audio_duration_secs,
                feedback: exchange
                    .evaluation
                    .feedback
                    .iter()
                    .map(|(c, fb)| {
                        (
                            report_criterion(*c),
                            CriterionInput::new(fb.score, fb.suggestions.clone()),
                        )
                    })
                    .collect(),
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_session_history_renders_reports() {
    let upstream = spawn_upstream().await;
    let mut manager = manager(&upstream, "fast");
    let audio = CapturedAudio::Wav(answer_wav());

    manager.start_session("Travel").unwrap();
    for _ in 0..3 {
        manager.get_next_question().await.unwrap();
        manager.handle_response(&audio).await.unwrap();
        manager.acknowledge_feedback().unwrap();
    }
    manager.end_session().unwrap().unwrap();

    let input = report_input(manager.session());
    let report = ReportGenerator::new(&input).generate().unwrap();

    assert_eq!(report.summary.questions_answered, 3);
    assert_eq!(
        report.improvement_areas(),
        vec![ReportCriterion::Lexical, ReportCriterion::Pronunciation]
    );
    assert_eq!(report.recommendations[0].description, "Use more topic vocabulary");

    let markdown = MarkdownGenerator::new(&report).generate();
    assert!(markdown.contains("# Speakwell Practice Report: Travel"));
    assert!(markdown.contains("### Turn 3"));
    assert!(markdown.contains("| Questions Answered | 3 |"));

    let json: Value =
        serde_json::from_str(&JsonGenerator::new(&report).generate().unwrap()).unwrap();
    assert_eq!(json["turns"].as_array().unwrap().len(), 3);
    assert_eq!(json["summary"]["trend"], "steady");
}
