//! HTTP API for the Speakwell practice engine.
//!
//! The presentation layer drives a session through these endpoints and
//! renders whatever they return. Only session data lives on the server;
//! display state such as whether a feedback dialog is open stays with the
//! client.
//!
//! # Endpoints
//!
//! - `GET /api/topics` - Configured topic catalogue
//! - `GET /api/session` - Current session
//! - `POST /api/session/start` - Start a session on a topic
//! - `POST /api/session/question` - Generate the next question
//! - `POST /api/session/response` - Submit a recorded answer (WAV body)
//! - `POST /api/session/acknowledge` - Acknowledge the latest feedback
//! - `GET /api/session/summary` - Aggregate results so far
//! - `POST /api/session/end` - End the session
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use speakwell_orchestrator::{
//!     create_router, AppState, AzureSpeechClient, ChatCompletionClient, Config, PracticeManager,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let completion = Arc::new(ChatCompletionClient::from_config(&config.completion)?);
//! let speech = Arc::new(AzureSpeechClient::from_config(&config.speech)?);
//! let manager = PracticeManager::new(&config, completion, speech);
//!
//! let router = create_router(AppState::new(manager));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use speakwell_audio::CapturedAudio;
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::error::{PracticeError, TranscriptionErrorKind};
use crate::{Exchange, PracticeManager, Session, SessionStatus, SessionSummary};

/// Largest accepted answer upload. A minute of 48 kHz stereo fits.
pub const MAX_AUDIO_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response body for the topics endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsResponse {
    /// Topics the learner can choose from.
    pub topics: Vec<String>,
}

/// Request body for the start endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    /// Conversation topic.
    pub topic: String,
}

/// Response body for the start endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartResponse {
    /// Whether a session was started.
    pub started: bool,
    /// The fresh session.
    pub session: Session,
}

/// Response body for the question endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResponse {
    /// The question to put to the learner.
    pub question: String,
    /// Turn number this question belongs to (1-indexed).
    pub turn: u32,
}

/// Response body for the response endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    /// The recorded exchange, including its evaluation.
    pub exchange: Exchange,
    /// Difficulty after this turn.
    pub difficulty: f64,
}

/// Response body for the acknowledge endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcknowledgeResponse {
    /// Session status after the acknowledgement.
    pub status: SessionStatus,
}

/// Response body for the end endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndResponse {
    /// Whether the session is ended.
    pub ended: bool,
    /// Summary, or `null` when no question was answered.
    pub summary: Option<SessionSummary>,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
///
/// The manager sits behind an async mutex: one operation runs at a time,
/// and a request that disconnects mid-call drops its future without touching
/// the session.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The practice session manager.
    pub manager: Arc<Mutex<PracticeManager>>,
}

impl AppState {
    /// Creates a new `AppState` around `manager`.
    #[must_use]
    pub fn new(manager: PracticeManager) -> Self {
        Self {
            manager: Arc::new(Mutex::new(manager)),
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// The request itself is unusable.
    BadRequest(String),
    /// The request is valid but the session is in the wrong state.
    Conflict(String),
    /// The requested data does not exist yet.
    NotFound(String),
    /// The audio was readable but held no speech.
    Unprocessable(String),
    /// An upstream service failed.
    Upstream(String),
    /// Anything else.
    Internal(String),
}

impl From<PracticeError> for ApiError {
    fn from(e: PracticeError) -> Self {
        let message = e.to_string();
        match e {
            PracticeError::EmptyTopic | PracticeError::NoAudioCaptured => Self::BadRequest(message),
            PracticeError::NoActiveSession | PracticeError::InvalidStateTransition { .. } => {
                Self::Conflict(message)
            }
            PracticeError::NoPracticeData => Self::NotFound(message),
            PracticeError::TranscriptionFailed { kind, .. } => match kind {
                TranscriptionErrorKind::MalformedInput => Self::BadRequest(message),
                TranscriptionErrorKind::NoSpeech => Self::Unprocessable(message),
                TranscriptionErrorKind::Service => Self::Upstream(message),
            },
            PracticeError::QuestionGenerationFailed { .. } | PracticeError::LlmApiError { .. } => {
                Self::Upstream(message)
            }
            PracticeError::ConfigParseError { .. }
            | PracticeError::ConfigValidationError { .. }
            | PracticeError::Io(_)
            | PracticeError::Json(_) => Self::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router has every route under `/api`, permissive CORS for a local
/// front end, and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/topics", get(handle_topics))
        .route("/session", get(handle_session))
        .route("/session/start", post(handle_start))
        .route("/session/question", post(handle_question))
        .route(
            "/session/response",
            post(handle_response).layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES)),
        )
        .route("/session/acknowledge", post(handle_acknowledge))
        .route("/session/summary", get(handle_summary))
        .route("/session/end", post(handle_end));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/topics`.
async fn handle_topics(State(state): State<Arc<AppState>>) -> Json<TopicsResponse> {
    let manager = state.manager.lock().await;
    Json(TopicsResponse {
        topics: manager.topics().to_vec(),
    })
}

/// Handler for `GET /api/session`.
async fn handle_session(State(state): State<Arc<AppState>>) -> Json<Session> {
    let manager = state.manager.lock().await;
    Json(manager.session().clone())
}

/// Handler for `POST /api/session/start`.
async fn handle_start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let mut manager = state.manager.lock().await;
    let session = manager.start_session(&request.topic)?.clone();

    Ok(Json(StartResponse {
        started: true,
        session,
    }))
}

/// Handler for `POST /api/session/question`.
async fn handle_question(
    State(state): State<Arc<AppState>>,
) -> Result<Json<QuestionResponse>, ApiError> {
    let mut manager = state.manager.lock().await;
    let question = manager.get_next_question().await.map_err(|e| {
        warn!(error = %e, "Question request failed");
        e
    })?;

    Ok(Json(QuestionResponse {
        question,
        turn: manager.session().turn_index + 1,
    }))
}

/// Handler for `POST /api/session/response`.
///
/// The body is the recorded answer as a WAV file.
async fn handle_response(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AnswerResponse>, ApiError> {
    info!(bytes = body.len(), "Received answer audio");

    let audio = CapturedAudio::Wav(body.to_vec());
    let mut manager = state.manager.lock().await;
    let exchange = manager.handle_response(&audio).await.map_err(|e| {
        warn!(error = %e, "Answer could not be processed");
        e
    })?;

    Ok(Json(AnswerResponse {
        exchange,
        difficulty: manager.session().difficulty,
    }))
}

/// Handler for `POST /api/session/acknowledge`.
async fn handle_acknowledge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AcknowledgeResponse>, ApiError> {
    let mut manager = state.manager.lock().await;
    let status = manager.acknowledge_feedback()?;
    Ok(Json(AcknowledgeResponse { status }))
}

/// Handler for `GET /api/session/summary`.
async fn handle_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionSummary>, ApiError> {
    let manager = state.manager.lock().await;
    Ok(Json(manager.get_session_summary()?))
}

/// Handler for `POST /api/session/end`.
async fn handle_end(State(state): State<Arc<AppState>>) -> Result<Json<EndResponse>, ApiError> {
    let mut manager = state.manager.lock().await;
    let summary = manager.end_session()?;
    Ok(Json(EndResponse {
        ended: true,
        summary,
    }))
}

// ============================================================================
// Tests
// ============================================================================
