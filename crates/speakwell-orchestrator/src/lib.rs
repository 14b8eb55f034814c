//! Speakwell Practice Engine
//!
//! Runs spoken-language practice sessions: generates examiner questions,
//! transcribes recorded answers, scores them against the four IELTS speaking
//! criteria and adapts difficulty turn by turn. An HTTP API exposes the
//! session to a presentation layer.

pub mod api;
pub mod clients;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod manager;
pub mod question;
pub mod rate_limit;
pub mod retry;
pub mod scoring;
pub mod session;
pub mod transcribe;

pub use api::{
    create_router, AcknowledgeResponse, AnswerResponse, AppState, EndResponse, ErrorResponse,
    QuestionResponse, StartRequest, StartResponse, TopicsResponse,
};
pub use clients::{
    AzureSpeechClient, ChatCompletionClient, CompletionRequest, CompletionService, Recognition,
    SpeechRecognizer,
};
pub use config::{
    ApiStyle, CompletionConfig, Config, Language, RateLimitConfig, RetryConfig, SpeechConfig,
};
pub use error::{LlmErrorKind, PracticeError, Result, TranscriptionErrorKind};
pub use evaluation::{Criterion, CriterionFeedback, Evaluation};
pub use manager::{adjust_difficulty, PracticeManager};
pub use question::{QuestionContext, QuestionGenerator};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use scoring::ScoringEngine;
pub use session::{Exchange, Session, SessionStatus, SessionSummary};
pub use transcribe::{Transcriber, Transcription};
