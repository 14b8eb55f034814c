//! Error types for the Speakwell practice engine.
//!
//! Variants are grouped by the stage of a turn that produces them. Most carry
//! an actionable suggestion so the presentation layer can show something more
//! useful than the raw cause.

use std::path::PathBuf;

/// A specialized `Result` type for practice engine operations.
pub type Result<T> = std::result::Result<T, PracticeError>;

/// Errors that can occur while running a practice session.
#[derive(Debug, thiserror::Error)]
pub enum PracticeError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your speakwell.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Input Errors
    // ========================================================================
    /// A session was started without a topic.
    #[error("Topic must not be empty\n\nSuggestion: Choose one of the available topics")]
    EmptyTopic,

    /// The recording contained no audio.
    #[error("No audio captured\n\nSuggestion: Check your microphone and record your answer again")]
    NoAudioCaptured,

    // ========================================================================
    // Session State Errors
    // ========================================================================
    /// An operation that needs a session was called without one.
    #[error("No active session\n\nSuggestion: Start a session with a topic first")]
    NoActiveSession,

    /// The operation is not allowed in the current session state.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    /// A summary was requested before any question was answered.
    #[error("No practice data available\n\nSuggestion: Answer at least one question before requesting a summary")]
    NoPracticeData,

    // ========================================================================
    // External Service Errors
    // ========================================================================
    /// Speech recognition could not produce a transcript.
    #[error("Transcription failed ({kind}): {message}\n\nSuggestion: {suggestion}")]
    TranscriptionFailed {
        /// Why transcription failed.
        kind: TranscriptionErrorKind,
        /// Detailed error message.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The language model API returned an error.
    #[error("LLM API error ({kind}): {message}\n\nSuggestion: {suggestion}")]
    LlmApiError {
        /// The kind of API error.
        kind: LlmErrorKind,
        /// Detailed error message from the API.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// No question could be generated after all retries.
    #[error("Failed to generate question: {message}\n\nSuggestion: Try again in a moment")]
    QuestionGenerationFailed {
        /// Description of the underlying failure.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of LLM API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Authentication failure (invalid API key, expired credentials).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// The call did not complete within its deadline.
    Timeout,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Timeout => write!(f, "timeout"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl LlmErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check the API key environment variable named in speakwell.json",
            Self::RateLimit => "Wait and retry, or lower rateLimit.requestsPerMinute",
            Self::Timeout => "Retry, or raise retry.callTimeoutSecs",
            Self::Server => "Retry later; the completion service may be experiencing issues",
            Self::Network => "Check your network connection and the configured endpoint",
            Self::Other => "Check the completion service's status page",
        }
    }
}

/// Why a recording could not be transcribed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionErrorKind {
    /// The audio could not be decoded or holds no samples.
    MalformedInput,
    /// The recognizer heard nothing it could turn into words.
    NoSpeech,
    /// The speech service failed or timed out.
    Service,
}

impl std::fmt::Display for TranscriptionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedInput => write!(f, "malformed_input"),
            Self::NoSpeech => write!(f, "no_speech"),
            Self::Service => write!(f, "service"),
        }
    }
}

impl TranscriptionErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::MalformedInput => "Record again; the audio could not be read as 16-bit PCM WAV",
            Self::NoSpeech => "No speech detected. Speak clearly and record again",
            Self::Service => "The speech service is unavailable; wait a moment and retry",
        }
    }
}

impl PracticeError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Creates a new `TranscriptionFailed` error with the kind's suggestion.
    #[must_use]
    pub fn transcription(kind: TranscriptionErrorKind, message: impl Into<String>) -> Self {
        Self::TranscriptionFailed {
            kind,
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Creates a new `LlmApiError` with automatic suggestion based on error kind.
    #[must_use]
    pub fn llm_api_error(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self::LlmApiError {
            kind,
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Creates a new `QuestionGenerationFailed` error.
    #[must_use]
    pub fn question_generation(message: impl Into<String>) -> Self {
        Self::QuestionGenerationFailed {
            message: message.into(),
        }
    }

    /// Returns `true` if the retry policy should back off and try again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LlmApiError {
                kind: LlmErrorKind::RateLimit | LlmErrorKind::Timeout,
                ..
            }
        )
    }

    /// Returns `true` for bad input that is rejected before any state change.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyTopic
                | Self::NoAudioCaptured
                | Self::TranscriptionFailed {
                    kind: TranscriptionErrorKind::MalformedInput,
                    ..
                }
        )
    }

    /// Returns `true` when an operation was called in the wrong session state.
    #[must_use]
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::NoActiveSession | Self::InvalidStateTransition { .. }
        )
    }

    /// Returns the transcription failure kind, if this is one.
    #[must_use]
    pub const fn transcription_kind(&self) -> Option<TranscriptionErrorKind> {
        match self {
            Self::TranscriptionFailed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
