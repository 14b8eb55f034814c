//! Session state for a practice run.
//!
//! A [`Session`] is plain data. Only [`crate::PracticeManager`] mutates it;
//! the presentation layer reads it through the API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PracticeError, Result};
use crate::evaluation::{Criterion, Evaluation};

/// Starting difficulty of a fresh session.
pub const INITIAL_DIFFICULTY: f64 = 1.0;

/// Lowest difficulty.
pub const MIN_DIFFICULTY: f64 = 0.0;

/// Highest difficulty.
pub const MAX_DIFFICULTY: f64 = 2.0;

/// Criteria averaging below this band are flagged for improvement.
pub const IMPROVEMENT_THRESHOLD: f64 = 6.5;

/// Number of past exchanges given to the question generator.
pub const CONTEXT_WINDOW: usize = 3;

// ============================================================================
// SessionStatus
// ============================================================================

/// Where the session is in its lifecycle.
///
/// ```text
/// Idle -> AwaitingQuestion -> AwaitingResponse -> AwaitingFeedback -> TurnComplete
///               ^                                                          |
///               +----------------------------------------------------------+
/// any active state -> Ended
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No session has been started.
    #[default]
    Idle,
    /// A session is running and the next question has not been generated.
    AwaitingQuestion,
    /// A question is on screen and the learner is expected to answer.
    AwaitingResponse,
    /// The answer has been scored and feedback is being shown.
    AwaitingFeedback,
    /// Feedback was acknowledged; the next question may be requested.
    TurnComplete,
    /// The session was ended. History is retained.
    Ended,
}

impl SessionStatus {
    /// Returns `true` for the states between `start_session` and `end_session`.
    ///
    /// ```
    /// use speakwell_orchestrator::SessionStatus;
    ///
    /// assert!(SessionStatus::AwaitingResponse.is_active());
    /// assert!(!SessionStatus::Idle.is_active());
    /// assert!(!SessionStatus::Ended.is_active());
    /// ```
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            Self::AwaitingQuestion
                | Self::AwaitingResponse
                | Self::AwaitingFeedback
                | Self::TurnComplete
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingQuestion => "awaiting_question",
            Self::AwaitingResponse => "awaiting_response",
            Self::AwaitingFeedback => "awaiting_feedback",
            Self::TurnComplete => "turn_complete",
            Self::Ended => "ended",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Exchange
// ============================================================================

/// One answered question. Immutable once appended to the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// Turn number (1-indexed).
    pub turn: u32,
    /// The question that was asked.
    pub question: String,
    /// Transcript of the learner's answer.
    pub response: String,
    /// Scores for the answer.
    pub evaluation: Evaluation,
    /// Length of the recorded answer.
    pub audio_duration_secs: f64,
    /// When the answer was scored.
    pub recorded_at: DateTime<Utc>,
}

// ============================================================================
// Session
// ============================================================================

/// The live practice session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Conversation topic.
    pub topic: String,
    /// Number of completed turns.
    pub turn_index: u32,
    /// Current difficulty in `[0, 2]`.
    pub difficulty: f64,
    /// Completed exchanges in turn order.
    pub history: Vec<Exchange>,
    /// Question awaiting an answer, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question: Option<String>,
    /// Number of answered questions.
    pub questions_answered: u32,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the session was last modified.
    pub updated_at: DateTime<Utc>,
    /// When the session was ended.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Default for Session {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            status: SessionStatus::Idle,
            topic: String::new(),
            turn_index: 0,
            difficulty: INITIAL_DIFFICULTY,
            history: Vec::new(),
            current_question: None,
            questions_answered: 0,
            started_at: now,
            updated_at: now,
            ended_at: None,
        }
    }
}

impl Session {
    /// Creates a fresh session on `topic`, ready for its first question.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            status: SessionStatus::AwaitingQuestion,
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// Returns `true` while the session is running.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Updates the `updated_at` timestamp to the current time.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// The most recent exchanges used as question context, oldest first.
    #[must_use]
    pub fn recent_history(&self) -> &[Exchange] {
        let start = self.history.len().saturating_sub(CONTEXT_WINDOW);
        &self.history[start..]
    }

    /// Total recorded speaking time across all answers.
    #[must_use]
    pub fn speaking_time_secs(&self) -> f64 {
        self.history.iter().map(|e| e.audio_duration_secs).sum()
    }

    /// Computes the session summary from the retained history.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::NoPracticeData` if no question was answered.
    pub fn summary(&self) -> Result<SessionSummary> {
        if self.history.is_empty() {
            return Err(PracticeError::NoPracticeData);
        }

        let count = self.history.len() as f64;
        let average_scores: BTreeMap<Criterion, f64> = Criterion::ALL
            .into_iter()
            .map(|criterion| {
                let total: f64 = self
                    .history
                    .iter()
                    .map(|e| e.evaluation.score(criterion))
                    .sum();
                (criterion, total / count)
            })
            .collect();

        let improvement_areas = average_scores
            .iter()
            .filter(|(_, avg)| **avg < IMPROVEMENT_THRESHOLD)
            .map(|(criterion, _)| *criterion)
            .collect();

        let average_overall =
            self.history.iter().map(|e| e.evaluation.overall_score).sum::<f64>() / count;

        let end = self.ended_at.unwrap_or_else(Utc::now);
        let session_duration_secs = (end - self.started_at).num_milliseconds().max(0) as f64 / 1000.0;

        Ok(SessionSummary {
            topic: self.topic.clone(),
            questions_answered: self.questions_answered,
            average_scores,
            average_overall,
            improvement_areas,
            final_difficulty: self.difficulty,
            speaking_time_secs: self.speaking_time_secs(),
            session_duration_secs,
        })
    }
}

// ============================================================================
// SessionSummary
// ============================================================================

/// Aggregate results of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Conversation topic.
    pub topic: String,
    /// Number of answered questions.
    pub questions_answered: u32,
    /// Unweighted mean per criterion across all exchanges.
    pub average_scores: BTreeMap<Criterion, f64>,
    /// Mean of the per-exchange overall scores.
    pub average_overall: f64,
    /// Criteria whose average is below the improvement threshold.
    pub improvement_areas: Vec<Criterion>,
    /// Difficulty at the time of the summary.
    pub final_difficulty: f64,
    /// Total recorded answer length.
    pub speaking_time_secs: f64,
    /// Wall-clock length of the session.
    pub session_duration_secs: f64,
}
