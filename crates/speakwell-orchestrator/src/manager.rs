//! The practice session state machine.
//!
//! [`PracticeManager`] owns the live [`Session`] and sequences each turn:
//! question generation, transcription, scoring, difficulty adjustment and
//! feedback acknowledgement.
//!
//! Every async operation reads the session, awaits its external calls, and
//! only then writes the session back. A future dropped mid-call therefore
//! leaves the session exactly as it was.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use speakwell_audio::CapturedAudio;
use tracing::{debug, info, instrument, warn};

use crate::clients::{CompletionService, SpeechRecognizer};
use crate::config::Config;
use crate::error::{PracticeError, Result};
use crate::evaluation::MAX_SCORE;
use crate::question::{QuestionContext, QuestionGenerator};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::scoring::ScoringEngine;
use crate::session::{
    Exchange, Session, SessionStatus, SessionSummary, MAX_DIFFICULTY, MIN_DIFFICULTY,
};
use crate::transcribe::Transcriber;

/// Difficulty change for a perfect or zero score.
pub const DIFFICULTY_STEP: f64 = 0.1;

/// Computes the difficulty after a turn scored `overall_score`.
///
/// Scores above the band midpoint raise difficulty, scores below lower it.
///
/// ```
/// use speakwell_orchestrator::adjust_difficulty;
///
/// assert!((adjust_difficulty(1.0, 9.0) - 1.05).abs() < 1e-12);
/// assert!((adjust_difficulty(1.0, 0.0) - 0.95).abs() < 1e-12);
/// assert_eq!(adjust_difficulty(2.0, 9.0), 2.0);
/// ```
#[must_use]
pub fn adjust_difficulty(current: f64, overall_score: f64) -> f64 {
    let delta = DIFFICULTY_STEP * (overall_score / MAX_SCORE - 0.5);
    (current + delta).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

/// Runs practice sessions. One session is live at a time.
#[derive(Debug)]
pub struct PracticeManager {
    session: Session,
    questions: QuestionGenerator,
    transcriber: Transcriber,
    scoring: ScoringEngine,
    topics: Vec<String>,
}

impl PracticeManager {
    /// Wires the manager to its external services.
    ///
    /// Question generation and scoring share one rate limiter, since both
    /// draw on the same completion quota.
    #[must_use]
    pub fn new(
        config: &Config,
        completion: Arc<dyn CompletionService>,
        speech: Arc<dyn SpeechRecognizer>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.requests_per_minute));
        let retry = RetryPolicy::from_config(&config.retry);

        Self {
            session: Session::default(),
            questions: QuestionGenerator::new(
                Arc::clone(&completion),
                Arc::clone(&limiter),
                retry.clone(),
                &config.completion,
            ),
            transcriber: Transcriber::new(
                speech,
                Duration::from_secs(config.retry.call_timeout_secs),
            ),
            scoring: ScoringEngine::new(completion, limiter, retry, &config.completion),
            topics: config.topic_list(),
        }
    }

    /// The current session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Topics offered to the learner.
    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Starts a fresh session on `topic`, discarding any previous one.
    ///
    /// # Errors
    ///
    /// Returns `EmptyTopic` for a blank topic; the current session is left
    /// untouched.
    #[instrument(skip(self))]
    pub fn start_session(&mut self, topic: &str) -> Result<&Session> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PracticeError::EmptyTopic);
        }

        if self.session.is_active() {
            debug!(previous = %self.session.topic, "Replacing active session");
        }
        self.session = Session::new(topic);
        info!(topic, "Practice session started");
        Ok(&self.session)
    }

    /// Generates the next question and waits for the learner's answer.
    ///
    /// Valid after `start_session`, after feedback has been acknowledged, and
    /// while a question is unanswered (which asks for a different one).
    ///
    /// # Errors
    ///
    /// - `NoActiveSession` if no session is running.
    /// - `InvalidStateTransition` while feedback is pending.
    /// - `QuestionGenerationFailed` if the model could not be reached; the
    ///   session stays in its current state so the step can be retried.
    pub async fn get_next_question(&mut self) -> Result<String> {
        match self.session.status {
            SessionStatus::AwaitingQuestion
            | SessionStatus::TurnComplete
            | SessionStatus::AwaitingResponse => {}
            SessionStatus::AwaitingFeedback => {
                return Err(PracticeError::invalid_transition(
                    SessionStatus::AwaitingFeedback,
                    SessionStatus::AwaitingResponse,
                ));
            }
            SessionStatus::Idle | SessionStatus::Ended => {
                return Err(PracticeError::NoActiveSession);
            }
        }

        let question = {
            let context = QuestionContext {
                topic: &self.session.topic,
                difficulty: self.session.difficulty,
                history: self.session.recent_history(),
            };
            self.questions.generate(&context).await?
        };

        self.session.current_question = Some(question.clone());
        self.session.status = SessionStatus::AwaitingResponse;
        self.session.touch();
        info!(
            turn = self.session.turn_index + 1,
            difficulty = self.session.difficulty,
            "Question ready"
        );
        Ok(question)
    }

    /// Transcribes and scores the learner's answer to the current question.
    ///
    /// On success the exchange is appended to the history, difficulty is
    /// adjusted, and the session waits for the feedback to be acknowledged.
    ///
    /// # Errors
    ///
    /// - `NoActiveSession` / `InvalidStateTransition` outside
    ///   `awaiting_response`.
    /// - `NoAudioCaptured` for an empty recording.
    /// - `TranscriptionFailed` when the answer could not be transcribed. The
    ///   session is unchanged, so the learner can record again.
    ///
    /// Scoring failures never fail the turn; they degrade to a neutral
    /// evaluation.
    pub async fn handle_response(&mut self, audio: &CapturedAudio) -> Result<Exchange> {
        let question = match (&self.session.status, &self.session.current_question) {
            (SessionStatus::AwaitingResponse, Some(question)) => question.clone(),
            (status, _) if status.is_active() => {
                return Err(PracticeError::invalid_transition(
                    status,
                    SessionStatus::AwaitingFeedback,
                ));
            }
            _ => return Err(PracticeError::NoActiveSession),
        };

        if audio.is_empty() {
            return Err(PracticeError::NoAudioCaptured);
        }

        let transcription = self.transcriber.transcribe(audio).await.map_err(|e| {
            warn!(error = %e, "Transcription failed, turn not recorded");
            e
        })?;
        let evaluation = self
            .scoring
            .evaluate(&transcription.text, transcription.audio_duration_secs)
            .await;

        // Both external calls are done. Commit the turn.
        let session = &mut self.session;
        let exchange = Exchange {
            turn: session.turn_index + 1,
            question,
            response: transcription.text,
            evaluation,
            audio_duration_secs: transcription.audio_duration_secs,
            recorded_at: Utc::now(),
        };

        let previous = session.difficulty;
        session.difficulty = adjust_difficulty(previous, exchange.evaluation.overall_score);
        session.history.push(exchange.clone());
        session.turn_index += 1;
        session.questions_answered += 1;
        session.current_question = None;
        session.status = SessionStatus::AwaitingFeedback;
        session.touch();

        info!(
            turn = exchange.turn,
            overall = exchange.evaluation.overall_score,
            difficulty_from = previous,
            difficulty_to = session.difficulty,
            "Turn recorded"
        );
        Ok(exchange)
    }

    /// Marks the latest feedback as seen so the next question can be asked.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless feedback is pending, or
    /// `NoActiveSession` if no session is running.
    pub fn acknowledge_feedback(&mut self) -> Result<SessionStatus> {
        match self.session.status {
            SessionStatus::AwaitingFeedback => {
                self.session.status = SessionStatus::TurnComplete;
                self.session.touch();
                debug!(turn = self.session.turn_index, "Feedback acknowledged");
                Ok(self.session.status)
            }
            status if status.is_active() => Err(PracticeError::invalid_transition(
                status,
                SessionStatus::TurnComplete,
            )),
            _ => Err(PracticeError::NoActiveSession),
        }
    }

    /// Summarises the answered questions.
    ///
    /// # Errors
    ///
    /// Returns `NoPracticeData` if nothing has been answered yet.
    pub fn get_session_summary(&self) -> Result<SessionSummary> {
        self.session.summary()
    }

    /// Ends the session and returns its summary.
    ///
    /// Any unanswered question is discarded; the history is kept. Ending an
    /// already ended session returns the same summary again. The summary is
    /// `None` when no question was answered.
    ///
    /// # Errors
    ///
    /// Returns `NoActiveSession` if no session was ever started.
    pub fn end_session(&mut self) -> Result<Option<SessionSummary>> {
        match self.session.status {
            SessionStatus::Idle => return Err(PracticeError::NoActiveSession),
            SessionStatus::Ended => {
                debug!("Session already ended");
            }
            _ => {
                self.session.status = SessionStatus::Ended;
                self.session.current_question = None;
                self.session.ended_at = Some(Utc::now());
                self.session.touch();
                info!(
                    topic = %self.session.topic,
                    questions_answered = self.session.questions_answered,
                    "Practice session ended"
                );
            }
        }

        match self.session.summary() {
            Ok(summary) => Ok(Some(summary)),
            Err(PracticeError::NoPracticeData) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
