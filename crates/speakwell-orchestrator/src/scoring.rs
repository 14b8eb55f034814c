//! Band scoring of transcribed answers.
//!
//! The model is asked for one `Category|Score|Feedback` line per criterion.
//! Two fallbacks keep every turn scoreable:
//!
//! - a criterion that is missing or whose line cannot be read is backfilled
//!   with [`CriterionFeedback::not_evaluated`];
//! - when the call fails outright, or the reply holds no usable line at all,
//!   the whole result is [`Evaluation::unavailable`].

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::clients::{CompletionRequest, CompletionService};
use crate::config::CompletionConfig;
use crate::error::Result;
use crate::evaluation::{Criterion, CriterionFeedback, Evaluation, NEUTRAL_SCORE};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;

const SYSTEM_PROMPT: &str = "You are an IELTS examiner. Provide clear, structured evaluations.";

/// One `Category|Score|Feedback` line, optionally bulleted or numbered.
/// Exactly two pipes.
static SCORE_LINE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*]\s*|\d+[.)]\s*)?([^|]+)\|([^|]*)\|([^|]*)$").ok());

/// Renders the scoring request for one answer.
#[must_use]
pub fn scoring_prompt(transcript: &str, audio_duration_secs: f64) -> String {
    let criteria = Criterion::ALL
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c.label()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Evaluate this IELTS speaking response:\n\
         Response: {transcript}\n\
         Duration: {audio_duration_secs:.1} seconds\n\n\
         Rate each criterion (0-9) and provide specific feedback:\n\
         {criteria}\n\n\
         Format each line exactly as: Category|Score|Feedback"
    )
}

/// Parses the model's reply.
///
/// Returns `None` when no line names a known criterion.
#[must_use]
pub fn parse_evaluation(reply: &str) -> Option<Evaluation> {
    let pattern = SCORE_LINE.as_ref()?;
    let mut parsed = BTreeMap::new();

    for line in reply.lines() {
        let Some(caps) = pattern.captures(line.trim_end()) else {
            continue;
        };
        let Some(criterion) = Criterion::from_label(&caps[1]) else {
            debug!(label = &caps[1], "Ignoring unknown scoring category");
            continue;
        };

        let score = caps[2].trim().parse::<f64>().unwrap_or(NEUTRAL_SCORE);
        let feedback = caps[3].trim();
        let suggestions = if feedback.is_empty() {
            Vec::new()
        } else {
            vec![feedback.to_string()]
        };

        parsed.insert(criterion, CriterionFeedback::new(score, suggestions));
    }

    if parsed.is_empty() {
        return None;
    }
    Some(Evaluation::from_feedback(parsed))
}

/// Scores answers through the completion service.
#[derive(Clone)]
pub struct ScoringEngine {
    service: Arc<dyn CompletionService>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    temperature: f32,
}

impl std::fmt::Debug for ScoringEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringEngine")
            .field("retry", &self.retry)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl ScoringEngine {
    /// Creates an engine sharing `limiter` with other completion callers.
    #[must_use]
    pub fn new(
        service: Arc<dyn CompletionService>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        config: &CompletionConfig,
    ) -> Self {
        Self {
            service,
            limiter,
            retry,
            temperature: config.scoring_temperature,
        }
    }

    /// Scores a transcript. Never fails; see the module docs for fallbacks.
    #[instrument(skip_all, fields(chars = transcript.len(), duration_secs = audio_duration_secs))]
    pub async fn evaluate(&self, transcript: &str, audio_duration_secs: f64) -> Evaluation {
        match self.request(transcript, audio_duration_secs).await {
            Ok(reply) => parse_evaluation(&reply).unwrap_or_else(|| {
                warn!("Scoring reply contained no usable lines");
                Evaluation::unavailable()
            }),
            Err(e) => {
                warn!(error = %e, "Scoring failed, using neutral evaluation");
                Evaluation::unavailable()
            }
        }
    }

    async fn request(&self, transcript: &str, audio_duration_secs: f64) -> Result<String> {
        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: scoring_prompt(transcript, audio_duration_secs),
            temperature: self.temperature,
            max_tokens: None,
        };

        let (service, limiter, request) = (&self.service, &self.limiter, &request);
        self.retry
            .run("scoring", || async move {
                limiter.wait_if_needed().await;
                service.complete(request).await
            })
            .await
    }
}
