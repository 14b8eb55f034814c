//! Follow-up question generation.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::clients::{CompletionRequest, CompletionService};
use crate::config::CompletionConfig;
use crate::error::{PracticeError, Result};
use crate::rate_limit::RateLimiter;
use crate::retry::RetryPolicy;
use crate::session::Exchange;

const SYSTEM_PROMPT: &str = "You are an IELTS Speaking examiner. Ask one clear, natural question \
about the given topic. Progress logically from the previous exchanges, building on what the \
candidate has already said instead of repeating it. Adapt to the specified difficulty level \
(0-2): 0 asks about familiar, concrete matters; 1 asks for descriptions and opinions; 2 asks \
the candidate to speculate, compare or justify abstract ideas. Reply with the question only.";

/// Everything the generator needs to pick the next question.
#[derive(Debug, Clone, Copy)]
pub struct QuestionContext<'a> {
    /// Conversation topic.
    pub topic: &'a str,
    /// Current difficulty in `[0, 2]`.
    pub difficulty: f64,
    /// Most recent exchanges, oldest first.
    pub history: &'a [Exchange],
}

impl QuestionContext<'_> {
    /// Renders the user message for the completion call.
    #[must_use]
    pub fn prompt(&self) -> String {
        let mut prompt = format!(
            "Topic: {}\nDifficulty: {:.3}\n",
            self.topic, self.difficulty
        );

        if self.history.is_empty() {
            prompt.push_str("Previous exchanges: none\n\nGenerate an opening question.");
        } else {
            prompt.push_str("Previous exchanges:\n");
            for exchange in self.history {
                let _ = writeln!(prompt, "Q: {}", exchange.question);
                let _ = writeln!(prompt, "A: {}", exchange.response);
            }
            prompt.push_str("\nGenerate a natural follow-up question.");
        }
        prompt
    }
}

/// Produces questions through the completion service.
#[derive(Clone)]
pub struct QuestionGenerator {
    service: Arc<dyn CompletionService>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    temperature: f32,
    max_tokens: u32,
}

impl std::fmt::Debug for QuestionGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionGenerator")
            .field("retry", &self.retry)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl QuestionGenerator {
    /// Creates a generator sharing `limiter` with other completion callers.
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
            temperature: config.question_temperature,
            max_tokens: config.max_question_tokens,
        }
    }

    /// Generates the next question.
    ///
    /// The trimmed model reply is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `QuestionGenerationFailed` if every attempt fails or the model
    /// replies with nothing.
    #[instrument(skip_all, fields(topic = %context.topic, difficulty = context.difficulty))]
    pub async fn generate(&self, context: &QuestionContext<'_>) -> Result<String> {
        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: context.prompt(),
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
        };

        let (service, limiter, request) = (&self.service, &self.limiter, &request);
        let reply = self
            .retry
            .run("question generation", || async move {
                limiter.wait_if_needed().await;
                service.complete(request).await
            })
            .await
            .map_err(|e| {
                warn!(error = %e, "Question generation failed");
                PracticeError::question_generation(e.to_string())
            })?;

        let question = reply.trim();
        if question.is_empty() {
            return Err(PracticeError::question_generation(
                "the model returned an empty question",
            ));
        }

        debug!(question, "Generated question");
        Ok(question.to_string())
    }
}
