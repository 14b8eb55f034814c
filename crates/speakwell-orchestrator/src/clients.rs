//! External service collaborators.
//!
//! The practice engine talks to two services through narrow traits:
//! [`CompletionService`] (prompt in, text out) and [`SpeechRecognizer`]
//! (16 kHz mono WAV in, transcript out). Production implementations speak the
//! Azure / `OpenAI` REST APIs over `reqwest`; tests substitute stubs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::{ApiStyle, CompletionConfig, SpeechConfig};
use crate::error::{LlmErrorKind, PracticeError, Result, TranscriptionErrorKind};

/// Azure `OpenAI` REST API version used for chat completions.
const AZURE_API_VERSION: &str = "2024-02-15-preview";

/// Default `OpenAI` base URL when none is configured.
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Transport-level timeout. Attempt deadlines are enforced by the retry policy.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// Traits
// ============================================================================

/// A single chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System instruction.
    pub system_prompt: String,
    /// User message.
    pub user_prompt: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token cap.
    pub max_tokens: Option<u32>,
}

/// Language model completion.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Returns the model's reply to `request`.
    ///
    /// Rate limiting must surface as `LlmErrorKind::RateLimit` so the retry
    /// policy can back off.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Outcome of a recognition call that reached the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    /// Speech was recognised.
    Recognized(String),
    /// The service heard no speech.
    NoMatch,
}

/// Speech-to-text.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Recognises speech in a 16 kHz mono 16-bit WAV buffer.
    async fn recognize(&self, wav: &[u8]) -> Result<Recognition>;
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build HTTP client, using default");
            reqwest::Client::new()
        })
}

fn read_key(env_var: &str) -> Result<String> {
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(PracticeError::config_validation(
            format!("environment variable {env_var} is not set"),
            format!("Export {env_var} with your API key, or change apiKeyEnv in speakwell.json"),
        )),
    }
}

/// Maps an unsuccessful HTTP status to an LLM error kind.
#[must_use]
pub fn classify_status(status: StatusCode) -> LlmErrorKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmErrorKind::RateLimit,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmErrorKind::Authentication,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => LlmErrorKind::Timeout,
        s if s.is_server_error() => LlmErrorKind::Server,
        _ => LlmErrorKind::Other,
    }
}

fn transport_error(e: &reqwest::Error) -> PracticeError {
    let kind = if e.is_timeout() {
        LlmErrorKind::Timeout
    } else {
        LlmErrorKind::Network
    };
    PracticeError::llm_api_error(kind, e.to_string())
}

// ============================================================================
// ChatCompletionClient
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Chat completions over HTTP (Azure `OpenAI` or `OpenAI`-compatible).
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    http: reqwest::Client,
    style: ApiStyle,
    url: String,
    model: String,
    api_key: String,
}

impl ChatCompletionClient {
    /// Creates a client for `base_url`.
    #[must_use]
    pub fn new(
        style: ApiStyle,
        base_url: &str,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let model = model.into();
        let base = base_url.trim_end_matches('/');
        let url = match style {
            ApiStyle::Azure => format!(
                "{base}/openai/deployments/{model}/chat/completions?api-version={AZURE_API_VERSION}"
            ),
            ApiStyle::OpenAi => {
                let base = if base.is_empty() { OPENAI_BASE_URL } else { base };
                format!("{base}/v1/chat/completions")
            }
        };

        Self {
            http: http_client(),
            style,
            url,
            model,
            api_key: api_key.into(),
        }
    }

    /// Creates a client from the `completion` config section, reading the key
    /// from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValidationError` if the key is missing or an Azure
    /// endpoint is not configured.
    pub fn from_config(config: &CompletionConfig) -> Result<Self> {
        if config.api_style == ApiStyle::Azure && config.endpoint.trim().is_empty() {
            return Err(PracticeError::config_validation(
                "completion.endpoint is required for the azure API style",
                "Set completion.endpoint to your Azure OpenAI resource URL in speakwell.json",
            ));
        }
        let api_key = read_key(&config.api_key_env)?;
        Ok(Self::new(
            config.api_style,
            &config.endpoint,
            config.model.clone(),
            api_key,
        ))
    }

    /// Full request URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CompletionService for ChatCompletionClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatRequest {
            // Azure routes by deployment in the URL.
            model: match self.style {
                ApiStyle::Azure => None,
                ApiStyle::OpenAi => Some(&self.model),
            },
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let builder = self.http.post(&self.url).json(&body);
        let builder = match self.style {
            ApiStyle::Azure => builder.header("api-key", &self.api_key),
            ApiStyle::OpenAi => builder.bearer_auth(&self.api_key),
        };

        let response = builder.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| transport_error(&e))?;
        debug!(%status, bytes = text.len(), "Completion response received");

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map_or_else(|_| format!("HTTP {status}: {text}"), |b| b.error.message);
            return Err(PracticeError::llm_api_error(classify_status(status), message));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            PracticeError::llm_api_error(LlmErrorKind::Other, format!("invalid response body: {e}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| {
                PracticeError::llm_api_error(LlmErrorKind::Other, "response contained no message content")
            })
    }
}

// ============================================================================
// AzureSpeechClient
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SpeechResponse {
    recognition_status: String,
    #[serde(default)]
    display_text: Option<String>,
}

/// Azure Speech short-audio REST recognition.
#[derive(Debug, Clone)]
pub struct AzureSpeechClient {
    http: reqwest::Client,
    url: String,
    language: String,
    api_key: String,
}

impl AzureSpeechClient {
    /// Creates a client posting to `base_url`.
    #[must_use]
    pub fn new(base_url: &str, language: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: http_client(),
            url: format!(
                "{}/speech/recognition/conversation/cognitiveservices/v1",
                base_url.trim_end_matches('/')
            ),
            language: language.into(),
            api_key: api_key.into(),
        }
    }

    /// Creates a client from the `speech` config section, reading the key from
    /// the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValidationError` if the key is missing.
    pub fn from_config(config: &SpeechConfig) -> Result<Self> {
        let api_key = read_key(&config.api_key_env)?;
        let base = config.endpoint.clone().unwrap_or_else(|| {
            format!("https://{}.stt.speech.microsoft.com", config.region)
        });
        Ok(Self::new(&base, config.language.code(), api_key))
    }

    /// Recognition endpoint without query parameters.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn service_error(message: impl Into<String>) -> PracticeError {
        PracticeError::transcription(TranscriptionErrorKind::Service, message)
    }
}

#[async_trait]
impl SpeechRecognizer for AzureSpeechClient {
    #[instrument(skip_all, fields(language = %self.language, bytes = wav.len()))]
    async fn recognize(&self, wav: &[u8]) -> Result<Recognition> {
        let response = self
            .http
            .post(&self.url)
            .query(&[("language", self.language.as_str()), ("format", "simple")])
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .header(
                reqwest::header::CONTENT_TYPE,
                "audio/wav; codecs=audio/pcm; samplerate=16000",
            )
            .body(wav.to_vec())
            .send()
            .await
            .map_err(|e| Self::service_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::service_error(format!("HTTP {status}: {text}")));
        }

        let body: SpeechResponse = response
            .json()
            .await
            .map_err(|e| Self::service_error(format!("invalid response body: {e}")))?;
        debug!(status = %body.recognition_status, "Recognition response received");

        match body.recognition_status.as_str() {
            "Success" => Ok(Recognition::Recognized(
                body.display_text.unwrap_or_default(),
            )),
            "NoMatch" | "InitialSilenceTimeout" => Ok(Recognition::NoMatch),
            other => Err(Self::service_error(format!(
                "recognition status {other}"
            ))),
        }
    }
}
