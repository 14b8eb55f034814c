//! Configuration for the Speakwell practice engine.
//!
//! Configuration is read from `speakwell.json`. Every field has a default, so
//! a missing file or an empty object yields a working setup as long as the
//! API key environment variables are present. Keys themselves never live in
//! the file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PracticeError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "speakwell.json";

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_completion_key_env() -> String {
    "AZURE_OPENAI_API_KEY".to_string()
}

const fn default_question_temperature() -> f32 {
    0.7
}

const fn default_scoring_temperature() -> f32 {
    0.3
}

const fn default_max_question_tokens() -> u32 {
    100
}

fn default_region() -> String {
    "eastus".to_string()
}

fn default_speech_key_env() -> String {
    "AZURE_SPEECH_KEY".to_string()
}

/// Default outbound request budget for the completion service.
const fn default_requests_per_minute() -> u32 {
    60
}

const fn default_max_retries() -> u32 {
    3
}

/// Default deadline for a single external call.
const fn default_call_timeout() -> u64 {
    15
}

/// Default topic catalogue offered to the learner.
fn default_topics() -> Vec<String> {
    ["Work", "Education", "Technology", "Environment", "Travel"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn default_output_dir() -> String {
    ".".to_string()
}

/// Main configuration for Speakwell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Language model used for questions and scoring.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Speech recognition service.
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Outbound request throttling.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Retry and deadline policy for external calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Topics the learner can choose from.
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    /// Output directory for generated reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            completion: CompletionConfig::default(),
            speech: SpeechConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            topics: default_topics(),
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `speakwell.json` exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            PracticeError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `speakwell.json` from a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::ConfigParseError` for unreadable files, invalid
    /// JSON or unknown enum values, and `PracticeError::ConfigValidationError`
    /// when values are out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(PracticeError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| PracticeError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::ConfigValidationError` on the first failing check.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.requests_per_minute == 0 {
            return Err(PracticeError::config_validation(
                "rateLimit.requestsPerMinute must be greater than 0",
                "Set rateLimit.requestsPerMinute to at least 1 in your speakwell.json",
            ));
        }

        if self.retry.max_retries == 0 {
            return Err(PracticeError::config_validation(
                "retry.maxRetries must be greater than 0",
                "Set retry.maxRetries to at least 1 in your speakwell.json",
            ));
        }

        if self.retry.call_timeout_secs == 0 {
            return Err(PracticeError::config_validation(
                "retry.callTimeoutSecs must be greater than 0",
                "Set retry.callTimeoutSecs to at least 1 second in your speakwell.json",
            ));
        }

        for (name, value) in [
            (
                "completion.questionTemperature",
                self.completion.question_temperature,
            ),
            (
                "completion.scoringTemperature",
                self.completion.scoring_temperature,
            ),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(PracticeError::config_validation(
                    format!("{name} must be between 0 and 2, got {value}"),
                    format!("Set {name} to a value in [0, 2] in your speakwell.json"),
                ));
            }
        }

        if self.completion.max_question_tokens == 0 {
            return Err(PracticeError::config_validation(
                "completion.maxQuestionTokens must be greater than 0",
                "Set completion.maxQuestionTokens to at least 1 in your speakwell.json",
            ));
        }

        if self.topics.iter().all(|t| t.trim().is_empty()) {
            return Err(PracticeError::config_validation(
                "topics must contain at least one non-empty topic",
                "Add a topic such as \"Travel\" to the topics list in your speakwell.json",
            ));
        }

        if self.output_dir.trim().is_empty() {
            return Err(PracticeError::config_validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in your speakwell.json (use '.' for current directory)",
            ));
        }

        Ok(())
    }

    /// Non-blank configured topics, trimmed.
    #[must_use]
    pub fn topic_list(&self) -> Vec<String> {
        self.topics
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

/// Language model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionConfig {
    /// Wire dialect of the chat completions endpoint.
    #[serde(default)]
    pub api_style: ApiStyle,

    /// Base URL of the completions endpoint.
    ///
    /// For the Azure style this is the resource URL; for the `OpenAI` style an
    /// empty value means `https://api.openai.com`.
    #[serde(default)]
    pub endpoint: String,

    /// Model or Azure deployment name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_completion_key_env")]
    pub api_key_env: String,

    /// Sampling temperature for question generation.
    #[serde(default = "default_question_temperature")]
    pub question_temperature: f32,

    /// Sampling temperature for scoring.
    #[serde(default = "default_scoring_temperature")]
    pub scoring_temperature: f32,

    /// Output token cap for a generated question.
    #[serde(default = "default_max_question_tokens")]
    pub max_question_tokens: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_style: ApiStyle::default(),
            endpoint: String::new(),
            model: default_model(),
            api_key_env: default_completion_key_env(),
            question_temperature: default_question_temperature(),
            scoring_temperature: default_scoring_temperature(),
            max_question_tokens: default_max_question_tokens(),
        }
    }
}

/// Speech recognition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    /// Azure region hosting the speech resource.
    #[serde(default = "default_region")]
    pub region: String,

    /// Overrides the region-derived endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Environment variable holding the subscription key.
    #[serde(default = "default_speech_key_env")]
    pub api_key_env: String,

    /// Recognition language.
    #[serde(default)]
    pub language: Language,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            api_key_env: default_speech_key_env(),
            language: Language::default(),
        }
    }
}

/// Outbound request throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Maximum completion calls in any 60 second window.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

/// Retry policy for external calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Attempts per call, including the first.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Deadline for a single attempt, in seconds.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

/// Chat completions API dialect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApiStyle {
    /// Azure `OpenAI` deployments (default).
    #[default]
    Azure,
    /// `OpenAI`-compatible `/v1/chat/completions`.
    OpenAi,
}

impl ApiStyle {
    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "azure" => Some(Self::Azure),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for ApiStyle {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid API style '{s}': expected one of 'azure', 'openai'"
            ))
        })
    }
}

impl Serialize for ApiStyle {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(match self {
            Self::Azure => "azure",
            Self::OpenAi => "openai",
        })
    }
}

/// Recognition language and accent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    /// American English (default).
    #[default]
    EnUs,
    /// British English.
    EnGb,
    /// Australian English.
    EnAu,
}

impl Language {
    /// BCP-47 tag sent to the recognizer.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EnUs => "en-US",
            Self::EnGb => "en-GB",
            Self::EnAu => "en-AU",
        }
    }

    fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "en-us" => Some(Self::EnUs),
            "en-gb" => Some(Self::EnGb),
            "en-au" => Some(Self::EnAu),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Language {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid language '{s}': expected one of 'en-US', 'en-GB', 'en-AU'"
            ))
        })
    }
}

impl Serialize for Language {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.code())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::*;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    // ------------------------------------------------------------------------
    // Defaults
    // ------------------------------------------------------------------------

    #[test]
    fn test_config_default_values() {
        let config = Config::default();

        assert_eq!(config.completion.api_style, ApiStyle::Azure);
        assert_eq!(config.completion.model, "gpt-4o-mini");
        assert_eq!(config.completion.api_key_env, "AZURE_OPENAI_API_KEY");
        assert!((config.completion.question_temperature - 0.7).abs() < f32::EPSILON);
        assert!((config.completion.scoring_temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.completion.max_question_tokens, 100);
        assert_eq!(config.speech.region, "eastus");
        assert_eq!(config.speech.language, Language::EnUs);
        assert_eq!(config.rate_limit.requests_per_minute, 60);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.call_timeout_secs, 15);
        assert_eq!(
            config.topics,
            vec!["Work", "Education", "Technology", "Environment", "Travel"]
        );
        assert_eq!(config.output_dir, ".");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization_with_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.rate_limit.requests_per_minute, 60);
        assert_eq!(config.topics.len(), 5);
    }

    #[test]
    fn test_config_deserialization_with_overrides() {
        let json = r#"{
            "completion": { "apiStyle": "openai", "model": "gpt-4o" },
            "speech": { "language": "en-GB", "region": "westeurope" },
            "rateLimit": { "requestsPerMinute": 20 },
            "topics": ["Food"]
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.completion.api_style, ApiStyle::OpenAi);
        assert_eq!(config.completion.model, "gpt-4o");
        // Untouched fields in a partially specified section keep their defaults.
        assert_eq!(config.completion.max_question_tokens, 100);
        assert_eq!(config.speech.language, Language::EnGb);
        assert_eq!(config.speech.region, "westeurope");
        assert_eq!(config.rate_limit.requests_per_minute, 20);
        assert_eq!(config.topics, vec!["Food"]);
    }

    // ------------------------------------------------------------------------
    // Enums
    // ------------------------------------------------------------------------

    #[test]
    fn test_language_case_insensitive() {
        for (raw, expected) in [
            ("en-us", Language::EnUs),
            ("EN-GB", Language::EnGb),
            ("En-Au", Language::EnAu),
        ] {
            let json = format!(r#"{{"speech": {{"language": "{raw}"}}}}"#);
            let config: Config = serde_json::from_str(&json).unwrap();
            assert_eq!(config.speech.language, expected);
        }
    }

    #[test]
    fn test_language_serialization() {
        assert_eq!(
            serde_json::to_string(&Language::EnGb).unwrap(),
            "\"en-GB\""
        );
        assert_eq!(Language::EnAu.to_string(), "en-AU");
    }

    #[test]
    fn test_api_style_case_insensitive() {
        let config: Config =
            serde_json::from_str(r#"{"completion": {"apiStyle": "OpenAI"}}"#).unwrap();
        assert_eq!(config.completion.api_style, ApiStyle::OpenAi);
        assert_eq!(
            serde_json::to_string(&ApiStyle::Azure).unwrap(),
            "\"azure\""
        );
    }

    #[test]
    fn test_invalid_language_error() {
        let err = serde_json::from_str::<Config>(r#"{"speech": {"language": "fr-FR"}}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("invalid language"));
        assert!(err.contains("fr-FR"));
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    #[test]
    fn test_load_from_file_valid_json() {
        let path = write_temp(
            "test_speakwell_valid.json",
            r#"{"retry": {"maxRetries": 5}, "outputDir": "reports"}"#,
        );

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.call_timeout_secs, 15);
        assert_eq!(config.output_dir, "reports");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let path = write_temp("test_speakwell_invalid.json", "{ not valid json }");

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(
            matches!(&err, PracticeError::ConfigParseError { path: p, message } if *p == path && !message.is_empty()),
            "Expected ConfigParseError with correct path, got: {err:?}"
        );

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_from_file_invalid_enum_names_value() {
        let path = write_temp(
            "test_speakwell_bad_enum.json",
            r#"{"completion": {"apiStyle": "bedrock"}}"#,
        );

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, PracticeError::ConfigParseError { .. }));
        assert!(err.to_string().contains("bedrock"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_from_file_nonexistent_returns_default() {
        let config =
            Config::load_from_file(&PathBuf::from("/nonexistent/path/speakwell.json")).unwrap();
        assert_eq!(config.completion.model, "gpt-4o-mini");
    }

    #[test]
    fn test_load_from_dir_finds_speakwell_json() {
        let dir = std::env::temp_dir().join("test_speakwell_dir");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("speakwell.json");
        std::fs::write(&path, r#"{"topics": ["Music", "Sport"]}"#).unwrap();

        let config = Config::load_from_dir(&dir).unwrap();
        assert_eq!(config.topics, vec!["Music", "Sport"]);

        std::fs::remove_file(&path).ok();
        std::fs::remove_dir(&dir).ok();
    }

    #[test]
    fn test_load_from_file_validates_after_parsing() {
        let path = write_temp(
            "test_speakwell_validate.json",
            r#"{"rateLimit": {"requestsPerMinute": 0}}"#,
        );

        let err = Config::load_from_file(&path).unwrap_err();
        assert!(matches!(err, PracticeError::ConfigValidationError { .. }));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let config: Config =
            serde_json::from_str(r#"{"theme": "dark", "retry": {"jitter": true}}"#).unwrap();
        assert_eq!(config.retry.max_retries, 3);
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    #[test]
    fn test_config_validation_zero_max_retries() {
        let mut config = Config::default();
        config.retry.max_retries = 0;
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("retry.maxRetries"));
    }

    #[test]
    fn test_config_validation_zero_call_timeout() {
        let mut config = Config::default();
        config.retry.call_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_temperature_range() {
        let mut config = Config::default();
        config.completion.scoring_temperature = 2.5;
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("completion.scoringTemperature"));
    }

    #[test]
    fn test_config_validation_zero_question_tokens() {
        let mut config = Config::default();
        config.completion.max_question_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_blank_topics() {
        let mut config = Config::default();
        config.topics = vec!["  ".to_string()];
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("topics"));

        config.topics = Vec::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_empty_output_dir() {
        let mut config = Config::default();
        config.output_dir = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_topic_list_trims_and_skips_blanks() {
        let mut config = Config::default();
        config.topics = vec![" Travel ".to_string(), String::new(), "Work".to_string()];
        assert_eq!(config.topic_list(), vec!["Travel", "Work"]);
    }
}
