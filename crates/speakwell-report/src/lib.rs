//! Speakwell Report Generation
//!
//! Builds an end-of-session practice report from the answered turns of a
//! session. Reports can be serialized to JSON for programmatic access or
//! rendered to Markdown for the learner.
//!
//! # Types
//!
//! - [`ReportInput`] / [`TurnInput`] - Plain session data fed to the generator
//! - [`ReportGenerator`] - Aggregates the input into a [`Report`]
//! - [`Report`] - Summary, per-criterion results, turns and recommendations
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Generate JSON reports with compact or pretty formatting
//! - [`MarkdownGenerator`] - Generate human-readable Markdown reports
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//!
//! use chrono::{Duration, Utc};
//! use speakwell_report::{
//!     CriterionInput, MarkdownGenerator, ReportCriterion, ReportGenerator, ReportInput, TurnInput,
//! };
//!
//! let feedback: BTreeMap<_, _> = ReportCriterion::ALL
//!     .into_iter()
//!     .map(|c| (c, CriterionInput::new(6.0, vec!["Keep practising".to_string()])))
//!     .collect();
//!
//! let started_at = Utc::now();
//! let input = ReportInput {
//!     topic: "Travel".to_string(),
//!     started_at,
//!     ended_at: started_at + Duration::seconds(95),
//!     final_difficulty: 0.99,
//!     turns: vec![TurnInput {
//!         turn: 1,
//!         question: "Where did you go on your last holiday?".to_string(),
//!         response: "I went to Lisbon with my sister.".to_string(),
//!         overall_score: 6.0,
//!         audio_duration_secs: 14.2,
//!         feedback,
//!     }],
//! };
//!
//! let report = ReportGenerator::new(&input).generate().unwrap();
//! assert_eq!(report.recommendations.len(), 4);
//!
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Speakwell Practice Report: Travel"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Criteria averaging below this band need improvement.
pub const IMPROVEMENT_THRESHOLD: f64 = 6.5;

/// Overall-score change between the first and last turn treated as steady.
pub const TREND_TOLERANCE: f64 = 0.25;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid report data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// ReportCriterion (local copy to avoid cross-crate dependency)
// ============================================================================

/// A scored dimension of a spoken answer.
///
/// This mirrors `Criterion` from the orchestrator crate, including its
/// serialized names, so the report crate stays independent of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCriterion {
    /// Fluency and coherence.
    Fluency,
    /// Lexical resource.
    Lexical,
    /// Grammatical range and accuracy.
    Grammar,
    /// Pronunciation.
    Pronunciation,
}

impl ReportCriterion {
    /// All criteria in reporting order.
    pub const ALL: [Self; 4] = [
        Self::Fluency,
        Self::Lexical,
        Self::Grammar,
        Self::Pronunciation,
    ];

    /// Full band descriptor name.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Fluency => "Fluency & Coherence",
            Self::Lexical => "Lexical Resource",
            Self::Grammar => "Grammatical Range & Accuracy",
            Self::Pronunciation => "Pronunciation",
        }
    }

    /// General advice used when no model suggestion is available.
    #[must_use]
    pub const fn advice(&self) -> &'static str {
        match self {
            Self::Fluency => {
                "Practise speaking for two minutes without pausing and link ideas with discourse markers"
            }
            Self::Lexical => {
                "Build topic vocabulary lists and try paraphrasing instead of repeating words"
            }
            Self::Grammar => {
                "Mix simple and complex sentences and check verb tenses when describing past events"
            }
            Self::Pronunciation => {
                "Record yourself and compare word stress and intonation with native speakers"
            }
        }
    }
}

impl std::fmt::Display for ReportCriterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Input
// ============================================================================

/// Score and suggestions for one criterion of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionInput {
    /// Band score in `[0, 9]`.
    pub score: f64,
    /// Suggestions from the examiner model, if any.
    pub suggestions: Vec<String>,
}

impl CriterionInput {
    /// Creates a new criterion input.
    #[must_use]
    pub const fn new(score: f64, suggestions: Vec<String>) -> Self {
        Self { score, suggestions }
    }
}

/// One answered question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnInput {
    /// Turn number (1-indexed).
    pub turn: u32,
    /// The question asked.
    pub question: String,
    /// Transcript of the answer.
    pub response: String,
    /// Overall band score of the answer.
    pub overall_score: f64,
    /// Length of the recorded answer.
    pub audio_duration_secs: f64,
    /// Score and suggestions per criterion.
    pub feedback: BTreeMap<ReportCriterion, CriterionInput>,
}

impl TurnInput {
    /// Score for one criterion, if it was recorded.
    #[must_use]
    pub fn score(&self, criterion: ReportCriterion) -> Option<f64> {
        self.feedback.get(&criterion).map(|c| c.score)
    }
}

/// Everything the generator needs about a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportInput {
    /// Conversation topic.
    pub topic: String,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// When the session ended.
    pub ended_at: DateTime<Utc>,
    /// Difficulty at the end of the session.
    pub final_difficulty: f64,
    /// Answered turns in order.
    pub turns: Vec<TurnInput>,
}

// ============================================================================
// Report
// ============================================================================

/// Complete practice report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Conversation topic.
    pub topic: String,

    /// Session-level figures.
    pub summary: ReportSummary,

    /// Results per criterion, in reporting order.
    pub criteria: Vec<CriterionReport>,

    /// The answered turns.
    pub turns: Vec<TurnInput>,

    /// Prioritized recommendations for improvement.
    pub recommendations: Vec<Recommendation>,
}

impl Report {
    /// Serializes the report to JSON.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Serialization` if JSON serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(ReportError::from)
    }

    /// Criteria flagged for improvement.
    #[must_use]
    pub fn improvement_areas(&self) -> Vec<ReportCriterion> {
        self.criteria
            .iter()
            .filter(|c| c.needs_improvement)
            .map(|c| c.criterion)
            .collect()
    }
}

/// Session-level figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Number of answered questions.
    pub questions_answered: u32,

    /// Mean overall score across turns.
    pub average_overall: f64,

    /// Direction of the overall score from first to last turn.
    pub trend: Trend,

    /// Difficulty at the end of the session.
    pub final_difficulty: f64,

    /// Total recorded answer length in seconds.
    pub speaking_time_secs: f64,

    /// Wall-clock session length in seconds.
    pub duration_seconds: u64,

    /// When the session started.
    pub started_at: DateTime<Utc>,
}

/// Direction of the overall score across the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// The last turn scored clearly higher than the first.
    Improving,
    /// The last turn scored clearly lower than the first.
    Declining,
    /// Within the tolerance, or only one turn.
    Steady,
}

impl Trend {
    /// Compares the first and last overall scores.
    ///
    /// ```
    /// use speakwell_report::Trend;
    ///
    /// assert_eq!(Trend::between(5.0, 6.0), Trend::Improving);
    /// assert_eq!(Trend::between(6.0, 6.25), Trend::Steady);
    /// assert_eq!(Trend::between(6.0, 5.5), Trend::Declining);
    /// ```
    #[must_use]
    pub fn between(first: f64, last: f64) -> Self {
        let delta = last - first;
        if delta > TREND_TOLERANCE {
            Self::Improving
        } else if delta < -TREND_TOLERANCE {
            Self::Declining
        } else {
            Self::Steady
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Improving => "Improving",
            Self::Declining => "Declining",
            Self::Steady => "Steady",
        }
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Aggregated results for one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionReport {
    /// The criterion.
    pub criterion: ReportCriterion,
    /// Mean score across turns.
    pub average: f64,
    /// Highest score of any turn.
    pub best: f64,
    /// Score of the last turn.
    pub latest: f64,
    /// Whether the average is below the improvement threshold.
    pub needs_improvement: bool,
}

/// A prioritized recommendation for the learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Priority of this recommendation (1 = highest priority).
    pub priority: u32,

    /// The criterion it addresses.
    pub criterion: ReportCriterion,

    /// Average score of that criterion.
    pub average: f64,

    /// What to work on.
    pub description: String,
}

// ============================================================================
// ReportGenerator
// ============================================================================

/// Aggregates a finished session into a [`Report`].
pub struct ReportGenerator<'a> {
    input: &'a ReportInput,
}

impl<'a> ReportGenerator<'a> {
    /// Creates a new generator for the given input.
    #[must_use]
    pub const fn new(input: &'a ReportInput) -> Self {
        Self { input }
    }

    /// Builds the report.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidData` if the topic is blank or no turn
    /// was answered.
    pub fn generate(&self) -> Result<Report> {
        let input = self.input;
        if input.topic.trim().is_empty() {
            return Err(ReportError::InvalidData("topic is required".to_string()));
        }
        let (Some(first), Some(last)) = (input.turns.first(), input.turns.last()) else {
            return Err(ReportError::InvalidData(
                "at least one answered turn is required".to_string(),
            ));
        };

        let criteria: Vec<CriterionReport> = ReportCriterion::ALL
            .into_iter()
            .map(|criterion| self.criterion_report(criterion))
            .collect();

        let count = input.turns.len() as f64;
        let average_overall = input.turns.iter().map(|t| t.overall_score).sum::<f64>() / count;
        let duration_seconds = u64::try_from(
            (input.ended_at - input.started_at).num_seconds().max(0),
        )
        .unwrap_or_default();

        let summary = ReportSummary {
            questions_answered: u32::try_from(input.turns.len()).unwrap_or(u32::MAX),
            average_overall: round2(average_overall),
            trend: Trend::between(first.overall_score, last.overall_score),
            final_difficulty: round2(input.final_difficulty),
            speaking_time_secs: round2(input.turns.iter().map(|t| t.audio_duration_secs).sum()),
            duration_seconds,
            started_at: input.started_at,
        };

        let recommendations = self.recommendations(&criteria);

        Ok(Report {
            topic: input.topic.clone(),
            summary,
            criteria,
            turns: input.turns.clone(),
            recommendations,
        })
    }

    fn criterion_report(&self, criterion: ReportCriterion) -> CriterionReport {
        let scores: Vec<f64> = self
            .input
            .turns
            .iter()
            .filter_map(|t| t.score(criterion))
            .collect();

        if scores.is_empty() {
            return CriterionReport {
                criterion,
                average: 0.0,
                best: 0.0,
                latest: 0.0,
                needs_improvement: true,
            };
        }

        let average = scores.iter().sum::<f64>() / scores.len() as f64;
        let best = scores.iter().copied().fold(f64::MIN, f64::max);
        let latest = scores.last().copied().unwrap_or_default();

        CriterionReport {
            criterion,
            average: round2(average),
            best,
            latest,
            needs_improvement: average < IMPROVEMENT_THRESHOLD,
        }
    }

    /// One recommendation per weak criterion, weakest first.
    fn recommendations(&self, criteria: &[CriterionReport]) -> Vec<Recommendation> {
        let mut weak: Vec<&CriterionReport> =
            criteria.iter().filter(|c| c.needs_improvement).collect();
        weak.sort_by(|a, b| a.average.total_cmp(&b.average));

        weak.into_iter()
            .zip(1..)
            .map(|(report, priority)| Recommendation {
                priority,
                criterion: report.criterion,
                average: report.average,
                description: self
                    .latest_suggestion(report.criterion)
                    .unwrap_or_else(|| report.criterion.advice().to_string()),
            })
            .collect()
    }

    /// Most recent non-blank model suggestion for a criterion.
    fn latest_suggestion(&self, criterion: ReportCriterion) -> Option<String> {
        self.input.turns.iter().rev().find_map(|turn| {
            turn.feedback
                .get(&criterion)?
                .suggestions
                .iter()
                .map(|s| s.trim())
                .find(|s| !s.is_empty())
                .map(ToString::to_string)
        })
    }
}

/// Rounds to two decimal places.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// Tests
// ============================================================================
