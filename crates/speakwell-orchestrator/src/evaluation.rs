//! Scoring types shared by the scoring engine, the session and the API.
//!
//! An [`Evaluation`] is total over the four [`Criterion`] values: every
//! constructor fills in missing criteria, so consumers can index it without
//! checking for absent keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lowest band score.
pub const MIN_SCORE: f64 = 0.0;

/// Highest band score.
pub const MAX_SCORE: f64 = 9.0;

/// Score used when a criterion could not be evaluated.
pub const NEUTRAL_SCORE: f64 = 5.0;

/// Weight of each criterion in the overall score.
pub const CRITERION_WEIGHT: f64 = 0.25;

/// Suggestion attached to every criterion when the whole scoring call failed.
pub const UNAVAILABLE_SUGGESTION: &str = "Evaluation unavailable";

// ============================================================================
// Criterion
// ============================================================================

/// One of the four scored dimensions of a spoken answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    /// Fluency and coherence.
    Fluency,
    /// Lexical resource (vocabulary range and precision).
    Lexical,
    /// Grammatical range and accuracy.
    Grammar,
    /// Pronunciation.
    Pronunciation,
}

impl Criterion {
    /// All criteria in reporting order.
    pub const ALL: [Self; 4] = [
        Self::Fluency,
        Self::Lexical,
        Self::Grammar,
        Self::Pronunciation,
    ];

    /// Short internal name.
    ///
    /// ```
    /// use speakwell_orchestrator::Criterion;
    ///
    /// assert_eq!(Criterion::Lexical.as_str(), "lexical");
    /// ```
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fluency => "fluency",
            Self::Lexical => "lexical",
            Self::Grammar => "grammar",
            Self::Pronunciation => "pronunciation",
        }
    }

    /// Band descriptor name used in scoring prompts and responses.
    ///
    /// ```
    /// use speakwell_orchestrator::Criterion;
    ///
    /// assert_eq!(Criterion::Grammar.label(), "Grammatical Range & Accuracy");
    /// ```
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Fluency => "Fluency & Coherence",
            Self::Lexical => "Lexical Resource",
            Self::Grammar => "Grammatical Range & Accuracy",
            Self::Pronunciation => "Pronunciation",
        }
    }

    /// Looks up a criterion by its band descriptor name, ignoring case and
    /// surrounding whitespace.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(label))
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CriterionFeedback
// ============================================================================

/// Score and advice for a single criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionFeedback {
    /// Band score in `[0, 9]`.
    pub score: f64,
    /// Suggestions for improvement, most important first.
    pub suggestions: Vec<String>,
}

impl CriterionFeedback {
    /// Creates feedback, clamping the score into the band range.
    #[must_use]
    pub fn new(score: f64, suggestions: Vec<String>) -> Self {
        Self {
            score: clamp_score(score),
            suggestions,
        }
    }

    /// Placeholder for a criterion the evaluator did not return.
    #[must_use]
    pub fn not_evaluated(criterion: Criterion) -> Self {
        Self::new(
            NEUTRAL_SCORE,
            vec![format!("Unable to evaluate {}", criterion.label())],
        )
    }

    /// Placeholder used when the whole scoring call failed.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(NEUTRAL_SCORE, vec![UNAVAILABLE_SUGGESTION.to_string()])
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Scores and feedback for one spoken answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Score per criterion.
    pub scores: BTreeMap<Criterion, f64>,
    /// Score and suggestions per criterion.
    pub feedback: BTreeMap<Criterion, CriterionFeedback>,
    /// Equal-weight mean of the four scores, rounded to one decimal.
    pub overall_score: f64,
    /// Set only on the whole-call failure placeholder.
    #[serde(default)]
    pub unavailable: bool,
}

impl Evaluation {
    /// Builds an evaluation from parsed feedback.
    ///
    /// Criteria absent from `parsed` are backfilled with
    /// [`CriterionFeedback::not_evaluated`].
    #[must_use]
    pub fn from_feedback(mut parsed: BTreeMap<Criterion, CriterionFeedback>) -> Self {
        for criterion in Criterion::ALL {
            parsed
                .entry(criterion)
                .or_insert_with(|| CriterionFeedback::not_evaluated(criterion));
        }

        let scores: BTreeMap<Criterion, f64> = parsed
            .iter()
            .map(|(criterion, fb)| (*criterion, clamp_score(fb.score)))
            .collect();
        let overall_score = overall_score(&scores);

        Self {
            scores,
            feedback: parsed,
            overall_score,
            unavailable: false,
        }
    }

    /// Builds an evaluation from bare scores with no suggestions.
    #[must_use]
    pub fn from_scores(scores: impl IntoIterator<Item = (Criterion, f64)>) -> Self {
        Self::from_feedback(
            scores
                .into_iter()
                .map(|(c, s)| (c, CriterionFeedback::new(s, Vec::new())))
                .collect(),
        )
    }

    /// The neutral evaluation returned when scoring failed entirely.
    ///
    /// ```
    /// use speakwell_orchestrator::Evaluation;
    ///
    /// let eval = Evaluation::unavailable();
    /// assert_eq!(eval.overall_score, 5.0);
    /// assert!(eval.is_unavailable());
    /// ```
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::from_feedback(
                Criterion::ALL
                    .into_iter()
                    .map(|c| (c, CriterionFeedback::unavailable()))
                    .collect(),
            )
        }
    }

    /// Returns `true` if this is the whole-call failure placeholder.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        self.unavailable
    }

    /// Score for one criterion.
    #[must_use]
    pub fn score(&self, criterion: Criterion) -> f64 {
        self.scores.get(&criterion).copied().unwrap_or(NEUTRAL_SCORE)
    }
}

/// Clamps a raw score into `[0, 9]`, mapping NaN to the neutral score.
#[must_use]
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return NEUTRAL_SCORE;
    }
    score.clamp(MIN_SCORE, MAX_SCORE)
}

/// Weighted overall score, rounded to one decimal place.
#[must_use]
pub fn overall_score(scores: &BTreeMap<Criterion, f64>) -> f64 {
    let total: f64 = Criterion::ALL
        .iter()
        .map(|c| scores.get(c).copied().unwrap_or(NEUTRAL_SCORE) * CRITERION_WEIGHT)
        .sum();
    round1(total)
}

/// Rounds to one decimal place, exact halves to even.
///
/// ```
/// use speakwell_orchestrator::evaluation::round1;
///
/// assert_eq!(round1(6.25), 6.2);
/// assert_eq!(round1(6.75), 6.8);
/// assert_eq!(round1(6.375), 6.4);
/// ```
#[must_use]
#[allow(clippy::float_cmp)]
pub fn round1(value: f64) -> f64 {
    let scaled = value * 10.0;
    let rounded = scaled.round();
    // Band scores are quarter steps, so ties are exact in binary.
    let rounded = if (rounded - scaled).abs() == 0.5 {
        2.0 * (scaled / 2.0).round()
    } else {
        rounded
    };
    rounded / 10.0
}
