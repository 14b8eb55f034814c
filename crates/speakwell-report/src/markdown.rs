//! Markdown report generation.
//!
//! [`MarkdownGenerator`] renders a [`Report`] as a document the learner can
//! read after a session:
//!
//! - A summary table with session figures
//! - A criteria table with average, best and latest scores
//! - One section per answered turn
//! - Prioritized recommendations

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::{Report, TurnInput};

/// Generates Markdown reports from practice results.
pub struct MarkdownGenerator<'a> {
    report: &'a Report,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_criteria(&mut output);
        self.write_turns(&mut output);
        self.write_recommendations(&mut output);
        Self::write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Speakwell Practice Report: {}\n",
            escape_markdown(&self.report.topic)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;
        let focus = self
            .report
            .improvement_areas()
            .iter()
            .map(|c| c.label())
            .collect::<Vec<_>>()
            .join(", ");

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(
            output,
            "| Started | {} |",
            format_timestamp(&summary.started_at)
        );
        let _ = writeln!(
            output,
            "| Questions Answered | {} |",
            summary.questions_answered
        );
        let _ = writeln!(output, "| Average Overall | {:.2} |", summary.average_overall);
        let _ = writeln!(output, "| Trend | {} |", summary.trend);
        let _ = writeln!(output, "| Final Difficulty | {:.2} |", summary.final_difficulty);
        let _ = writeln!(
            output,
            "| Speaking Time | {} |",
            format_seconds(summary.speaking_time_secs)
        );
        let _ = writeln!(
            output,
            "| Session Duration | {} |",
            format_duration(summary.duration_seconds)
        );
        let _ = writeln!(
            output,
            "| Focus Areas | {} |",
            if focus.is_empty() { "None" } else { &focus }
        );
        let _ = writeln!(output);
    }

    fn write_criteria(&self, output: &mut String) {
        let _ = writeln!(output, "## Criteria\n");
        let _ = writeln!(output, "| Criterion | Average | Best | Latest | Status |");
        let _ = writeln!(output, "|-----------|---------|------|--------|--------|");

        for c in &self.report.criteria {
            let status = if c.needs_improvement {
                "Needs work"
            } else {
                "On track"
            };
            let _ = writeln!(
                output,
                "| {} | {:.1} | {:.1} | {:.1} | {status} |",
                c.criterion, c.average, c.best, c.latest
            );
        }

        let _ = writeln!(output);
    }

    fn write_turns(&self, output: &mut String) {
        let _ = writeln!(output, "## Turns\n");

        if self.report.turns.is_empty() {
            let _ = writeln!(output, "*No questions answered.*\n");
            return;
        }

        for turn in &self.report.turns {
            Self::write_turn(output, turn);
        }
    }

    /// Writes a single turn: question, transcript and per-criterion feedback.
    fn write_turn(output: &mut String, turn: &TurnInput) {
        let _ = writeln!(output, "### Turn {}\n", turn.turn);
        let _ = writeln!(output, "**Question**: {}", escape_markdown(&turn.question));
        let _ = writeln!(output, "**Answer**: {}", escape_markdown(&turn.response));
        let _ = writeln!(
            output,
            "**Overall**: {:.1} / 9 ({})\n",
            turn.overall_score,
            format_seconds(turn.audio_duration_secs)
        );

        let _ = writeln!(output, "| Criterion | Score | Feedback |");
        let _ = writeln!(output, "|-----------|-------|----------|");
        for (criterion, feedback) in &turn.feedback {
            let suggestions = feedback
                .suggestions
                .iter()
                .map(|s| escape_markdown(s))
                .collect::<Vec<_>>()
                .join("; ");
            let _ = writeln!(
                output,
                "| {criterion} | {:.1} | {suggestions} |",
                feedback.score
            );
        }

        let _ = writeln!(output);
    }

    fn write_recommendations(&self, output: &mut String) {
        let _ = writeln!(output, "## Recommendations\n");

        if self.report.recommendations.is_empty() {
            let _ = writeln!(
                output,
                "*Every criterion is at or above the improvement threshold.*\n"
            );
            return;
        }

        let mut sorted_recs: Vec<_> = self.report.recommendations.iter().collect();
        sorted_recs.sort_by_key(|r| r.priority);

        for rec in sorted_recs {
            let _ = writeln!(
                output,
                "{}. **[{}]** (average {:.1}) {}",
                rec.priority,
                rec.criterion,
                rec.average,
                escape_markdown(&rec.description),
            );
        }

        let _ = writeln!(output);
    }

    fn write_footer(output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&Utc::now());
        let _ = writeln!(output, "*Generated by Speakwell at {timestamp}*");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Formats a duration in seconds to a human-readable string.
///
/// Examples:
/// - 65 seconds -> "1m 5s"
/// - 3661 seconds -> "1h 1m 1s"
/// - 45 seconds -> "45s"
fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();

    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }

    parts.join(" ")
}

/// Formats fractional seconds, rounded to whole seconds.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn format_seconds(seconds: f64) -> String {
    format_duration(seconds.max(0.0).round() as u64)
}

/// Format: "YYYY-MM-DD HH:MM:SS UTC"
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes special Markdown characters in text.
///
/// This prevents transcripts and model output from being interpreted as
/// Markdown formatting or breaking table cells.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => {
                result.push_str("<br>");
            }
            _ => result.push(ch),
        }
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
