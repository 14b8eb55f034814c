//! JSON report generation.
//!
//! [`JsonGenerator`] serializes a [`Report`] as compact single-line JSON or
//! pretty-printed for reading.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::{Report, ReportError, Result};

/// JSON report generator.
///
/// # Example
///
/// ```rust
/// use speakwell_report::{json::JsonGenerator, ReportGenerator, ReportInput};
/// # use speakwell_report::{CriterionInput, ReportCriterion, TurnInput};
/// # let input = ReportInput {
/// #     topic: "Work".to_string(),
/// #     started_at: chrono::Utc::now(),
/// #     ended_at: chrono::Utc::now(),
/// #     final_difficulty: 1.0,
/// #     turns: vec![TurnInput {
/// #         turn: 1,
/// #         question: "What do you do?".to_string(),
/// #         response: "I teach.".to_string(),
/// #         overall_score: 7.0,
/// #         audio_duration_secs: 3.0,
/// #         feedback: ReportCriterion::ALL
/// #             .into_iter()
/// #             .map(|c| (c, CriterionInput::new(7.0, Vec::new())))
/// #             .collect(),
/// #     }],
/// # };
///
/// let report = ReportGenerator::new(&input).generate().unwrap();
/// let json = JsonGenerator::new(&report).generate_pretty().unwrap();
/// assert!(json.contains("\"topic\": \"Work\""));
/// ```
pub struct JsonGenerator<'a> {
    report: &'a Report,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given report.
    #[must_use]
    pub const fn new(report: &'a Report) -> Self {
        Self { report }
    }

    /// Generates compact JSON output (single line, no extra whitespace).
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.report).map_err(ReportError::from)
    }

    /// Generates pretty-printed JSON output with two-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.report).map_err(ReportError::from)
    }

    /// Writes the JSON report to `path`, creating or overwriting the file.
    ///
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if JSON serialization fails.
    /// Returns [`ReportError::Io`] if file creation or writing fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Read;

    use super::*;
    use crate::test_support::sample_input;
    use crate::ReportGenerator;

    fn sample_report() -> Report {
        ReportGenerator::new(&sample_input()).generate().unwrap()
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("speakwell-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_generate_compact_json() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate().unwrap();

        assert!(!json.contains('\n'));
        assert!(json.contains(r#""topic":"Travel""#));
    }

    #[test]
    fn test_generate_pretty_json() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate_pretty().unwrap();

        assert!(json.contains('\n'));
        assert!(json.contains("  \"summary\": {"));
    }

    #[test]
    fn test_json_contains_all_top_level_fields() {
        let report = sample_report();
        let json = JsonGenerator::new(&report).generate().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        for field in ["topic", "summary", "criteria", "turns", "recommendations"] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["criteria"].as_array().unwrap().len(), 4);
        assert_eq!(value["criteria"][2]["criterion"], "grammar");
        assert_eq!(value["turns"][0]["feedback"]["pronunciation"]["score"], 7.0);
    }

    #[test]
    fn test_write_to_file() {
        let report = sample_report();
        let path = temp_path("report.json");

        JsonGenerator::new(&report).write_to_file(&path, true).unwrap();

        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        std::fs::remove_file(&path).ok();

        let back: Report = serde_json::from_str(&contents).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn test_write_to_file_invalid_path() {
        let report = sample_report();
        let result = JsonGenerator::new(&report).write_to_file(
            Path::new("/nonexistent/directory/speakwell-report.json"),
            false,
        );
        assert!(matches!(result, Err(ReportError::Io(_))));
    }
}
