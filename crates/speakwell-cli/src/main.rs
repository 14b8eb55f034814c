//! Speakwell CLI
//!
//! Main entry point for serving the practice API or running a practice
//! session from recorded answers.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use speakwell_audio::CapturedAudio;
use speakwell_orchestrator::{
    create_router, AppState, AzureSpeechClient, ChatCompletionClient, Config, Criterion,
    CriterionFeedback, Exchange, PracticeError, PracticeManager, Session, SessionSummary,
};
use speakwell_report::{
    json::JsonGenerator, CriterionInput, MarkdownGenerator, ReportCriterion, ReportGenerator,
    ReportInput, TurnInput,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// File name of the Markdown report.
const MARKDOWN_REPORT: &str = "speakwell-report.md";

/// File name of the JSON report.
const JSON_REPORT: &str = "speakwell-report.json";

/// Speakwell - Speaking Practice Tool
///
/// Runs IELTS-style speaking practice: examiner questions, transcription of
/// spoken answers, scoring on the four speaking criteria and adaptive
/// difficulty.
#[derive(Parser, Debug)]
#[command(name = "speakwell")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: speakwell.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the practice HTTP API
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Practice one topic using recorded WAV answers, one per question
    Practice {
        /// Topic to practice
        #[arg(short, long)]
        topic: String,

        /// Recorded answers (16-bit PCM WAV), answered in order
        #[arg(value_name = "WAV", required = true)]
        answers: Vec<PathBuf>,

        /// Output directory for reports
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<String>,
    },

    /// List the configured practice topics
    Topics,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, "Config file");

    let result = match args.command {
        Command::Serve { port } => run_server(args.config.as_deref(), port).await,
        Command::Practice {
            topic,
            answers,
            output_dir,
        } => run_practice(args.config.as_deref(), &topic, &answers, output_dir).await,
        Command::Topics => list_topics(args.config.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Serves the HTTP API until Ctrl+C.
async fn run_server(config_path: Option<&str>, port: u16) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    print_config(&config);

    let manager = build_manager(&config)?;
    let router = create_router(AppState::new(manager));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        })
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))?;

    Ok(())
}

/// Runs one practice session over recorded answers and writes the reports.
async fn run_practice(
    config_path: Option<&str>,
    topic: &str,
    answers: &[PathBuf],
    output_dir: Option<String>,
) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;

    if let Some(output_dir) = output_dir {
        config.output_dir = output_dir;
    }

    // Re-validate after overrides
    config.validate()?;

    print_config(&config);

    let mut manager = build_manager(&config)?;
    let session = manager.start_session(topic)?;
    tracing::info!(topic = %session.topic, answers = answers.len(), "Practice session started");

    println!();
    println!("Practicing: {}", session.topic);
    println!("Press Ctrl+C to stop");

    run_session(
        &mut manager,
        answers,
        Path::new(&config.output_dir),
        tokio::signal::ctrl_c(),
    )
    .await
}

/// Answers questions until the recordings run out, `interrupt` resolves or a
/// step fails, then ends the session and reports on whatever was answered.
///
/// A failed step is returned after the reports are written.
async fn run_session<F>(
    manager: &mut PracticeManager,
    answers: &[PathBuf],
    output_dir: &Path,
    interrupt: F,
) -> anyhow::Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    let mut failure = None;

    tokio::select! {
        Ok(()) = interrupt => {
            tracing::info!("Received Ctrl+C, ending session");
            println!();
            println!("Interrupted, ending session");
        }
        result = answer_questions(manager, answers) => {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Practice stopped early");
                println!();
                println!("Stopped early: {e}");
                failure = Some(e);
            }
        }
    }

    let summary = manager.end_session()?;

    println!();
    match summary {
        Some(summary) => {
            print_summary(&summary);
            generate_reports(manager.session(), output_dir)?;
        }
        None => println!("No questions were answered; no report written."),
    }

    failure.map_or(Ok(()), Err)
}

/// Prints the configured topics.
fn list_topics(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    println!("Available topics:");
    for topic in config.topic_list() {
        println!("  {topic}");
    }

    Ok(())
}

// ============================================================================
// Practice Loop
// ============================================================================

/// Asks one question per recording and feeds the recording back as the answer.
///
/// A recording that cannot be transcribed is skipped; the next one answers a
/// fresh question.
async fn answer_questions(
    manager: &mut PracticeManager,
    answers: &[PathBuf],
) -> anyhow::Result<()> {
    for path in answers {
        let question = manager.get_next_question().await?;
        println!();
        println!("Q{}: {question}", manager.session().turn_index + 1);

        let audio = load_recording(path).await?;

        match manager.handle_response(&audio).await {
            Ok(exchange) => {
                print_exchange(&exchange);
                manager.acknowledge_feedback()?;
            }
            Err(
                e @ (PracticeError::TranscriptionFailed { .. } | PracticeError::NoAudioCaptured),
            ) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping recording");
                println!("  Skipped {}: {e}", path.display());
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

async fn load_recording(path: &Path) -> anyhow::Result<CapturedAudio> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to read recording '{}': {e}\n\nSuggestion: Check the path to the WAV file",
            path.display()
        )
    })?;
    Ok(CapturedAudio::Wav(bytes))
}

// ============================================================================
// Setup
// ============================================================================

/// Loads configuration from file or uses defaults.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Builds the service clients and the practice manager.
fn build_manager(config: &Config) -> anyhow::Result<PracticeManager> {
    let completion = ChatCompletionClient::from_config(&config.completion)
        .map_err(|e| anyhow::anyhow!("Completion service unavailable: {e}"))?;
    let speech = AzureSpeechClient::from_config(&config.speech)
        .map_err(|e| anyhow::anyhow!("Speech service unavailable: {e}"))?;

    tracing::debug!(
        completion_url = %completion.url(),
        speech_url = %speech.url(),
        "Service clients ready"
    );

    Ok(PracticeManager::new(
        config,
        Arc::new(completion),
        Arc::new(speech),
    ))
}

// ============================================================================
// Output
// ============================================================================

/// Prints configuration summary.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!(
        "  Completion: {:?} ({})",
        config.completion.api_style, config.completion.model
    );
    println!("  Speech region: {}", config.speech.region);
    println!("  Language: {}", config.speech.language.code());
    println!(
        "  Rate limit: {} requests/minute",
        config.rate_limit.requests_per_minute
    );
    println!("  Output directory: {}", config.output_dir);
}

/// Prints the transcript, scores and feedback for one answer.
fn print_exchange(exchange: &Exchange) {
    println!("  You said: {}", exchange.response);
    println!(
        "  Overall: {:.1} / 9 ({:.1}s)",
        exchange.evaluation.overall_score, exchange.audio_duration_secs
    );

    for (criterion, feedback) in &exchange.evaluation.feedback {
        println!("  {}: {:.1}", criterion.label(), feedback.score);
        for suggestion in &feedback.suggestions {
            println!("    - {suggestion}");
        }
    }
}

/// Prints the end-of-session summary.
fn print_summary(summary: &SessionSummary) {
    println!("=== Speakwell Session Summary ===");
    println!("Topic: {}", summary.topic);
    println!("Questions answered: {}", summary.questions_answered);
    println!("Average overall: {:.1}", summary.average_overall);

    for (criterion, average) in &summary.average_scores {
        println!("  {}: {average:.1}", criterion.label());
    }

    if summary.improvement_areas.is_empty() {
        println!("Focus areas: none");
    } else {
        let areas = summary
            .improvement_areas
            .iter()
            .map(Criterion::label)
            .collect::<Vec<_>>()
            .join(", ");
        println!("Focus areas: {areas}");
    }

    println!("Final difficulty: {:.2}", summary.final_difficulty);
    println!("Speaking time: {:.0}s", summary.speaking_time_secs);
}

/// Generates reports from the ended session.
///
/// Creates both Markdown and JSON reports in the output directory.
fn generate_reports(session: &Session, output_dir: &Path) -> anyhow::Result<()> {
    println!();
    println!("Generating reports...");

    let input = create_report_input(session);
    let report = ReportGenerator::new(&input).generate()?;

    std::fs::create_dir_all(output_dir)?;

    let md_path = output_dir.join(MARKDOWN_REPORT);
    std::fs::write(&md_path, MarkdownGenerator::new(&report).generate())?;
    println!("  Markdown report: {}", md_path.display());

    let json_path = output_dir.join(JSON_REPORT);
    JsonGenerator::new(&report).write_to_file(&json_path, true)?;
    println!("  JSON report: {}", json_path.display());

    Ok(())
}

/// Creates a `ReportInput` from the session history.
fn create_report_input(session: &Session) -> ReportInput {
    ReportInput {
        topic: session.topic.clone(),
        started_at: session.started_at,
        ended_at: session.ended_at.unwrap_or(session.updated_at),
        final_difficulty: session.difficulty,
        turns: session.history.iter().map(convert_exchange).collect(),
    }
}

/// Converts `Criterion` to `ReportCriterion`.
const fn convert_criterion(criterion: Criterion) -> ReportCriterion {
    match criterion {
        Criterion::Fluency => ReportCriterion::Fluency,
        Criterion::Lexical => ReportCriterion::Lexical,
        Criterion::Grammar => ReportCriterion::Grammar,
        Criterion::Pronunciation => ReportCriterion::Pronunciation,
    }
}

/// Converts `CriterionFeedback` to `CriterionInput`.
///
/// Placeholder suggestions from an unavailable evaluation are dropped.
fn convert_feedback(feedback: &CriterionFeedback, unavailable: bool) -> CriterionInput {
    let suggestions = if unavailable {
        Vec::new()
    } else {
        feedback.suggestions.clone()
    };
    CriterionInput::new(feedback.score, suggestions)
}

/// Converts an `Exchange` to `TurnInput`.
fn convert_exchange(exchange: &Exchange) -> TurnInput {
    let unavailable = exchange.evaluation.is_unavailable();
    TurnInput {
        turn: exchange.turn,
        question: exchange.question.clone(),
        response: exchange.response.clone(),
        overall_score: exchange.evaluation.overall_score,
        audio_duration_secs: exchange.audio_duration_secs,
        feedback: exchange
            .evaluation
            .feedback
            .iter()
            .map(|(criterion, feedback)| {
                (
                    convert_criterion(*criterion),
                    convert_feedback(feedback, unavailable),
                )
            })
            .collect(),
    }
}

// ============================================================================
// Tests
// ============================================================================
