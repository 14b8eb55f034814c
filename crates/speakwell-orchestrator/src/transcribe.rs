//! Turns a recorded answer into text.

use std::sync::Arc;
use std::time::Duration;

use speakwell_audio::{wav, AudioError, CapturedAudio};
use tracing::{debug, instrument};

use crate::clients::{Recognition, SpeechRecognizer};
use crate::error::{PracticeError, Result, TranscriptionErrorKind};

/// A successful transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    /// Recognised text, trimmed.
    pub text: String,
    /// Length of the recording.
    pub audio_duration_secs: f64,
}

/// Normalises audio to 16 kHz mono and sends it to the recognizer.
#[derive(Clone)]
pub struct Transcriber {
    recognizer: Arc<dyn SpeechRecognizer>,
    timeout: Duration,
}

impl std::fmt::Debug for Transcriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcriber")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Transcriber {
    /// Creates a transcriber whose recognition calls are bounded by `timeout`.
    #[must_use]
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, timeout: Duration) -> Self {
        Self {
            recognizer,
            timeout,
        }
    }

    /// Transcribes one recording.
    ///
    /// # Errors
    ///
    /// Returns `TranscriptionFailed` with kind
    /// - `MalformedInput` when the audio cannot be decoded or is empty,
    /// - `NoSpeech` when the recognizer heard nothing,
    /// - `Service` when the recognizer failed or timed out.
    #[instrument(skip_all)]
    pub async fn transcribe(&self, audio: &CapturedAudio) -> Result<Transcription> {
        let pcm = audio.decode().map_err(|e| {
            let message = match e {
                AudioError::Empty => "the recording contains no samples".to_string(),
                other => other.to_string(),
            };
            PracticeError::transcription(TranscriptionErrorKind::MalformedInput, message)
        })?;

        let audio_duration_secs = pcm.duration_secs();
        let normalized = pcm.normalize();
        if normalized.is_empty() {
            return Err(PracticeError::transcription(
                TranscriptionErrorKind::MalformedInput,
                "the recording is too short to transcribe",
            ));
        }
        debug!(
            source_rate = pcm.sample_rate,
            source_channels = pcm.channels,
            samples = normalized.samples.len(),
            duration_secs = audio_duration_secs,
            "Audio normalised for recognition"
        );

        let payload = wav::encode(&normalized);
        let recognition = tokio::time::timeout(self.timeout, self.recognizer.recognize(&payload))
            .await
            .map_err(|_| {
                PracticeError::transcription(
                    TranscriptionErrorKind::Service,
                    format!(
                        "speech service did not respond within {}s",
                        self.timeout.as_secs()
                    ),
                )
            })?
            .map_err(into_service_error)?;

        match recognition {
            Recognition::Recognized(text) if !text.trim().is_empty() => Ok(Transcription {
                text: text.trim().to_string(),
                audio_duration_secs,
            }),
            Recognition::Recognized(_) | Recognition::NoMatch => Err(PracticeError::transcription(
                TranscriptionErrorKind::NoSpeech,
                "no speech could be recognized",
            )),
        }
    }
}

/// Recognizers may fail with any error; the caller only distinguishes the
/// three transcription kinds.
fn into_service_error(e: PracticeError) -> PracticeError {
    match e {
        PracticeError::TranscriptionFailed { .. } => e,
        other => PracticeError::transcription(TranscriptionErrorKind::Service, other.to_string()),
    }
}
