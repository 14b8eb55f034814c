//! Speakwell Audio
//!
//! Audio buffer handling for spoken responses.
//!
//! This crate provides the in-memory PCM representation used throughout
//! Speakwell, a WAV container codec, conversion to the 16 kHz mono format
//! expected by speech recognizers, and the capture buffer that sits between
//! a microphone callback and the practice session.

pub mod capture;
pub mod wav;

pub use capture::{AudioCapture, CaptureSink};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sample rate required by the speech recognizer.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Channel count required by the speech recognizer.
pub const TARGET_CHANNELS: u16 = 1;

/// Errors that can occur while decoding, converting or capturing audio.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The audio bytes could not be parsed.
    #[error("malformed audio: {0}")]
    Malformed(String),

    /// The audio is well-formed but uses an encoding we cannot process.
    #[error("unsupported audio format: {0}")]
    Unsupported(String),

    /// The buffer holds no samples.
    #[error("audio contains no samples")]
    Empty,

    /// `start` was called while a recording is in progress.
    #[error("already recording")]
    AlreadyRecording,

    /// `stop` was called without an active recording.
    #[error("not currently recording")]
    NotRecording,
}

/// Lifecycle status of an [`AudioCapture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    /// Capture has been created but never started.
    #[default]
    Idle,
    /// Samples pushed to the sink are being buffered.
    Recording,
    /// Recording has been stopped; buffered samples remain readable.
    Stopped,
}

impl std::fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Recording => write!(f, "recording"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Interleaved signed 16-bit PCM audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmAudio {
    /// Interleaved samples (frame-major when `channels > 1`).
    pub samples: Vec<i16>,
    /// Frames per second.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl PcmAudio {
    /// Creates a new PCM buffer.
    #[must_use]
    pub const fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Creates a mono buffer at the given sample rate.
    #[must_use]
    pub const fn mono(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Returns `true` if the buffer holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of complete frames in the buffer.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / usize::from(self.channels)
    }

    /// Playback duration in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / f64::from(self.sample_rate)
    }

    /// Returns `true` if the buffer is already in recognizer format.
    #[must_use]
    pub const fn is_normalized(&self) -> bool {
        self.sample_rate == TARGET_SAMPLE_RATE && self.channels == TARGET_CHANNELS
    }

    /// Mixes all channels down to one by averaging each frame.
    #[must_use]
    pub fn to_mono(&self) -> Self {
        if self.channels <= 1 {
            return self.clone();
        }

        let channels = usize::from(self.channels);
        let samples = self
            .samples
            .chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                clamp_sample(f64::from(sum) / channels as f64)
            })
            .collect();

        Self::mono(samples, self.sample_rate)
    }

    /// Resamples a mono buffer to `target_rate` using linear interpolation.
    ///
    /// Multi-channel input is mixed to mono first.
    #[must_use]
    pub fn resample(&self, target_rate: u32) -> Self {
        let mono = self.to_mono();
        if mono.sample_rate == target_rate || mono.samples.is_empty() || mono.sample_rate == 0 {
            return Self::mono(mono.samples, target_rate);
        }

        let source_len = mono.samples.len();
        #[allow(clippy::cast_possible_truncation)]
        let out_len = (source_len as u64 * u64::from(target_rate) / u64::from(mono.sample_rate))
            as usize;
        let step = f64::from(mono.sample_rate) / f64::from(target_rate);
        let last = source_len - 1;

        let samples = (0..out_len)
            .map(|i| {
                let position = i as f64 * step;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let index = (position.floor() as usize).min(last);
                let frac = position - index as f64;
                let s0 = f64::from(mono.samples[index]);
                let s1 = f64::from(mono.samples[(index + 1).min(last)]);
                clamp_sample((s1 - s0).mul_add(frac, s0))
            })
            .collect();

        Self::mono(samples, target_rate)
    }

    /// Converts to 16 kHz mono, the format expected by the recognizer.
    #[must_use]
    pub fn normalize(&self) -> Self {
        if self.is_normalized() {
            return self.clone();
        }
        self.resample(TARGET_SAMPLE_RATE)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn clamp_sample(value: f64) -> i16 {
    value
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Audio handed to the practice session for one response.
///
/// A recording arrives either as raw PCM from [`AudioCapture`] or as a WAV
/// container uploaded by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedAudio {
    /// A RIFF/WAVE container.
    Wav(Vec<u8>),
    /// Raw interleaved PCM.
    Pcm(PcmAudio),
}

impl CapturedAudio {
    /// Returns `true` if nothing at all was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Wav(bytes) => bytes.is_empty(),
            Self::Pcm(pcm) => pcm.is_empty(),
        }
    }

    /// Decodes the payload into PCM.
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::Malformed`] or [`AudioError::Unsupported`] if a
    /// WAV payload cannot be parsed, and [`AudioError::Empty`] when there are
    /// no samples to work with.
    pub fn decode(&self) -> Result<PcmAudio, AudioError> {
        let pcm = match self {
            Self::Wav(bytes) => wav::decode(bytes)?,
            Self::Pcm(pcm) => {
                if pcm.channels == 0 || pcm.sample_rate == 0 {
                    return Err(AudioError::Malformed(format!(
                        "invalid PCM parameters: {} channels at {} Hz",
                        pcm.channels, pcm.sample_rate
                    )));
                }
                pcm.clone()
            }
        };

        if pcm.frame_count() == 0 {
            return Err(AudioError::Empty);
        }
        Ok(pcm)
    }
}

impl From<PcmAudio> for CapturedAudio {
    fn from(pcm: PcmAudio) -> Self {
        Self::Pcm(pcm)
    }
}
