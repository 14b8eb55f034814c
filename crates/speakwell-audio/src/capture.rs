//! Recording buffer fed by an audio input callback.
//!
//! The input device runs on its own thread and hands frames to a
//! [`CaptureSink`]. The sink forwards them over an unbounded channel so the
//! callback never blocks; the owning [`AudioCapture`] drains the channel when
//! the caller wants the recorded audio.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{AudioError, CaptureStatus, PcmAudio, TARGET_CHANNELS, TARGET_SAMPLE_RATE};

/// Handle given to the audio input callback.
///
/// Cloning is cheap. Frames pushed while the capture is not recording are
/// discarded.
#[derive(Debug, Clone)]
pub struct CaptureSink {
    recording: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Vec<i16>>,
}

impl CaptureSink {
    /// Buffers a block of interleaved samples.
    ///
    /// Returns `false` if the block was dropped because the capture is not
    /// recording or has been torn down.
    pub fn push(&self, samples: &[i16]) -> bool {
        if !self.recording.load(Ordering::Acquire) || samples.is_empty() {
            return false;
        }
        self.tx.send(samples.to_vec()).is_ok()
    }

    /// Returns `true` while the owning capture is recording.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }
}

/// Records PCM frames between `start` and `stop`.
#[derive(Debug)]
pub struct AudioCapture {
    status: CaptureStatus,
    sample_rate: u32,
    channels: u16,
    recording: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Vec<i16>>,
    rx: mpsc::UnboundedReceiver<Vec<i16>>,
}

impl Default for AudioCapture {
    fn default() -> Self {
        Self::new(TARGET_SAMPLE_RATE, TARGET_CHANNELS)
    }
}

impl AudioCapture {
    /// Creates an idle capture for the given device format.
    #[must_use]
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            status: CaptureStatus::Idle,
            sample_rate,
            channels,
            recording: Arc::new(AtomicBool::new(false)),
            tx,
            rx,
        }
    }

    /// Current lifecycle status.
    pub const fn status(&self) -> CaptureStatus {
        self.status
    }

    /// Returns a sink for the input callback.
    pub fn sink(&self) -> CaptureSink {
        CaptureSink {
            recording: Arc::clone(&self.recording),
            tx: self.tx.clone(),
        }
    }

    /// Returns `true` if recording can be started from the current status.
    pub const fn can_start(&self) -> bool {
        matches!(self.status, CaptureStatus::Idle | CaptureStatus::Stopped)
    }

    /// Returns `true` if recording can be stopped from the current status.
    pub const fn can_stop(&self) -> bool {
        matches!(self.status, CaptureStatus::Recording)
    }

    /// Begins buffering frames pushed to any sink.
    ///
    /// Samples left over from a previous recording are discarded.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if !self.can_start() {
            return Err(AudioError::AlreadyRecording);
        }

        self.clear();
        self.recording.store(true, Ordering::Release);
        self.status = CaptureStatus::Recording;
        info!(
            sample_rate = self.sample_rate,
            channels = self.channels,
            "Audio capture started"
        );
        Ok(())
    }

    /// Stops buffering. Already buffered frames remain readable.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        if !self.can_stop() {
            return Err(AudioError::NotRecording);
        }

        self.recording.store(false, Ordering::Release);
        self.status = CaptureStatus::Stopped;
        info!("Audio capture stopped");
        Ok(())
    }

    /// Drains everything buffered so far.
    ///
    /// Returns `None` if nothing has been captured.
    pub fn read_buffered(&mut self) -> Option<PcmAudio> {
        let mut samples = Vec::new();
        while let Ok(block) = self.rx.try_recv() {
            samples.extend(block);
        }

        if samples.is_empty() {
            return None;
        }

        debug!(samples = samples.len(), "Drained capture buffer");
        Some(PcmAudio::new(samples, self.sample_rate, self.channels))
    }

    /// Discards any buffered frames.
    pub fn clear(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.recording.store(false, Ordering::Release);
    }
}
