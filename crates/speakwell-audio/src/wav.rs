//! RIFF/WAVE codec for 16-bit PCM.

use crate::{AudioError, PcmAudio};

const RIFF: &[u8; 4] = b"RIFF";
const WAVE: &[u8; 4] = b"WAVE";
const FMT: &[u8; 4] = b"fmt ";
const DATA: &[u8; 4] = b"data";

const FORMAT_PCM: u16 = 1;
const FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// Size of the header written by [`encode`].
pub const HEADER_LEN: usize = 44;

#[derive(Debug, Clone, Copy)]
struct Format {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
}

/// Decodes a WAV container holding 16-bit integer PCM.
///
/// Unknown chunks are skipped. A `data` chunk whose declared size runs past
/// the end of the buffer is truncated to the bytes actually present, and any
/// trailing partial frame is dropped.
///
/// # Errors
///
/// Returns [`AudioError::Malformed`] when the RIFF structure is broken or a
/// required chunk is missing, and [`AudioError::Unsupported`] for encodings
/// other than 16-bit PCM.
pub fn decode(bytes: &[u8]) -> Result<PcmAudio, AudioError> {
    if bytes.len() < 12 || &bytes[0..4] != RIFF || &bytes[8..12] != WAVE {
        return Err(AudioError::Malformed("missing RIFF/WAVE header".into()));
    }

    let mut format: Option<Format> = None;
    let mut data: Option<&[u8]> = None;
    let mut offset = 12;

    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let declared = read_u32(bytes, offset + 4) as usize;
        let body_start = offset + 8;
        let body_end = body_start.saturating_add(declared).min(bytes.len());
        let body = &bytes[body_start..body_end];

        if id == FMT {
            format = Some(parse_format(body)?);
        } else if id == DATA {
            data = Some(body);
        }

        // Chunks are word aligned.
        let padded = declared.saturating_add(declared & 1);
        offset = body_start.saturating_add(padded);
    }

    let format = format.ok_or_else(|| AudioError::Malformed("missing fmt chunk".into()))?;
    let data = data.ok_or_else(|| AudioError::Malformed("missing data chunk".into()))?;

    let frame_bytes = usize::from(format.channels) * usize::from(format.bits_per_sample / 8);
    let usable = data.len() - data.len() % frame_bytes;
    let samples = data[..usable]
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok(PcmAudio::new(samples, format.sample_rate, format.channels))
}

fn parse_format(body: &[u8]) -> Result<Format, AudioError> {
    if body.len() < 16 {
        return Err(AudioError::Malformed(format!(
            "fmt chunk too short ({} bytes)",
            body.len()
        )));
    }

    let audio_format = read_u16(body, 0);
    let channels = read_u16(body, 2);
    let sample_rate = read_u32(body, 4);
    let bits_per_sample = read_u16(body, 14);

    let is_pcm = match audio_format {
        FORMAT_PCM => true,
        // WAVE_FORMAT_EXTENSIBLE carries the real format tag at offset 24.
        FORMAT_EXTENSIBLE => body.len() >= 26 && read_u16(body, 24) == FORMAT_PCM,
        _ => false,
    };
    if !is_pcm {
        return Err(AudioError::Unsupported(format!(
            "format tag {audio_format:#06x}, expected integer PCM"
        )));
    }
    if bits_per_sample != 16 {
        return Err(AudioError::Unsupported(format!(
            "{bits_per_sample}-bit samples, expected 16-bit"
        )));
    }
    if channels == 0 {
        return Err(AudioError::Malformed("zero channels".into()));
    }
    if sample_rate == 0 {
        return Err(AudioError::Malformed("zero sample rate".into()));
    }

    Ok(Format {
        channels,
        sample_rate,
        bits_per_sample,
    })
}

/// Encodes PCM into a canonical 44-byte-header WAV container.
#[must_use]
pub fn encode(audio: &PcmAudio) -> Vec<u8> {
    let data_len = audio.samples.len() * 2;
    let block_align = audio.channels * 2;
    let byte_rate = audio.sample_rate * u32::from(block_align);

    let mut out = Vec::with_capacity(HEADER_LEN + data_len);
    out.extend_from_slice(RIFF);
    out.extend_from_slice(&len_u32(36 + data_len).to_le_bytes());
    out.extend_from_slice(WAVE);

    out.extend_from_slice(FMT);
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&audio.channels.to_le_bytes());
    out.extend_from_slice(&audio.sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());

    out.extend_from_slice(DATA);
    out.extend_from_slice(&len_u32(data_len).to_le_bytes());
    for sample in &audio.samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

fn len_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
