//! Decoded narration audio shared between the gateway, the caches and playback

use base64::engine::general_purpose;
use base64::Engine;
use std::sync::Arc;
use std::time::Duration;

/// Sample rate of synthesized speech (24 kHz mono S16LE)
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;
pub const SPEECH_CHANNELS: u16 = 1;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("PCM payload has odd length {0}")]
    OddLength(usize),
    #[error("PCM payload is not a whole number of frames")]
    PartialFrame,
    #[error("Empty PCM payload")]
    Empty,
}

/// Playable interleaved 16-bit PCM. Cloning shares the samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Arc<[i16]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Decode raw little-endian S16 bytes.
    pub fn from_pcm_s16le(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<Self, MediaError> {
        if bytes.is_empty() {
            return Err(MediaError::Empty);
        }
        if bytes.len() % 2 != 0 {
            return Err(MediaError::OddLength(bytes.len()));
        }
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();
        if samples.len() % usize::from(channels.max(1)) != 0 {
            return Err(MediaError::PartialFrame);
        }
        Ok(Self::new(samples, sample_rate, channels))
    }

    /// Decode base64 inline audio as returned by the speech model.
    pub fn from_base64_speech(data: &str) -> Result<Self, MediaError> {
        let bytes = general_purpose::STANDARD.decode(data)?;
        Self::from_pcm_s16le(&bytes, SPEECH_SAMPLE_RATE, SPEECH_CHANNELS)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Samples normalised to [-1.0, 1.0).
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|s| f32::from(*s) / 32768.0).collect()
    }
}
