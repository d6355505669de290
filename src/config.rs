//! Environment configuration for the binaries.

use crate::game::GameConfig;
use crate::gemini::{GeminiConfig, DEFAULT_API_BASE, DEFAULT_TEXT_MODEL, DEFAULT_TTS_MODEL};
use crate::playback::{AudioBackend, NullBackend, PulseBackend, WavBackend};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a whole number, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("Unknown audio backend {0:?} (expected pulse, wav or null)")]
    UnknownAudio(String),
}

/// Where narration goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioOutput {
    Pulse,
    Wav(PathBuf),
    Null,
}

impl AudioOutput {
    pub fn backend(&self, app_name: &str) -> Arc<dyn AudioBackend> {
        match self {
            AudioOutput::Pulse => Arc::new(PulseBackend::new(app_name)),
            AudioOutput::Wav(dir) => Arc::new(WavBackend::new(dir.clone())),
            AudioOutput::Null => Arc::new(NullBackend::paced()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    pub audio: AudioOutput,
    pub game: GameConfig,
}

impl AppConfig {
    /// Read from the process environment. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let millis = |key: &'static str, default: u64| -> Result<Duration, ConfigError> {
            Ok(Duration::from_millis(number(key, var(key), default)?))
        };

        let request_timeout = Duration::from_secs(number(
            "ELFWHEEL_REQUEST_TIMEOUT_SECS",
            var("ELFWHEEL_REQUEST_TIMEOUT_SECS"),
            20,
        )?);

        let gemini = GeminiConfig {
            api_key: var("GEMINI_API_KEY"),
            api_base: var("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            text_model: var("GEMINI_TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            tts_model: var("GEMINI_TTS_MODEL").unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            request_timeout,
        };

        let audio = match var("ELFWHEEL_AUDIO").map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("pulse") => AudioOutput::Pulse,
            Some("wav") => AudioOutput::Wav(PathBuf::from(
                var("ELFWHEEL_RECORD_DIR").unwrap_or_else(|| "recordings".to_string()),
            )),
            Some("null") => AudioOutput::Null,
            Some(other) => return Err(ConfigError::UnknownAudio(other.to_string())),
        };

        let game = GameConfig {
            min_spin: millis("ELFWHEEL_MIN_SPIN_MS", 2000)?,
            grace: millis("ELFWHEEL_GRACE_MS", 1500)?,
            // spin content waits at most one text/speech round trip past the spin
            result_timeout: request_timeout + Duration::from_secs(5),
        };

        Ok(Self { gemini, audio, game })
    }
}

fn number(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidNumber { name, value: v }),
    }
}
