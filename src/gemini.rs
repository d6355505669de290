//! Gemini content gateway
//!
//! Wraps the `generateContent` REST endpoint for the two things the game needs:
//! host narration text and synthesized speech. Both entry points fail soft: a
//! missing key, an HTTP error, a timeout or an undecodable payload turns into a
//! canned line or an absent buffer, never into an error for the caller.

use crate::media::AudioBuffer;
use crate::prompt::Prompt;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PERSONAS, SEGMENTS};
    use base64::engine::general_purpose;
    use base64::Engine;

    #[test]
    fn test_speech_request_serialization() {
        let request = GenerateContentRequest::speech("Ho ho ho!", "Puck");
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "Ho ho ho!");
        assert_eq!(json["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            json["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Puck"
        );
    }

    #[test]
    fn test_text_request_has_no_generation_config() {
        let request = GenerateContentRequest::text("hello");
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("generationConfig").is_none());
        assert!(json["contents"][0]["parts"][0].get("inlineData").is_none());
    }

    #[test]
    fn test_response_text_extraction() {
        let body = serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "Spin it, "}, {"text": "Amy!"}]}
            }]
        });
        let response: GenerateContentResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.text().as_deref(), Some("Spin it, Amy!"));

        let empty: GenerateContentResponse = serde_json::from_value(serde_json::json!({"candidates": []})).unwrap();
        assert_eq!(empty.text(), None);
    }

    #[test]
    fn test_response_audio_extraction() {
        let data = general_purpose::STANDARD.encode([0x10u8, 0x00, 0x20, 0x00]);
        let body = serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"inlineData": {"mimeType": "audio/L16;codec=pcm;rate=24000", "data": data}}]}
            }]
        });
        let response: GenerateContentResponse = serde_json::from_value(body).unwrap();
        let buffer = response.audio().unwrap();
        assert_eq!(buffer.samples(), &[16, 32]);
        assert_eq!(buffer.sample_rate(), 24_000);

        let none: GenerateContentResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(matches!(none.audio(), Err(GeminiError::EmptyResponse)));
    }

    #[test]
    fn test_error_body_message() {
        let body = r#"{"error": {"code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(api_error_message(body), "Resource exhausted");
        assert_eq!(api_error_message("gateway down"), "gateway down");
    }

    #[tokio::test]
    async fn test_offline_gateway_fails_soft() {
        let gateway = GeminiGateway::new(GeminiConfig::default()).unwrap();
        assert!(!gateway.is_online());

        let prompt = Prompt::Commentary { host: &PERSONAS[0], player: "Amy", segment: &SEGMENTS[0] };
        assert_eq!(gateway.generate_text(&prompt).await, prompt.offline_text());
        assert!(gateway.generate_speech("Ho ho ho!", "Puck").await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_uses_failure_text() {
        let gateway = GeminiGateway::new(GeminiConfig {
            api_key: Some("test-key".to_string()),
            api_base: "http://127.0.0.1:9".to_string(),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();
        let prompt = Prompt::TurnAnnouncement { host: &PERSONAS[0], player: "Ben" };
        assert_eq!(gateway.generate_text(&prompt).await, prompt.failure_text());
        assert!(gateway.generate_speech("Ho ho ho!", "Puck").await.is_none());
    }
}

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-flash-lite-latest";
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// The external generative backend as the game sees it.
///
/// Implementations never fail: errors are logged and replaced by the prompt's
/// fallback text or by `None` audio.
#[async_trait]
pub trait ContentGateway: Send + Sync {
    async fn generate_text(&self, prompt: &Prompt<'_>) -> String;

    /// Synthesize `script` with the given prebuilt voice.
    async fn generate_speech(&self, script: &str, voice: &str) -> Option<AudioBuffer>;
}

/// Error type for Gemini API operations
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Audio decode error: {0}")]
    Decode(#[from] crate::media::MediaError),
    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("No API key configured")]
    MissingApiKey,
    #[error("Response contained no usable content")]
    EmptyResponse,
    #[error("Timeout")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, GeminiError>;

/// Configuration for the Gemini gateway
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub text_model: String,
    pub tts_model: String,
    /// Upper bound for any single generation call
    pub request_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
            request_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: String,
    pub data: String,
}

/// Generation configuration (speech requests only).
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Body of a `models/{model}:generateContent` call.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    pub fn text(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                    inline_data: None,
                }],
            }],
            generation_config: None,
        }
    }

    pub fn speech(script: &str, voice: &str) -> Self {
        Self {
            generation_config: Some(GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                }),
            }),
            ..Self::text(script)
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    /// Concatenated text parts of the first candidate, if non-blank.
    pub fn text(&self) -> Option<String> {
        let text: String = self.first_parts().iter().filter_map(|p| p.text.as_deref()).collect();
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// First inline audio part of the first candidate, decoded.
    pub fn audio(&self) -> Result<AudioBuffer> {
        let inline = self
            .first_parts()
            .iter()
            .find_map(|p| p.inline_data.as_ref())
            .ok_or(GeminiError::EmptyResponse)?;
        Ok(AudioBuffer::from_base64_speech(&inline.data)?)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

/// REST client for the Gemini `generateContent` API.
#[derive(Clone)]
pub struct GeminiGateway {
    config: GeminiConfig,
    client: Client,
}

impl GeminiGateway {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { config, client })
    }

    /// Whether credentials are configured at all.
    pub fn is_online(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn generate(&self, model: &str, request: &GenerateContentRequest) -> Result<GenerateContentResponse> {
        let api_key = self.config.api_key.as_deref().ok_or(GeminiError::MissingApiKey)?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            model
        );

        // The client timeout covers the transfer; this also bounds connection setup.
        let call = self.post(&url, api_key, request);
        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(Err(GeminiError::Http(e))) if e.is_timeout() => Err(GeminiError::Timeout),
            Ok(result) => result,
            Err(_) => Err(GeminiError::Timeout),
        }
    }

    async fn post(&self, url: &str, api_key: &str, request: &GenerateContentRequest) -> Result<GenerateContentResponse> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GeminiError::Status {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }
        Ok(serde_json::from_str::<GenerateContentResponse>(&body)?)
    }

    /// Text generation without the fallback layer. `Ok(None)` means the model answered with nothing.
    pub async fn try_generate_text(&self, prompt: &Prompt<'_>) -> Result<Option<String>> {
        let request = GenerateContentRequest::text(&prompt.render());
        let response = self.generate(&self.config.text_model, &request).await?;
        Ok(response.text())
    }

    /// Speech generation without the fallback layer.
    pub async fn try_generate_speech(&self, script: &str, voice: &str) -> Result<AudioBuffer> {
        let request = GenerateContentRequest::speech(script, voice);
        let response = self.generate(&self.config.tts_model, &request).await?;
        response.audio()
    }
}

#[async_trait]
impl ContentGateway for GeminiGateway {
    async fn generate_text(&self, prompt: &Prompt<'_>) -> String {
        if !self.is_online() {
            return prompt.offline_text();
        }
        match self.try_generate_text(prompt).await {
            Ok(Some(text)) => {
                debug!("Generated {} ({} chars)", prompt.kind(), text.len());
                text
            }
            Ok(None) => {
                warn!("Empty {} from model, using canned line", prompt.kind());
                prompt.empty_text()
            }
            Err(e) => {
                error!("Error fetching {}: {}", prompt.kind(), e);
                prompt.failure_text()
            }
        }
    }

    async fn generate_speech(&self, script: &str, voice: &str) -> Option<AudioBuffer> {
        if !self.is_online() {
            return None;
        }
        match self.try_generate_speech(script, voice).await {
            Ok(buffer) => {
                debug!("Synthesized {:.1}s of speech with voice {}", buffer.duration().as_secs_f32(), voice);
                Some(buffer)
            }
            Err(e) => {
                error!("Error generating elf speech: {}", e);
                None
            }
        }
    }
}
