use serde::Deserialize;
use tts_core::{SynthesisRequest, VoiceSelector};

use crate::error::ApiError;

/// Maximum text length for TTS requests, in characters
const MAX_TEXT_LENGTH: usize = 5000;

const DEFAULT_SPEED: f64 = 1.0;

/// Body shared by the WebSocket, synthesis and chat endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    #[serde(default)]
    pub voice: Option<VoiceSelector>,
    #[serde(default)]
    pub voice_id: Option<VoiceSelector>,
    #[serde(default)]
    pub speaker_id: Option<VoiceSelector>,
    #[serde(default)]
    pub speed: Option<f64>,
}

impl SpeechRequest {
    /// `voice`, then `voice_id`, then `speaker_id`; index 0 when none is set.
    pub fn voice(&self) -> VoiceSelector {
        self.voice
            .clone()
            .or_else(|| self.voice_id.clone())
            .or_else(|| self.speaker_id.clone())
            .unwrap_or_default()
    }

    pub fn speed(&self) -> f64 {
        self.speed.unwrap_or(DEFAULT_SPEED)
    }

    pub fn into_synthesis_request(self) -> Result<SynthesisRequest, ApiError> {
        validate_text(&self.text)?;
        let voice = self.voice();
        let speed = self.speed();
        Ok(SynthesisRequest::new(self.text, voice, speed)?)
    }
}

/// Validate text for any synthesis request
pub fn validate_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::InvalidInput("Text cannot be empty".to_string()));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(ApiError::InvalidInput(format!(
            "Text too long (max {} characters)",
            MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

/// Parse the first frame of a WebSocket session.
pub fn parse_ws_request(frame: &str) -> Result<SynthesisRequest, ApiError> {
    let request: SpeechRequest =
        serde_json::from_str(frame).map_err(|e| ApiError::Protocol(e.to_string()))?;
    request.into_synthesis_request()
}
