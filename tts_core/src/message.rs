//! Types shared by every engine: requests in, ordered messages out.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::TtsError;

pub const MIN_SPEED: f64 = 0.5;
pub const MAX_SPEED: f64 = 2.0;

/// Backend-selecting parameter. Process backends take a numeric speaker,
/// HTTP backends take a voice name; the engine decides how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VoiceSelector {
    Index(i64),
    Name(String),
}

impl Default for VoiceSelector {
    fn default() -> Self {
        VoiceSelector::Index(0)
    }
}

impl std::fmt::Display for VoiceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceSelector::Index(i) => write!(f, "#{i}"),
            VoiceSelector::Name(name) => f.write_str(name),
        }
    }
}

/// One text request for an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: VoiceSelector,
    pub speed: f64,
}

impl SynthesisRequest {
    pub fn new(
        text: impl Into<String>,
        voice: VoiceSelector,
        speed: f64,
    ) -> Result<Self, TtsError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(TtsError::InputError("text cannot be empty".to_string()));
        }
        if !speed.is_finite() || !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
            return Err(TtsError::InputError(format!(
                "speed must be between {MIN_SPEED} and {MAX_SPEED}"
            )));
        }
        Ok(Self { text, voice, speed })
    }

    /// Inverse-speed convention used by process backends.
    pub fn length_scale(&self) -> f64 {
        1.0 / self.speed
    }
}

/// Phoneme timing as reported by a backend, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct PhonemeSegment {
    pub phoneme: String,
    pub start_sec: f64,
    pub end_sec: f64,
}

/// Mouth-shape event derived from one [`PhonemeSegment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisemeEvent {
    pub offset_ms: u64,
    pub duration_ms: u64,
    pub phoneme: String,
    pub viseme_id: u8,
    pub viseme_name: &'static str,
}

/// Element of the ordered sequence an engine produces for one request.
///
/// A well-formed stream ends with exactly one `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// 16-bit little-endian mono PCM.
    Audio(Bytes),
    Viseme(VisemeEvent),
    Complete,
    Error(TtsError),
}

impl StreamMessage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamMessage::Complete | StreamMessage::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_scale_is_inverse_speed() {
        let req = SynthesisRequest::new("hi", VoiceSelector::default(), 2.0).unwrap();
        assert_eq!(req.length_scale(), 0.5);
        let req = SynthesisRequest::new("hi", VoiceSelector::default(), 0.5).unwrap();
        assert_eq!(req.length_scale(), 2.0);
    }

    #[test]
    fn test_request_rejects_blank_text_and_bad_speed() {
        assert!(matches!(
            SynthesisRequest::new("   ", VoiceSelector::default(), 1.0),
            Err(TtsError::InputError(_))
        ));
        assert!(SynthesisRequest::new("hi", VoiceSelector::default(), 0.49).is_err());
        assert!(SynthesisRequest::new("hi", VoiceSelector::default(), 2.01).is_err());
        assert!(SynthesisRequest::new("hi", VoiceSelector::default(), f64::NAN).is_err());
    }

    #[test]
    fn test_voice_selector_accepts_name_or_index() {
        let v: VoiceSelector = serde_json::from_str("3").unwrap();
        assert_eq!(v, VoiceSelector::Index(3));
        let v: VoiceSelector = serde_json::from_str("\"Vivian\"").unwrap();
        assert_eq!(v, VoiceSelector::Name("Vivian".into()));
        assert_eq!(serde_json::to_string(&VoiceSelector::Index(1)).unwrap(), "1");
    }
}
