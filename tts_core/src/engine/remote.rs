//! OpenAI-compatible streaming speech endpoint (Qwen3-TTS server).
//!
//! Audio only: body chunks are forwarded the moment they arrive.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{MessageStream, SynthesisEngine};
use crate::error::TtsError;
use crate::message::{StreamMessage, SynthesisRequest, VoiceSelector};

pub(super) const ENGINE_NAME: &str = "qwen3";

const MIN_REMOTE_SPEED: f64 = 0.25;
const MAX_REMOTE_SPEED: f64 = 4.0;

#[derive(Debug, Clone)]
pub struct RemoteEngineConfig {
    pub server_url: String,
    pub default_voice: String,
    /// Voices addressable by numeric selector, in index order.
    pub voices: Vec<String>,
    pub language: String,
    pub model: String,
    pub sample_rate: u32,
    pub connect_timeout: Duration,
    /// Longest allowed gap between body chunks.
    pub read_timeout: Duration,
}

impl RemoteEngineConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            default_voice: "Vivian".to_string(),
            voices: Vec::new(),
            language: "Auto".to_string(),
            model: "qwen3-tts".to_string(),
            sample_rate: 22_050,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Convert an inverse-speed `length_scale` to the service's speed units.
pub fn remote_speed(length_scale: f64) -> f64 {
    let speed = if length_scale > 0.0 { 1.0 / length_scale } else { 1.0 };
    speed.clamp(MIN_REMOTE_SPEED, MAX_REMOTE_SPEED)
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    input: &'a str,
    task_type: &'static str,
    voice: &'a str,
    model: &'a str,
    response_format: &'static str,
    speed: f64,
    stream: bool,
    language: &'a str,
}

fn request_error(e: reqwest::Error) -> TtsError {
    if e.is_connect() {
        TtsError::EngineUnreachable
    } else if e.is_timeout() {
        TtsError::EngineTimeout
    } else {
        TtsError::EngineUnavailable(format!("remote synthesis failed: {}", e.without_url()))
    }
}

/// HTTP backend. The client (and its connection pool) lives as long as the
/// engine and is shared by every request.
pub struct RemoteStreamEngine {
    client: Client,
    config: Arc<RemoteEngineConfig>,
    base_url: String,
}

impl RemoteStreamEngine {
    pub fn new(config: RemoteEngineConfig) -> Result<Self, TtsError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TtsError::EngineUnavailable(format!("http client: {e}")))?;
        let base_url = config.server_url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            config: Arc::new(config),
            base_url,
        })
    }

    fn voice_name<'a>(&'a self, voice: &'a VoiceSelector) -> &'a str {
        match voice {
            VoiceSelector::Name(name) => name,
            VoiceSelector::Index(i) => usize::try_from(*i)
                .ok()
                .and_then(|i| self.config.voices.get(i))
                .unwrap_or(&self.config.default_voice),
        }
    }
}

#[async_trait]
impl SynthesisEngine for RemoteStreamEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn supports_visemes(&self) -> bool {
        false
    }

    fn synthesize(&self, request: SynthesisRequest) -> MessageStream {
        let client = self.client.clone();
        let config = Arc::clone(&self.config);
        let url = format!("{}/v1/audio/speech", self.base_url);
        let voice = self.voice_name(&request.voice).to_string();

        Box::pin(stream! {
            let body = SpeechRequest {
                input: &request.text,
                task_type: "CustomVoice",
                voice: &voice,
                model: &config.model,
                response_format: "pcm",
                speed: remote_speed(request.length_scale()),
                stream: true,
                language: &config.language,
            };
            debug!(%voice, speed = body.speed, "requesting remote synthesis");

            let sent = tokio::time::timeout(config.read_timeout, client.post(&url).json(&body).send()).await;
            let response = match sent {
                Err(_) => {
                    warn!("remote synthesis timed out waiting for response");
                    yield StreamMessage::Error(TtsError::EngineTimeout);
                    return;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "remote synthesis request failed");
                    yield StreamMessage::Error(request_error(e));
                    return;
                }
                Ok(Ok(response)) => response,
            };

            let status = response.status();
            if !status.is_success() {
                let text = match tokio::time::timeout(config.read_timeout, response.text()).await {
                    Ok(body) => body.unwrap_or_default(),
                    Err(_) => {
                        warn!(%status, "remote error body stalled");
                        String::new()
                    }
                };
                warn!(%status, "remote synthesis rejected request");
                yield StreamMessage::Error(TtsError::engine_error(status.as_u16(), &text));
                return;
            }

            let mut chunks = Box::pin(response.bytes_stream());
            let mut total = 0usize;
            loop {
                match tokio::time::timeout(config.read_timeout, chunks.next()).await {
                    Err(_) => {
                        warn!(received = total, "remote synthesis stalled");
                        yield StreamMessage::Error(TtsError::EngineTimeout);
                        return;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        warn!(error = %e, received = total, "remote audio stream broke");
                        yield StreamMessage::Error(request_error(e));
                        return;
                    }
                    Ok(Some(Ok(chunk))) => {
                        if !chunk.is_empty() {
                            total += chunk.len();
                            yield StreamMessage::Audio(chunk);
                        }
                    }
                }
            }
            info!(bytes = total, "remote synthesis complete");
            yield StreamMessage::Complete;
        })
    }

    async fn available_voices(&self) -> Vec<String> {
        let url = format!("{}/v1/voices", self.base_url);
        let read_timeout = self.config.read_timeout;
        let response = match tokio::time::timeout(read_timeout, self.client.get(&url).send()).await {
            Ok(Ok(r)) if r.status().is_success() => r,
            Ok(Ok(r)) => {
                debug!(status = %r.status(), "voice listing unavailable");
                return Vec::new();
            }
            Ok(Err(e)) => {
                debug!(error = %e.without_url(), "voice listing failed");
                return Vec::new();
            }
            Err(_) => {
                debug!("voice listing timed out");
                return Vec::new();
            }
        };
        match tokio::time::timeout(read_timeout, response.json::<serde_json::Value>()).await {
            Ok(Ok(value)) => voice_names(&value),
            _ => Vec::new(),
        }
    }
}

/// Accepts `["a", ...]`, `[{"name": "a"}, ...]`, `[{"id": "a"}, ...]` or any
/// of those under a `voices` key.
fn voice_names(value: &serde_json::Value) -> Vec<String> {
    let list = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(obj) => match obj.get("voices") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };
    list.iter()
        .filter_map(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(o) => o
                .get("name")
                .or_else(|| o.get("id"))
                .and_then(|x| x.as_str())
                .map(str::to_string),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_speed_conversion() {
        // speed 2.0 -> length_scale 0.5 -> 2.0, no clamping
        assert_eq!(remote_speed(0.5), 2.0);
        // speed 0.5 -> length_scale 2.0 -> 0.5
        assert_eq!(remote_speed(2.0), 0.5);
        assert_eq!(remote_speed(1.0), 1.0);
        assert_eq!(remote_speed(0.1), 4.0);
        assert_eq!(remote_speed(10.0), 0.25);
        assert_eq!(remote_speed(0.0), 1.0);
        assert_eq!(remote_speed(-1.0), 1.0);
    }

    #[test]
    fn test_voice_selection() {
        let mut config = RemoteEngineConfig::new("http://localhost:8880/");
        config.voices = vec!["Vivian".into(), "Ryan".into()];
        config.default_voice = "Serena".into();
        let engine = RemoteStreamEngine::new(config).unwrap();
        assert_eq!(engine.base_url, "http://localhost:8880");
        assert_eq!(engine.voice_name(&VoiceSelector::Index(1)), "Ryan");
        assert_eq!(engine.voice_name(&VoiceSelector::Index(7)), "Serena");
        assert_eq!(engine.voice_name(&VoiceSelector::Index(-1)), "Serena");
        assert_eq!(engine.voice_name(&VoiceSelector::Name("Eric".into())), "Eric");
    }

    #[test]
    fn test_voice_names_shapes() {
        let plain = serde_json::json!(["a", "b"]);
        assert_eq!(voice_names(&plain), vec!["a", "b"]);
        let objects = serde_json::json!({"voices": [{"name": "a"}, {"id": "b"}, 3]});
        assert_eq!(voice_names(&objects), vec!["a", "b"]);
        assert!(voice_names(&serde_json::json!({"x": 1})).is_empty());
    }
}
