use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::engine::{error_stream, MessageStream, SynthesisEngine};
use crate::error::TtsError;
use crate::message::{PhonemeSegment, StreamMessage, SynthesisRequest, VisemeEvent};

/// Engine whose audio is the bracketed request text, so tests can read
/// back what was synthesized and in which order.
pub(crate) struct ScriptedEngine {
    fail_on: Option<String>,
    visemes: bool,
    seen: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub(crate) fn echo() -> Self {
        Self {
            fail_on: None,
            visemes: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }

    pub(crate) fn with_visemes(mut self) -> Self {
        self.visemes = true;
        self
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl SynthesisEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports_visemes(&self) -> bool {
        self.visemes
    }

    fn synthesize(&self, request: SynthesisRequest) -> MessageStream {
        self.seen.lock().unwrap().push(request.text.clone());
        if self.fail_on.as_deref() == Some(request.text.as_str()) {
            return error_stream(TtsError::EngineUnavailable("scripted failure".into()));
        }
        let mut messages = Vec::new();
        if self.visemes {
            messages.push(StreamMessage::Viseme(VisemeEvent::from(PhonemeSegment {
                phoneme: "a".into(),
                start_sec: 0.0,
                end_sec: 0.1,
            })));
        }
        messages.push(StreamMessage::Audio(Bytes::from(format!("[{}]", request.text))));
        messages.push(StreamMessage::Complete);
        Box::pin(futures_util::stream::iter(messages))
    }

    async fn available_voices(&self) -> Vec<String> {
        vec!["scripted".into()]
    }
}
