//! Token stream in, continuous audio out.

use std::fmt::Display;
use std::sync::Arc;

use async_stream::stream;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::{pin_mut, StreamExt};
use tracing::{debug, error, info, warn};

use crate::engine::{MessageStream, SynthesisEngine};
use crate::error::TtsError;
use crate::message::{StreamMessage, SynthesisRequest, VoiceSelector};
use crate::segmenter::SentenceSegmenter;

/// Drives an upstream token stream through the segmenter and the engine.
///
/// Output is `Audio*` followed by `Complete`, or by a single `Error` when the
/// upstream breaks. Per-sentence synthesis failures are logged and leave a
/// gap; sentences are synthesized strictly in arrival order.
pub struct ChatPipeline {
    engine: Arc<dyn SynthesisEngine>,
    voice: VoiceSelector,
    speed: f64,
}

impl ChatPipeline {
    pub fn new(engine: Arc<dyn SynthesisEngine>, voice: VoiceSelector, speed: f64) -> Self {
        Self {
            engine,
            voice,
            speed,
        }
    }

    pub fn run<S, E>(self, tokens: S) -> MessageStream
    where
        S: Stream<Item = Result<String, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        Box::pin(stream! {
            pin_mut!(tokens);
            let mut segmenter = SentenceSegmenter::new();
            let mut dispatched = 0usize;

            while let Some(item) = tokens.next().await {
                let token = match item {
                    Ok(token) => token,
                    Err(e) => {
                        error!(error = %e, sentences = dispatched, "upstream token stream failed");
                        yield StreamMessage::Error(TtsError::UpstreamError(e.to_string()));
                        return;
                    }
                };
                for sentence in segmenter.push_token(&token) {
                    dispatched += 1;
                    let audio = sentence_audio(&self.engine, &self.voice, self.speed, sentence, dispatched);
                    pin_mut!(audio);
                    while let Some(chunk) = audio.next().await {
                        yield StreamMessage::Audio(chunk);
                    }
                }
            }

            for sentence in segmenter.finish() {
                dispatched += 1;
                let audio = sentence_audio(&self.engine, &self.voice, self.speed, sentence, dispatched);
                pin_mut!(audio);
                while let Some(chunk) = audio.next().await {
                    yield StreamMessage::Audio(chunk);
                }
            }

            info!(sentences = dispatched, "chat pipeline finished");
            yield StreamMessage::Complete;
        })
    }
}

/// Audio of one sentence; everything else in its sub-stream stays internal.
fn sentence_audio(
    engine: &Arc<dyn SynthesisEngine>,
    voice: &VoiceSelector,
    speed: f64,
    sentence: String,
    index: usize,
) -> impl Stream<Item = Bytes> + Send + 'static {
    let engine = Arc::clone(engine);
    let request = SynthesisRequest::new(sentence, voice.clone(), speed);
    stream! {
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                warn!(sentence = index, error = %e, "skipping sentence");
                return;
            }
        };
        debug!(sentence = index, text = %request.text, "dispatching sentence");
        let mut messages = engine.synthesize(request);
        while let Some(message) = messages.next().await {
            match message {
                StreamMessage::Audio(chunk) => yield chunk,
                StreamMessage::Viseme(_) => {}
                StreamMessage::Complete => break,
                StreamMessage::Error(e) => {
                    warn!(sentence = index, error = %e, "sentence synthesis failed, continuing");
                    break;
                }
            }
        }
    }
}
