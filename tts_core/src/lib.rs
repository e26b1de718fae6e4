pub mod engine;
pub mod error;
pub mod lexicon;
pub mod message;
pub mod pipeline;
pub mod segmenter;
pub mod sync;
pub mod viseme;
mod wav;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

pub use engine::{
    error_stream, EngineSettings, LocalEngineConfig, LocalProcessEngine, MessageStream,
    RemoteEngineConfig, RemoteStreamEngine, SynthesisEngine,
};
pub use error::TtsError;
pub use lexicon::apply_custom_phonetics;
pub use message::{PhonemeSegment, StreamMessage, SynthesisRequest, VisemeEvent, VoiceSelector};
pub use pipeline::ChatPipeline;
pub use segmenter::SentenceSegmenter;
pub use sync::StreamSynchronizer;
pub use wav::encode_pcm16_wav;

/// Process-wide owner of the active synthesis engine.
///
/// The engine is built on first use and shared by every request after that.
/// A failed build is not cached, so the next request retries it.
pub struct TtsManager {
    settings: Option<EngineSettings>,
    engine: OnceCell<Arc<dyn SynthesisEngine>>,
    sample_rate: u32,
}

impl TtsManager {
    pub fn new(settings: EngineSettings) -> Self {
        let sample_rate = settings.sample_rate();
        Self {
            settings: Some(settings),
            engine: OnceCell::new(),
            sample_rate,
        }
    }

    /// Manager around an engine that is already built.
    pub fn with_engine(engine: Arc<dyn SynthesisEngine>, sample_rate: u32) -> Self {
        Self {
            settings: None,
            engine: OnceCell::new_with(Some(engine)),
            sample_rate,
        }
    }

    pub async fn engine(&self) -> Result<Arc<dyn SynthesisEngine>, TtsError> {
        self.engine
            .get_or_try_init(|| async {
                let settings = self
                    .settings
                    .as_ref()
                    .ok_or_else(|| TtsError::EngineUnavailable("no engine configured".into()))?;
                let engine = settings.build()?;
                info!(
                    engine = engine.name(),
                    visemes = engine.supports_visemes(),
                    sample_rate = self.sample_rate,
                    "synthesis engine initialized"
                );
                Ok::<_, TtsError>(engine)
            })
            .await
            .map(Arc::clone)
    }

    /// Message stream for one request; engine build failures come back as a
    /// single `Error` message.
    pub async fn synthesize(&self, request: SynthesisRequest) -> MessageStream {
        match self.engine().await {
            Ok(engine) => engine.synthesize(request),
            Err(e) => error_stream(e),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn engine_name(&self) -> &'static str {
        match (&self.settings, self.engine.get()) {
            (_, Some(engine)) => engine.name(),
            (Some(settings), None) => settings.name(),
            (None, None) => "none",
        }
    }

    pub async fn available_voices(&self) -> Vec<String> {
        match self.engine().await {
            Ok(engine) => engine.available_voices().await,
            Err(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedEngine;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_prebuilt_engine_is_used() {
        let manager = TtsManager::with_engine(Arc::new(ScriptedEngine::echo()), 24_000);
        assert_eq!(manager.engine_name(), "scripted");
        assert_eq!(manager.sample_rate(), 24_000);

        let request = SynthesisRequest::new("hi", VoiceSelector::default(), 1.0).unwrap();
        let out: Vec<_> = manager.synthesize(request).await.collect().await;
        assert_eq!(out.last(), Some(&StreamMessage::Complete));
        assert_eq!(manager.available_voices().await, vec!["scripted"]);
    }

    #[tokio::test]
    async fn test_engine_built_once_and_shared() {
        let settings = EngineSettings::Remote(RemoteEngineConfig::new("http://127.0.0.1:1"));
        let manager = TtsManager::new(settings);
        assert_eq!(manager.engine_name(), "qwen3");
        let a = manager.engine().await.unwrap();
        let b = manager.engine().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!a.supports_visemes());
    }

    #[tokio::test]
    async fn test_local_engine_reports_visemes() {
        let settings =
            EngineSettings::Local(LocalEngineConfig::new("piper", "/nonexistent/model.onnx"));
        let manager = TtsManager::new(settings);
        assert_eq!(manager.sample_rate(), 22_050);
        let engine = manager.engine().await.unwrap();
        assert_eq!(engine.name(), "piper");
        assert!(engine.supports_visemes());

        // a missing model is reported on the stream, not at build time
        let request = SynthesisRequest::new("hi", VoiceSelector::default(), 1.0).unwrap();
        let out: Vec<_> = manager.synthesize(request).await.collect().await;
        assert!(matches!(out.as_slice(), [StreamMessage::Error(TtsError::EngineUnavailable(_))]));
    }
}
