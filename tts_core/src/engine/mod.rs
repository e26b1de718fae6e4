//! Synthesis backends behind one streaming contract.

mod local;
mod remote;

pub use local::{parse_phoneme_records, LocalEngineConfig, LocalProcessEngine};
pub use remote::{remote_speed, RemoteEngineConfig, RemoteStreamEngine};

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::TtsError;
use crate::message::{StreamMessage, SynthesisRequest};

/// Lazy, finite, single-use message sequence for one request.
pub type MessageStream = Pin<Box<dyn Stream<Item = StreamMessage> + Send>>;

/// A speech backend.
///
/// `synthesize` does no work until the returned stream is polled, and all
/// work stops when the stream is dropped. Backends without phoneme timing
/// report `supports_visemes() == false` and simply never emit `Viseme`.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports_visemes(&self) -> bool;

    fn synthesize(&self, request: SynthesisRequest) -> MessageStream;

    /// Voices the backend can be asked for. Best effort, never fails.
    async fn available_voices(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Stream holding a single terminal error.
pub fn error_stream(error: TtsError) -> MessageStream {
    Box::pin(futures_util::stream::once(async move {
        StreamMessage::Error(error)
    }))
}

/// Which backend to build, with its configuration.
#[derive(Debug, Clone)]
pub enum EngineSettings {
    Local(LocalEngineConfig),
    Remote(RemoteEngineConfig),
}

impl EngineSettings {
    pub fn name(&self) -> &'static str {
        match self {
            EngineSettings::Local(_) => local::ENGINE_NAME,
            EngineSettings::Remote(_) => remote::ENGINE_NAME,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        match self {
            EngineSettings::Local(cfg) => cfg.sample_rate,
            EngineSettings::Remote(cfg) => cfg.sample_rate,
        }
    }

    pub fn build(&self) -> Result<Arc<dyn SynthesisEngine>, TtsError> {
        Ok(match self {
            EngineSettings::Local(cfg) => Arc::new(LocalProcessEngine::new(cfg.clone())),
            EngineSettings::Remote(cfg) => Arc::new(RemoteStreamEngine::new(cfg.clone())?),
        })
    }
}
