//! Common utilities for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use llm_core::{LlmError, TextGenerator, TokenStream};
use server::{config::ServerConfig, metrics::AppMetrics, router, AppState};
use tts_core::{
    MessageStream, PhonemeSegment, StreamMessage, SynthesisEngine, SynthesisRequest, TtsError,
    TtsManager, VisemeEvent,
};

pub const SAMPLE_RATE: u32 = 22_050;

#[derive(Clone)]
pub enum Behavior {
    /// Viseme, audio `[text]`, viseme, audio `[text]`, complete
    Echo,
    Fail(TtsError),
    /// One audio chunk, then nothing until dropped
    Hang,
}

/// Engine double that records what it was asked to say.
pub struct FakeEngine {
    behavior: Behavior,
    seen: Mutex<Vec<String>>,
    pub dropped: Arc<AtomicBool>,
}

impl FakeEngine {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            seen: Mutex::new(Vec::new()),
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

fn viseme(start_sec: f64) -> StreamMessage {
    StreamMessage::Viseme(VisemeEvent::from(PhonemeSegment {
        phoneme: "m".into(),
        start_sec,
        end_sec: start_sec + 0.05,
    }))
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SynthesisEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn supports_visemes(&self) -> bool {
        true
    }

    fn synthesize(&self, request: SynthesisRequest) -> MessageStream {
        self.seen.lock().unwrap().push(request.text.clone());
        let audio = Bytes::from(format!("[{}]", request.text));
        match &self.behavior {
            Behavior::Echo => Box::pin(stream::iter(vec![
                viseme(0.0),
                StreamMessage::Audio(audio.clone()),
                viseme(0.0),
                StreamMessage::Audio(audio),
                StreamMessage::Complete,
            ])),
            Behavior::Fail(e) => Box::pin(stream::iter(vec![StreamMessage::Error(e.clone())])),
            Behavior::Hang => {
                let guard = DropFlag(self.dropped.clone());
                Box::pin(
                    stream::iter(vec![StreamMessage::Audio(audio)])
                        .chain(stream::pending())
                        .map(move |m| {
                            let _ = &guard;
                            m
                        }),
                )
            }
        }
    }

    async fn available_voices(&self) -> Vec<String> {
        vec!["alpha".into(), "beta".into()]
    }
}

/// Text generator double: fixed tokens, optionally failing after some.
pub struct FakeGenerator {
    tokens: Vec<String>,
    fail_after: Option<usize>,
    fail_upfront: bool,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            fail_after: None,
            fail_upfront: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.fail_upfront = true;
        self
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn stream_completion(&self, prompt: &str) -> Result<TokenStream, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail_upfront {
            return Err(LlmError::Status { status: 503 });
        }
        let mut items: Vec<Result<String, LlmError>> = Vec::new();
        for (i, token) in self.tokens.iter().enumerate() {
            if self.fail_after == Some(i) {
                items.push(Err(LlmError::Upstream("connection reset".into())));
                break;
            }
            items.push(Ok(token.clone()));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub engine: Arc<FakeEngine>,
    pub generator: Arc<FakeGenerator>,
}

/// Create a test app instance
pub fn create_test_app(behavior: Behavior, generator: FakeGenerator) -> TestApp {
    let engine = Arc::new(FakeEngine::new(behavior));
    let generator = Arc::new(generator);
    let state = AppState {
        tts: Arc::new(TtsManager::with_engine(engine.clone(), SAMPLE_RATE)),
        llm: generator.clone(),
        metrics: AppMetrics::new(),
        config: ServerConfig::default(),
    };
    TestApp {
        router: router(state.clone()),
        state,
        engine,
        generator,
    }
}

pub fn echo_app() -> TestApp {
    create_test_app(Behavior::Echo, FakeGenerator::new(&[]))
}
