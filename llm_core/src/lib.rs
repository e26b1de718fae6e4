pub mod stream;

use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::stream::{parse_ollama_line, parse_sse_line, LineDecoder, Record};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("invalid llm configuration: {0}")]
    Config(String),
    /// Stored without its URL so the message is safe to show callers.
    #[error("llm request failed: {0}")]
    Http(reqwest::Error),
    #[error("llm server returned {status}")]
    Status { status: u16 },
    #[error("llm stream stalled")]
    Timeout,
    #[error("llm reported an error: {0}")]
    Upstream(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Http(e.without_url())
    }
}

/// Wire dialect of the completion server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Ollama,
    OpenAI,
}

impl LlmProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(LlmProvider::Ollama),
            "openai" => Some(LlmProvider::OpenAI),
            _ => None,
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            LlmProvider::Ollama => "http://127.0.0.1:11434",
            LlmProvider::OpenAI => "https://api.openai.com",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            LlmProvider::Ollama => "llama3.2",
            LlmProvider::OpenAI => "gpt-4o-mini",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
    /// Longest allowed gap between streamed records.
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn new(provider: LlmProvider) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            base_url: provider.default_base_url().to_string(),
            api_key: None,
            system_prompt: None,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Incremental text, one item per streamed token.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Source of streamed completion tokens.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn stream_completion(&self, prompt: &str) -> Result<TokenStream, LlmError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Streaming client for Ollama or any OpenAI-compatible server.
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.model.trim().is_empty() {
            return Err(LlmError::Config("model must not be empty".into()));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn request(&self, prompt: &str) -> reqwest::RequestBuilder {
        let base = self.config.base_url.trim_end_matches('/');
        let system = self.config.system_prompt.as_deref();
        match self.config.provider {
            LlmProvider::Ollama => self
                .client
                .post(format!("{base}/api/generate"))
                .json(&GenerateRequest {
                    model: &self.config.model,
                    prompt,
                    stream: true,
                    system,
                }),
            LlmProvider::OpenAI => {
                let mut messages = Vec::with_capacity(2);
                if let Some(system) = system {
                    messages.push(Message { role: "system", content: system });
                }
                messages.push(Message { role: "user", content: prompt });
                let builder = self
                    .client
                    .post(format!("{base}/v1/chat/completions"))
                    .json(&ChatRequest {
                        model: &self.config.model,
                        messages,
                        stream: true,
                    });
                match &self.config.api_key {
                    Some(key) => builder.bearer_auth(key),
                    None => builder,
                }
            }
        }
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn stream_completion(&self, prompt: &str) -> Result<TokenStream, LlmError> {
        debug!(provider = ?self.config.provider, model = %self.config.model, "starting completion");
        let response = tokio::time::timeout(self.config.timeout, self.request(prompt).send())
            .await
            .map_err(|_| LlmError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            let body: String = tokio::time::timeout(self.config.timeout, response.text())
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            warn!(%status, %body, "completion request rejected");
            return Err(LlmError::Status {
                status: status.as_u16(),
            });
        }

        let parse: fn(&str) -> Record = match self.config.provider {
            LlmProvider::Ollama => parse_ollama_line,
            LlmProvider::OpenAI => parse_sse_line,
        };
        let idle = self.config.timeout;
        let mut body = Box::pin(response.bytes_stream());

        Ok(Box::pin(stream! {
            let mut decoder = LineDecoder::new();
            let mut tokens = 0usize;
            let mut finished = false;
            'read: loop {
                let chunk = match tokio::time::timeout(idle, body.next()).await {
                    Err(_) => {
                        warn!(tokens, "completion stream stalled");
                        yield Err(LlmError::Timeout);
                        return;
                    }
                    Ok(None) => break 'read,
                    Ok(Some(Err(e))) => {
                        let e = LlmError::from(e);
                        warn!(error = %e, tokens, "completion stream broke");
                        yield Err(e);
                        return;
                    }
                    Ok(Some(Ok(chunk))) => chunk,
                };
                for line in decoder.push(&chunk) {
                    match parse(&line) {
                        Record::Token(text) => {
                            tokens += 1;
                            yield Ok(text);
                        }
                        Record::Last(text) => {
                            tokens += 1;
                            yield Ok(text);
                            finished = true;
                            break 'read;
                        }
                        Record::Done => {
                            finished = true;
                            break 'read;
                        }
                        Record::Failed(message) => {
                            yield Err(LlmError::Upstream(message));
                            return;
                        }
                        Record::Skip => {}
                    }
                }
            }
            // a body without a trailing newline still owes its last record
            if !finished {
                if let Some(line) = decoder.finish() {
                    if let Record::Token(text) | Record::Last(text) = parse(&line) {
                        tokens += 1;
                        yield Ok(text);
                    }
                }
            }
            info!(tokens, "completion finished");
        }))
    }
}
