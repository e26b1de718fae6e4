//! Configuration for the server, read from the environment

use std::path::PathBuf;
use std::time::Duration;

use llm_core::{LlmConfig, LlmProvider};
use tts_core::{EngineSettings, LocalEngineConfig, RemoteEngineConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Piper,
    Qwen3,
}

impl EngineKind {
    /// Anything other than `qwen3` selects the local process engine.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("qwen3") {
            EngineKind::Qwen3
        } else {
            EngineKind::Piper
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,

    pub tts_engine: EngineKind,
    pub sample_rate: u32,
    pub chunk_size: usize,

    pub models_dir: PathBuf,
    pub default_voice: String,
    pub piper_executable: String,
    pub piper_timeout_secs: u64,

    pub qwen3_server_url: String,
    pub qwen3_voice: String,
    pub qwen3_voices: Vec<String>,
    pub qwen3_language: String,
    pub qwen3_model: String,
    pub qwen3_read_timeout_secs: u64,
    pub qwen3_connect_timeout_secs: u64,

    pub llm_provider: LlmProvider,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub llm_timeout_secs: u64,
    pub llm_system_prompt: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_vars(|_| None)
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn text(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn optional(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values take defaults.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let cors_allowed_origins = optional(&lookup, "CORS_ALLOWED_ORIGINS").map(|v| list(&v));
        let llm_provider = optional(&lookup, "LLM_PROVIDER")
            .and_then(|v| LlmProvider::parse(&v))
            .unwrap_or(LlmProvider::Ollama);

        Self {
            host: text(&lookup, "HOST", "0.0.0.0"),
            port: parsed(&lookup, "PORT", 8000),
            rate_limit_per_minute: parsed(&lookup, "RATE_LIMIT_PER_MINUTE", 60),
            request_timeout_secs: parsed(&lookup, "REQUEST_TIMEOUT_SECS", 60),
            cors_allowed_origins,

            tts_engine: EngineKind::parse(&text(&lookup, "TTS_ENGINE", "qwen3")),
            sample_rate: parsed(&lookup, "SAMPLE_RATE", 22_050),
            chunk_size: parsed(&lookup, "CHUNK_SIZE", 2048),

            models_dir: PathBuf::from(text(&lookup, "MODELS_DIR", "models")),
            default_voice: text(&lookup, "DEFAULT_VOICE", "en_US-libritts-high"),
            piper_executable: text(&lookup, "PIPER_EXECUTABLE", "piper"),
            piper_timeout_secs: parsed(&lookup, "PIPER_TIMEOUT_SECS", 60),

            qwen3_server_url: text(&lookup, "QWEN3_SERVER_URL", "http://127.0.0.1:8880"),
            qwen3_voice: text(&lookup, "QWEN3_VOICE", "Vivian"),
            qwen3_voices: optional(&lookup, "QWEN3_VOICES").map(|v| list(&v)).unwrap_or_default(),
            qwen3_language: text(&lookup, "QWEN3_LANGUAGE", "Auto"),
            qwen3_model: text(&lookup, "QWEN3_MODEL", "qwen3-tts"),
            qwen3_read_timeout_secs: parsed(&lookup, "QWEN3_READ_TIMEOUT_SECS", 30),
            qwen3_connect_timeout_secs: parsed(&lookup, "QWEN3_CONNECT_TIMEOUT_SECS", 10),

            llm_provider,
            llm_model: optional(&lookup, "LLM_MODEL"),
            llm_base_url: optional(&lookup, "LLM_BASE_URL"),
            openai_api_key: optional(&lookup, "OPENAI_API_KEY"),
            llm_timeout_secs: parsed(&lookup, "LLM_TIMEOUT_SECS", 120),
            llm_system_prompt: optional(&lookup, "LLM_SYSTEM_PROMPT"),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn model_path(&self) -> PathBuf {
        self.models_dir.join(format!("{}.onnx", self.default_voice))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        match self.tts_engine {
            EngineKind::Piper => {
                let mut cfg = LocalEngineConfig::new(&self.piper_executable, self.model_path());
                cfg.default_voice = self.default_voice.clone();
                cfg.sample_rate = self.sample_rate;
                cfg.chunk_size = self.chunk_size;
                cfg.timeout = Duration::from_secs(self.piper_timeout_secs);
                EngineSettings::Local(cfg)
            }
            EngineKind::Qwen3 => {
                let mut cfg = RemoteEngineConfig::new(&self.qwen3_server_url);
                cfg.default_voice = self.qwen3_voice.clone();
                cfg.voices = self.qwen3_voices.clone();
                cfg.language = self.qwen3_language.clone();
                cfg.model = self.qwen3_model.clone();
                cfg.sample_rate = self.sample_rate;
                cfg.read_timeout = Duration::from_secs(self.qwen3_read_timeout_secs);
                cfg.connect_timeout = Duration::from_secs(self.qwen3_connect_timeout_secs);
                EngineSettings::Remote(cfg)
            }
        }
    }

    pub fn llm_config(&self) -> LlmConfig {
        let mut cfg = LlmConfig::new(self.llm_provider);
        if let Some(model) = &self.llm_model {
            cfg.model = model.clone();
        }
        if let Some(url) = &self.llm_base_url {
            cfg.base_url = url.clone();
        }
        cfg.api_key = self.openai_api_key.clone();
        cfg.system_prompt = self.llm_system_prompt.clone();
        cfg.timeout = self.llm_timeout();
        cfg
    }
}
