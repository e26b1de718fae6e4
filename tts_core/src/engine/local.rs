//! Subprocess backend (Piper-compatible CLI).
//!
//! Contract with the child: one JSON line on stdin, then EOF. Raw PCM on
//! stdout until EOF. Zero or more JSON lines on stderr, one of which should
//! carry a `phonemes` array of `{phoneme, start, end}` in seconds.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{MessageStream, SynthesisEngine};
use crate::error::TtsError;
use crate::message::{PhonemeSegment, StreamMessage, SynthesisRequest, VisemeEvent, VoiceSelector};
use crate::sync::{pcm_windows, StreamSynchronizer};

pub(super) const ENGINE_NAME: &str = "piper";

#[derive(Debug, Clone)]
pub struct LocalEngineConfig {
    pub executable: PathBuf,
    pub model_path: PathBuf,
    pub extra_args: Vec<String>,
    pub default_voice: String,
    pub sample_rate: u32,
    /// Size of the PCM windows handed to the synchronizer, in bytes.
    pub chunk_size: usize,
    /// Bound on the time until both output pipes reach EOF.
    pub timeout: Duration,
}

impl LocalEngineConfig {
    pub fn new(executable: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            model_path: model_path.into(),
            extra_args: Vec::new(),
            default_voice: String::new(),
            sample_rate: 22_050,
            chunk_size: 2048,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct ProcessRequest<'a> {
    text: &'a str,
    speaker_id: &'a VoiceSelector,
    length_scale: f64,
    output_file: &'static str,
}

#[derive(Deserialize)]
struct TimingRecord {
    phonemes: Vec<RawPhoneme>,
}

#[derive(Deserialize)]
struct RawPhoneme {
    #[serde(default)]
    phoneme: String,
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
}

/// Extract phoneme timing from the child's secondary output.
///
/// The first line holding a `phonemes` array wins. Anything else (log lines,
/// unrelated JSON, garbage) is skipped, and no match means no phonemes.
pub fn parse_phoneme_records(output: &str) -> Vec<PhonemeSegment> {
    for line in output.lines().map(str::trim) {
        if !line.starts_with('{') {
            continue;
        }
        match serde_json::from_str::<TimingRecord>(line) {
            Ok(record) => {
                return record
                    .phonemes
                    .into_iter()
                    .map(|p| PhonemeSegment {
                        phoneme: p.phoneme,
                        start_sec: p.start,
                        end_sec: p.end,
                    })
                    .collect();
            }
            Err(e) => debug!(error = %e, "skipping non-timing line"),
        }
    }
    Vec::new()
}

struct ProcessOutput {
    audio: Bytes,
    phonemes: Vec<PhonemeSegment>,
}

/// Spawns one child process per request. Supports visemes.
pub struct LocalProcessEngine {
    config: Arc<LocalEngineConfig>,
}

impl LocalProcessEngine {
    pub fn new(config: LocalEngineConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl SynthesisEngine for LocalProcessEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn supports_visemes(&self) -> bool {
        true
    }

    fn synthesize(&self, request: SynthesisRequest) -> MessageStream {
        let config = Arc::clone(&self.config);
        Box::pin(stream! {
            match run_process(&config, &request).await {
                Ok(output) => {
                    let mut events: Vec<VisemeEvent> =
                        output.phonemes.into_iter().map(VisemeEvent::from).collect();
                    // stable, so equal offsets keep backend order
                    events.sort_by_key(|e| e.offset_ms);
                    debug!(
                        audio_bytes = output.audio.len(),
                        visemes = events.len(),
                        "synthesis process finished"
                    );
                    let windows = pcm_windows(output.audio, config.chunk_size);
                    for message in StreamSynchronizer::new(windows, events, config.sample_rate) {
                        yield message;
                    }
                    yield StreamMessage::Complete;
                }
                Err(e) => {
                    warn!(error = %e, "local synthesis failed");
                    yield StreamMessage::Error(e);
                }
            }
        })
    }

    async fn available_voices(&self) -> Vec<String> {
        if self.config.default_voice.is_empty() {
            Vec::new()
        } else {
            vec![self.config.default_voice.clone()]
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut pipe: R) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf).await?;
    Ok(buf)
}

fn unavailable(context: &str, e: impl std::fmt::Display) -> TtsError {
    TtsError::EngineUnavailable(format!("{context}: {e}"))
}

async fn run_process(
    config: &LocalEngineConfig,
    request: &SynthesisRequest,
) -> Result<ProcessOutput, TtsError> {
    if !config.model_path.exists() {
        warn!(model = %config.model_path.display(), "voice model not found");
        return Err(TtsError::EngineUnavailable("voice model not found".to_string()));
    }

    let line = serde_json::to_string(&ProcessRequest {
        text: &request.text,
        speaker_id: &request.voice,
        length_scale: request.length_scale(),
        output_file: "-",
    })
    .map_err(|e| TtsError::ProtocolError(e.to_string()))?;

    let mut child = Command::new(&config.executable)
        .arg("--model")
        .arg(&config.model_path)
        .arg("--output-raw")
        .arg("--json-input")
        .args(&config.extra_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            warn!(executable = %config.executable.display(), error = %e, "cannot start synthesis process");
            if e.kind() == std::io::ErrorKind::NotFound {
                TtsError::EngineUnavailable("synthesis executable not found".to_string())
            } else {
                unavailable("failed to start synthesis process", e)
            }
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TtsError::EngineUnavailable("stdout not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| TtsError::EngineUnavailable("stderr not captured".to_string()))?;

    // Both pipes drain in their own tasks before anything is written: a child
    // that fills one pipe while we wait on the other would block forever.
    let audio_task = tokio::spawn(read_all(stdout));
    let timing_task = tokio::spawn(read_all(stderr));
    let audio_abort = audio_task.abort_handle();
    let timing_abort = timing_task.abort_handle();

    if let Some(mut stdin) = child.stdin.take() {
        let written = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.shutdown().await
        }
        .await;
        if let Err(e) = written {
            // the child may have exited already; its exit is judged below
            warn!(error = %e, "failed to write synthesis request");
        }
    }

    let drained = tokio::time::timeout(config.timeout, async {
        tokio::join!(audio_task, timing_task)
    })
    .await;

    let (audio, timing) = match drained {
        Ok((audio, timing)) => (audio, timing),
        Err(_) => {
            audio_abort.abort();
            timing_abort.abort();
            // kill() also reaps
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill timed out synthesis process");
            }
            warn!(timeout_secs = config.timeout.as_secs(), "synthesis process timed out");
            return Err(TtsError::EngineTimeout);
        }
    };

    let status = child
        .wait()
        .await
        .map_err(|e| unavailable("failed to reap synthesis process", e))?;

    let audio = audio
        .map_err(|e| unavailable("stdout reader failed", e))?
        .map_err(|e| unavailable("failed to read audio", e))?;
    let timing = timing
        .map_err(|e| unavailable("stderr reader failed", e))?
        .map_err(|e| unavailable("failed to read phoneme timing", e))?;
    let timing = String::from_utf8_lossy(&timing);

    if audio.is_empty() {
        debug!(stderr = %timing, "synthesis process produced no audio");
        return Err(TtsError::EngineUnavailable(format!(
            "synthesis process exited ({status}) without audio"
        )));
    }
    if !status.success() {
        warn!(%status, "synthesis process exited with failure after producing audio");
    }
    info!(bytes = audio.len(), "local synthesis complete");

    Ok(ProcessOutput {
        audio: Bytes::from(audio),
        phonemes: parse_phoneme_records(&timing),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_noise_and_takes_first_record() {
        let output = "\
[piper] loading model
{not json
{\"event\": \"ready\"}
{\"phonemes\": [{\"phoneme\": \"h\", \"start\": 0.0, \"end\": 0.05}, {\"phoneme\": \"ə\", \"start\": 0.05, \"end\": 0.12}]}
{\"phonemes\": [{\"phoneme\": \"x\", \"start\": 9.0, \"end\": 9.5}]}
";
        let segments = parse_phoneme_records(output);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].phoneme, "h");
        assert_eq!(segments[1].start_sec, 0.05);
        assert_eq!(segments[1].end_sec, 0.12);
    }

    #[test]
    fn test_parse_without_timing_is_empty() {
        assert!(parse_phoneme_records("").is_empty());
        assert!(parse_phoneme_records("warning: something\n{\"a\":1}\n").is_empty());
    }

    #[test]
    fn test_parse_fills_missing_fields() {
        let segments = parse_phoneme_records("{\"phonemes\": [{\"phoneme\": \"m\"}]}");
        assert_eq!(segments[0].start_sec, 0.0);
        assert_eq!(segments[0].end_sec, 0.0);
    }

    #[test]
    fn test_process_request_line() {
        let line = serde_json::to_string(&ProcessRequest {
            text: "hi",
            speaker_id: &VoiceSelector::Index(2),
            length_scale: 0.5,
            output_file: "-",
        })
        .unwrap();
        assert_eq!(
            line,
            r#"{"text":"hi","speaker_id":2,"length_scale":0.5,"output_file":"-"}"#
        );
    }
}
