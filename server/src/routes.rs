use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use serde::Serialize;
use tracing::{info, warn};
use tts_core::{apply_custom_phonetics, encode_pcm16_wav, ChatPipeline, StreamMessage};

use crate::error::ApiError;
use crate::metrics::{EndpointMetricsResponse, MetricsResponse, SystemMetrics};
use crate::validation::SpeechRequest;
use crate::AppState;

pub static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub engine: &'static str,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        engine: state.tts.engine_name(),
    })
}

#[derive(Serialize)]
pub struct VoicesResponse {
    pub engine: &'static str,
    pub voices: Vec<String>,
}

pub async fn list_voices(State(state): State<AppState>) -> Json<VoicesResponse> {
    let voices = state.tts.available_voices().await;
    Json(VoicesResponse {
        engine: state.tts.engine_name(),
        voices,
    })
}

/// Whole utterance as a WAV attachment.
pub async fn synthesize_wav(
    State(state): State<AppState>,
    Json(body): Json<SpeechRequest>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let result = render_wav(&state, body).await;
    match &result {
        Ok(_) => state
            .metrics
            .synthesis
            .record_request(started.elapsed().as_millis() as u64),
        Err(_) => state.metrics.synthesis.record_error(),
    }
    result
}

async fn render_wav(state: &AppState, body: SpeechRequest) -> Result<Response, ApiError> {
    let mut request = body.into_synthesis_request()?;
    request.text = apply_custom_phonetics(&request.text);

    state.metrics.streams.started();
    let mut messages = state.tts.synthesize(request).await;
    let mut pcm = Vec::new();
    while let Some(message) = messages.next().await {
        state.metrics.streams.observe(&message);
        match message {
            StreamMessage::Audio(chunk) => pcm.extend_from_slice(&chunk),
            StreamMessage::Viseme(_) => {}
            StreamMessage::Complete => break,
            StreamMessage::Error(e) => return Err(e.into()),
        }
    }

    let wav = encode_pcm16_wav(&pcm, state.tts.sample_rate())?;
    info!(pcm_bytes = pcm.len(), wav_bytes = wav.len(), "wav synthesis complete");
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("audio/wav")),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=\"speech.wav\""),
            ),
        ],
        wav,
    )
        .into_response())
}

/// Prompt in, spoken reply out as a raw PCM body.
///
/// Failures before the first byte become JSON errors; afterwards a failure
/// aborts the body.
pub async fn chat_audio(
    State(state): State<AppState>,
    Json(body): Json<SpeechRequest>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let request = match body.into_synthesis_request() {
        Ok(request) => request,
        Err(e) => {
            state.metrics.chat.record_error();
            return Err(e);
        }
    };

    let prepared = async {
        let engine = state.tts.engine().await?;
        let tokens = state.llm.stream_completion(&request.text).await?;
        Ok::<_, ApiError>((engine, tokens))
    }
    .await;
    let (engine, tokens) = match prepared {
        Ok(parts) => parts,
        Err(e) => {
            state.metrics.chat.record_error();
            return Err(e);
        }
    };
    state
        .metrics
        .chat
        .record_request(started.elapsed().as_millis() as u64);
    state.metrics.streams.started();

    let metrics = state.metrics.clone();
    let audio = ChatPipeline::new(engine, request.voice, request.speed)
        .run(tokens)
        .filter_map(move |message| {
            metrics.streams.observe(&message);
            let chunk = match message {
                StreamMessage::Audio(chunk) => Some(Ok(chunk)),
                StreamMessage::Error(e) => {
                    warn!(error = %e, "chat audio stream aborted");
                    Some(Err(e))
                }
                StreamMessage::Viseme(_) | StreamMessage::Complete => None,
            };
            async move { chunk }
        });

    let sample_rate = HeaderValue::from(state.tts.sample_rate());
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (header::HeaderName::from_static("x-sample-rate"), sample_rate),
        ],
        Body::from_stream(audio),
    )
        .into_response())
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let uptime_seconds = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    let system_load = {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/proc/loadavg")
                .ok()
                .and_then(|s| s.split_whitespace().next().and_then(|v| v.parse::<f64>().ok()))
        }
        #[cfg(not(unix))]
        None
    };

    Json(MetricsResponse {
        timestamp: chrono::Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: system.global_cpu_info().cpu_usage(),
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: state.metrics.total_requests(),
            uptime_seconds,
            system_load,
        },
        endpoints: EndpointMetricsResponse {
            synthesis: state.metrics.synthesis.stats(),
            chat: state.metrics.chat.stats(),
            websocket: state.metrics.websocket.stats(),
        },
        streams: state.metrics.streams.stats(),
    })
}
