//! Metrics collection and tracking

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tts_core::StreamMessage;

const LATENCY_WINDOW: usize = 1000;

/// Per-endpoint request counters and recent latencies
#[derive(Debug, Clone, Default)]
pub struct EndpointMetrics {
    request_count: Arc<AtomicU64>,
    error_count: Arc<AtomicU64>,
    total_latency_ms: Arc<AtomicU64>,
    max_latency_ms: Arc<AtomicU64>,
    // last LATENCY_WINDOW samples, oldest first
    latency_samples: Arc<Mutex<VecDeque<u64>>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, latency_ms: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.latency_samples.lock() {
            if samples.len() == LATENCY_WINDOW {
                samples.pop_front();
            }
            samples.push_back(latency_ms);
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    fn percentile(&self, p: usize) -> u64 {
        let Ok(samples) = self.latency_samples.lock() else {
            return 0;
        };
        if samples.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        sorted.sort_unstable();
        let index = (sorted.len() * p / 100).min(sorted.len() - 1);
        sorted[index]
    }

    pub fn stats(&self) -> EndpointStats {
        let request_count = self.request_count.load(Ordering::Relaxed);
        let total = self.total_latency_ms.load(Ordering::Relaxed);
        EndpointStats {
            request_count,
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_latency_ms: if request_count == 0 {
                0.0
            } else {
                total as f64 / request_count as f64
            },
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: self.percentile(50),
            p95_latency_ms: self.percentile(95),
            p99_latency_ms: self.percentile(99),
        }
    }
}

/// Counters over engine message streams, whichever endpoint drove them
#[derive(Debug, Clone, Default)]
pub struct StreamMetrics {
    started: Arc<AtomicU64>,
    completed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    cancelled: Arc<AtomicU64>,
    audio_bytes: Arc<AtomicU64>,
    viseme_events: Arc<AtomicU64>,
}

impl StreamMetrics {
    pub fn started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe(&self, message: &StreamMessage) {
        match message {
            StreamMessage::Audio(chunk) => {
                self.audio_bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            }
            StreamMessage::Viseme(_) => {
                self.viseme_events.fetch_add(1, Ordering::Relaxed);
            }
            StreamMessage::Complete => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            StreamMessage::Error(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            audio_bytes: self.audio_bytes.load(Ordering::Relaxed),
            viseme_events: self.viseme_events.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppMetrics {
    pub synthesis: EndpointMetrics,
    pub chat: EndpointMetrics,
    pub websocket: EndpointMetrics,
    pub streams: StreamMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_requests(&self) -> u64 {
        [&self.synthesis, &self.chat, &self.websocket]
            .iter()
            .map(|m| m.request_count.load(Ordering::Relaxed))
            .sum()
    }
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub endpoints: EndpointMetricsResponse,
    pub streams: StreamStats,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
}

#[derive(Serialize)]
pub struct EndpointMetricsResponse {
    pub synthesis: EndpointStats,
    pub chat: EndpointStats,
    pub websocket: EndpointStats,
}

#[derive(Debug, Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StreamStats {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub audio_bytes: u64,
    pub viseme_events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tts_core::TtsError;

    #[test]
    fn test_percentiles() {
        let m = EndpointMetrics::new();
        for ms in 1..=100 {
            m.record_request(ms);
        }
        m.record_error();
        let stats = m.stats();
        assert_eq!(stats.request_count, 100);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.max_latency_ms, 100);
        assert_eq!(stats.p50_latency_ms, 51);
        assert_eq!(stats.p99_latency_ms, 100);
        assert!((stats.avg_latency_ms - 50.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_sample_window_is_bounded() {
        let m = EndpointMetrics::new();
        for _ in 0..LATENCY_WINDOW {
            m.record_request(1000);
        }
        for _ in 0..LATENCY_WINDOW {
            m.record_request(1);
        }
        assert_eq!(m.latency_samples.lock().unwrap().len(), LATENCY_WINDOW);
        assert_eq!(m.stats().p99_latency_ms, 1);
        assert_eq!(m.stats().max_latency_ms, 1000);
    }

    #[test]
    fn test_stream_counters() {
        let m = StreamMetrics::default();
        m.started();
        m.observe(&StreamMessage::Audio(Bytes::from_static(&[0; 64])));
        m.observe(&StreamMessage::Complete);
        m.started();
        m.observe(&StreamMessage::Error(TtsError::EngineTimeout));
        m.cancelled();
        assert_eq!(
            m.stats(),
            StreamStats {
                started: 2,
                completed: 1,
                failed: 1,
                cancelled: 1,
                audio_bytes: 64,
                viseme_events: 0,
            }
        );
    }
}
