pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod validation;
pub mod ws;

use std::sync::Arc;

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use llm_core::TextGenerator;
use tts_core::TtsManager;

use crate::config::ServerConfig;
use crate::metrics::AppMetrics;

#[derive(Clone)]
pub struct AppState {
    pub tts: Arc<TtsManager>,
    pub llm: Arc<dyn TextGenerator>,
    pub metrics: AppMetrics,
    pub config: ServerConfig,
}

// Request ID middleware for tracing
async fn add_request_id(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let value = HeaderValue::from_str(&request_id).ok();
    if let Some(value) = &value {
        request.headers_mut().insert("x-request-id", value.clone());
    }
    let mut response = next.run(request).await;
    if let Some(value) = value {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// All routes, served both at the root and under `/api`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health_check))
        .route("/voices", get(routes::list_voices))
        .route("/ws/generate", get(ws::ws_generate))
        .route("/v1/synthesis", post(routes::synthesize_wav))
        .route("/v1/chat", post(routes::chat_audio))
        .route("/metrics", get(routes::metrics_endpoint));

    Router::new()
        .merge(api.clone())
        .nest("/api", api)
        .layer(axum::middleware::from_fn(add_request_id))
        .with_state(state)
}
