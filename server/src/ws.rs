//! WebSocket streaming of synthesized audio and viseme events

use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{stream::SplitStream, SinkExt, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use tts_core::{StreamMessage, SynthesisRequest, VisemeEvent};

use crate::error::ApiError;
use crate::validation::parse_ws_request;
use crate::AppState;

/// Text frames sent to the client. Audio goes out as binary frames.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame<'a> {
    VisemeEvent(&'a VisemeEvent),
    Complete,
    Error { message: String },
}

impl ServerFrame<'_> {
    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                warn!(error = %e, "failed to encode frame");
                None
            }
        }
    }
}

pub async fn ws_generate(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

enum FirstFrame {
    Request(SynthesisRequest),
    Rejected(ApiError),
    Gone,
}

async fn read_request(receiver: &mut SplitStream<WebSocket>) -> FirstFrame {
    while let Some(incoming) = receiver.next().await {
        match incoming {
            Ok(Message::Text(text)) => {
                return match parse_ws_request(text.as_str()) {
                    Ok(request) => FirstFrame::Request(request),
                    Err(e) => FirstFrame::Rejected(e),
                };
            }
            Ok(Message::Binary(_)) => {
                return FirstFrame::Rejected(ApiError::Protocol(
                    "expected a JSON text frame".to_string(),
                ));
            }
            Ok(Message::Close(_)) | Err(_) => return FirstFrame::Gone,
            Ok(_) => continue,
        }
    }
    FirstFrame::Gone
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let started = Instant::now();
    let metrics = state.metrics.clone();
    let (mut sender, mut receiver) = socket.split();

    let request = match read_request(&mut receiver).await {
        FirstFrame::Request(request) => request,
        FirstFrame::Rejected(e) => {
            debug!(error = %e, "rejecting websocket request");
            metrics.websocket.record_error();
            let frame = ServerFrame::Error {
                message: e.to_string(),
            };
            if let Some(message) = frame.to_message() {
                let _ = sender.send(message).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
        FirstFrame::Gone => return,
    };

    info!(
        chars = request.text.chars().count(),
        voice = %request.voice,
        speed = request.speed,
        "websocket synthesis started"
    );
    metrics.streams.started();
    let mut messages = state.tts.synthesize(request).await;

    loop {
        tokio::select! {
            next = messages.next() => {
                let Some(message) = next else {
                    break;
                };
                metrics.streams.observe(&message);
                let terminal = message.is_terminal();
                let outgoing = match &message {
                    StreamMessage::Audio(chunk) => Some(Message::Binary(chunk.clone())),
                    StreamMessage::Viseme(event) => ServerFrame::VisemeEvent(event).to_message(),
                    StreamMessage::Complete => ServerFrame::Complete.to_message(),
                    StreamMessage::Error(e) => {
                        metrics.websocket.record_error();
                        ServerFrame::Error { message: e.to_string() }.to_message()
                    }
                };
                if let Some(outgoing) = outgoing {
                    if sender.send(outgoing).await.is_err() {
                        info!("websocket client went away mid-stream");
                        metrics.streams.cancelled();
                        return;
                    }
                }
                if terminal {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        // dropping `messages` stops the engine
                        info!("websocket closed by client, cancelling synthesis");
                        metrics.streams.cancelled();
                        return;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    metrics
        .websocket
        .record_request(started.elapsed().as_millis() as u64);
    let _ = sender.send(Message::Close(None)).await;
}
