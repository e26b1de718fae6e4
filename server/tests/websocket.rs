// WebSocket streaming against a live listener

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tts_core::TtsError;

#[derive(Debug, PartialEq)]
enum Frame {
    Audio(Vec<u8>),
    Json(Value),
}

async fn serve(app: &TestApp) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("ws://{addr}/api/ws/generate")
}

/// Send one request frame and collect everything until the server closes.
async fn exchange(url: &str, request: &str) -> Vec<Frame> {
    let (mut socket, _) = connect_async(url).await.unwrap();
    socket.send(Message::Text(request.to_string().into())).await.unwrap();

    let mut frames = Vec::new();
    let collect = async {
        while let Some(Ok(message)) = socket.next().await {
            match message {
                Message::Binary(data) => frames.push(Frame::Audio(data.to_vec())),
                Message::Text(text) => {
                    frames.push(Frame::Json(serde_json::from_str(text.as_str()).unwrap()))
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), collect)
        .await
        .expect("server never closed the socket");
    frames
}

#[tokio::test]
async fn test_audio_and_visemes_interleaved() {
    let app = echo_app();
    let url = serve(&app).await;

    let frames = exchange(&url, r#"{"text":"Hi there","voice_id":"beta","speed":1.2}"#).await;

    assert_eq!(frames.len(), 5);
    let types: Vec<&str> = frames
        .iter()
        .map(|f| match f {
            Frame::Audio(_) => "audio",
            Frame::Json(v) => v["type"].as_str().unwrap(),
        })
        .collect();
    assert_eq!(
        types,
        vec!["viseme_event", "audio", "viseme_event", "audio", "complete"]
    );
    assert_eq!(frames[1], Frame::Audio(b"[Hi there]".to_vec()));
    if let Frame::Json(event) = &frames[0] {
        assert_eq!(event["phoneme"], "m");
        assert_eq!(event["offset_ms"], 0);
        assert_eq!(event["viseme_name"], "PP");
    }
    assert_eq!(app.engine.requests(), vec!["Hi there"]);

    let stats = app.state.metrics.streams.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.viseme_events, 2);
}

#[tokio::test]
async fn test_invalid_request_frame() {
    let app = echo_app();
    let url = serve(&app).await;

    let frames = exchange(&url, "this is not json").await;
    assert_eq!(frames.len(), 1);
    let Frame::Json(error) = &frames[0] else {
        panic!("expected a text frame, got {:?}", frames[0]);
    };
    assert_eq!(error["type"], "error");
    assert!(app.engine.requests().is_empty());
    assert_eq!(app.state.metrics.websocket.stats().error_count, 1);
}

#[tokio::test]
async fn test_empty_text_rejected() {
    let app = echo_app();
    let url = serve(&app).await;

    let frames = exchange(&url, r#"{"text":""}"#).await;
    let Frame::Json(error) = &frames[0] else {
        panic!("expected a text frame");
    };
    assert_eq!(error["type"], "error");
    assert!(error["message"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn test_engine_failure_sends_single_error() {
    let app = create_test_app(Behavior::Fail(TtsError::EngineTimeout), FakeGenerator::new(&[]));
    let url = serve(&app).await;

    let frames = exchange(&url, r#"{"text":"hello"}"#).await;
    assert_eq!(
        frames,
        vec![Frame::Json(serde_json::json!({"type": "error", "message": "timeout"}))]
    );
    assert_eq!(app.state.metrics.streams.stats().failed, 1);
}

#[tokio::test]
async fn test_client_close_cancels_synthesis() {
    let app = create_test_app(Behavior::Hang, FakeGenerator::new(&[]));
    let url = serve(&app).await;

    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();
    socket
        .send(Message::Text(r#"{"text":"never ends"}"#.to_string().into()))
        .await
        .unwrap();
    let first = socket.next().await.unwrap().unwrap();
    assert!(matches!(first, Message::Binary(_)));
    socket.close(None).await.unwrap();

    let dropped = app.engine.dropped.clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("engine stream was not dropped after close");
    assert_eq!(app.state.metrics.streams.stats().cancelled, 1);
}
