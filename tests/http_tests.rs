// HTTP control API tests, driven through the router without a socket

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use hound::{SampleFormat, WavSpec, WavWriter};
use novavoice::session::Role;
use novavoice::transport::{MemoryTransport, RemoteEnd, TransportEvent};
use novavoice::{
    create_router, AppState, AudioBackendConfig, ClockedOutput, Collaborators, NoDelivery,
    SessionConfig, SessionStatus, VoiceEngine, WavFileBackend,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    handle: novavoice::SessionHandle,
    remotes: mpsc::UnboundedReceiver<RemoteEnd>,
    transport_failure: Arc<Mutex<Option<String>>>,
    _dir: tempfile::TempDir,
}

fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("visitor.wav");
    let spec = WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec).unwrap();
    for _ in 0..1600 {
        writer.write_sample(0i16).unwrap();
    }
    writer.finalize().unwrap();

    let (transport, remotes) = MemoryTransport::new(64);
    let transport_failure = transport.failure_switch();
    let collaborators = Collaborators {
        capture: Box::new(WavFileBackend::new(&path, AudioBackendConfig::default())),
        output: Box::new(ClockedOutput::new()),
        transport: Box::new(transport),
        delivery: Arc::new(NoDelivery),
    };
    let (handle, _engine) = VoiceEngine::spawn(SessionConfig::default(), collaborators);

    TestApp {
        router: create_router(AppState::new(handle.clone())),
        handle,
        remotes,
        transport_failure,
        _dir: dir,
    }
}

async fn call(router: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_check() {
    let app = test_app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_session_starts_disconnected() {
    let app = test_app();

    let (status, body) = call(&app.router, "GET", "/session").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "disconnected");
    assert_eq!(body["time_remaining"], 300);
    assert!(body["session_id"].is_null());
}

#[tokio::test]
async fn test_start_and_stop_session() {
    let mut app = test_app();

    let (status, body) = call(&app.router, "POST", "/session/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "connecting");
    let session_id = body["session_id"].as_str().unwrap().to_string();
    assert!(session_id.starts_with("nova_demo_"));

    let (status, _) = call(&app.router, "POST", "/session/start").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let remote = app.remotes.recv().await.unwrap();
    remote.send(TransportEvent::Opened).await.unwrap();
    app.handle
        .wait_for_status(SessionStatus::Connected)
        .await
        .unwrap();

    let (_, body) = call(&app.router, "GET", "/session").await;
    assert_eq!(body["status"], "connected");
    assert_eq!(body["session_id"], session_id.as_str());

    let (status, body) = call(&app.router, "POST", "/session/stop").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "disconnected");
}

#[tokio::test]
async fn test_transcript_endpoint() {
    let mut app = test_app();

    call(&app.router, "POST", "/session/start").await;
    let remote = app.remotes.recv().await.unwrap();
    remote.send(TransportEvent::Opened).await.unwrap();
    for (role, text) in [(Role::User, "Hi"), (Role::Agent, "Hello!")] {
        remote
            .send(TransportEvent::TranscriptionDelta {
                role,
                text: text.to_string(),
            })
            .await
            .unwrap();
    }
    remote.send(TransportEvent::TurnComplete).await.unwrap();
    remote
        .send(TransportEvent::TranscriptionDelta {
            role: Role::User,
            text: "I have a".to_string(),
        })
        .await
        .unwrap();

    let mut updates = app.handle.subscribe();
    updates.wait_for(|s| s.live_user == "I have a").await.unwrap();

    let (status, body) = call(&app.router, "GET", "/session/transcript").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transcript"][0]["role"], "user");
    assert_eq!(body["transcript"][0]["text"], "Hi");
    assert_eq!(body["transcript"][1]["role"], "agent");
    assert_eq!(body["transcript"][1]["text"], "Hello!");
    assert_eq!(body["live_user"], "I have a");
}

#[tokio::test]
async fn test_start_failure_maps_to_bad_gateway() {
    let app = test_app();
    *app.transport_failure.lock().await = Some("agent unreachable".to_string());

    let (status, body) = call(&app.router, "POST", "/session/start").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("agent unreachable"));

    let (_, body) = call(&app.router, "GET", "/session").await;
    assert_eq!(body["status"], "disconnected");
    assert!(body["last_error"]
        .as_str()
        .unwrap()
        .contains("agent unreachable"));
}
