use super::state::AppState;
use crate::error::EngineError;
use crate::session::{SessionSnapshot, Utterance};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub session_id: Option<String>,
    pub transcript: Vec<Utterance>,
    pub live_user: String,
    pub live_agent: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::AlreadyActive => StatusCode::CONFLICT,
        EngineError::DeviceAcquisition(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Transport(_) => StatusCode::BAD_GATEWAY,
        EngineError::EngineStopped => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Decode(_) | EngineError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: EngineError) -> axum::response::Response {
    (
        error_status(&err),
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
/// Start a new voice session
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.handle.start_session().await {
        Ok(session_id) => {
            info!("Session {} started over HTTP", session_id);
            let status = state.handle.snapshot().status.as_str().to_string();
            (
                StatusCode::OK,
                Json(StartSessionResponse { session_id, status }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to start session: {}", e);
            error_response(e)
        }
    }
}

/// POST /session/stop
/// End the current session; a no-op when idle
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.handle.stop_session().await {
        Ok(()) => (StatusCode::OK, Json(state.handle.snapshot())).into_response(),
        Err(e) => {
            error!("Failed to stop session: {}", e);
            error_response(e)
        }
    }
}

/// GET /session
/// Current observable state
pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.handle.snapshot())
}

/// GET /session/transcript
pub async fn get_transcript(State(state): State<AppState>) -> Json<TranscriptResponse> {
    let snapshot = state.handle.snapshot();
    Json(TranscriptResponse {
        session_id: snapshot.session_id,
        transcript: snapshot.transcript,
        live_user: snapshot.live_user,
        live_agent: snapshot.live_agent,
    })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
