//! HTTP API server for driving the voice engine
//!
//! This module provides a REST API around the single engine session:
//! - POST /session/start - Start a session
//! - POST /session/stop - End the current session
//! - GET /session - Current observable state
//! - GET /session/transcript - Finalized and live transcript
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
