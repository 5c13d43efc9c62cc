use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audio::codec::{from_base64, to_base64};
use crate::session::tools::{ToolCallRequest, ToolCallResult};
use crate::session::transcript::Role;
use crate::transport::{Outbound, SessionSetup, TransportEvent};

/// Session setup published once when a session opens
#[derive(Debug, Serialize, Deserialize)]
pub struct SetupMessage {
    #[serde(flatten)]
    pub setup: SessionSetup,
    pub timestamp: String, // RFC3339 timestamp
}

/// Capture audio forwarded to the remote agent
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub sequence: u64,
    pub pcm: String, // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String,
}

/// Message published on the outbound subject
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Audio(AudioFrameMessage),
    Text { session_id: String, text: String },
    ToolResponse { session_id: String, result: ToolCallResult },
}

impl ClientMessage {
    pub fn from_outbound(session_id: &str, outbound: Outbound) -> Self {
        match outbound {
            Outbound::Audio {
                pcm,
                sample_rate,
                sequence,
            } => ClientMessage::Audio(AudioFrameMessage {
                session_id: session_id.to_string(),
                sequence,
                pcm: to_base64(&pcm),
                sample_rate,
                channels: 1,
                timestamp: chrono::Utc::now().to_rfc3339(),
            }),
            Outbound::Text(text) => ClientMessage::Text {
                session_id: session_id.to_string(),
                text,
            },
            Outbound::ToolResult(result) => ClientMessage::ToolResponse {
                session_id: session_id.to_string(),
                result,
            },
        }
    }
}

/// Message received on the inbound subject
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Opened,
    Transcription { role: Role, text: String },
    Audio { pcm: String },
    ToolCall { calls: Vec<ToolCallRequest> },
    TurnComplete,
    Interrupted,
    Error { message: String },
    Closed,
}

impl ServerMessage {
    /// Convert to an engine event, decoding the base64 audio payload
    ///
    /// Audio that is not valid base64 becomes an empty fragment: the engine
    /// still sees the activity and rejects the fragment when decoding.
    pub fn into_event(self) -> TransportEvent {
        match self {
            ServerMessage::Opened => TransportEvent::Opened,
            ServerMessage::Transcription { role, text } => {
                TransportEvent::TranscriptionDelta { role, text }
            }
            ServerMessage::Audio { pcm } => match from_base64(&pcm) {
                Ok(bytes) => TransportEvent::AudioFragment(bytes),
                Err(e) => {
                    warn!("Forwarding undecodable audio fragment: {}", e);
                    TransportEvent::AudioFragment(Vec::new())
                }
            },
            ServerMessage::ToolCall { calls } => TransportEvent::ToolCall(calls),
            ServerMessage::TurnComplete => TransportEvent::TurnComplete,
            ServerMessage::Interrupted => TransportEvent::Interrupted,
            ServerMessage::Error { message } => TransportEvent::Error(message),
            ServerMessage::Closed => TransportEvent::Closed,
        }
    }
}
