//! Remote conversational-audio transport
//!
//! The engine talks to the remote agent through an opaque duplex channel:
//! outbound audio, text prompts and tool results; inbound transcription,
//! audio, tool calls and turn signals. Concrete transports live in
//! [`memory`] and [`crate::nats`].

pub mod memory;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::session::tools::{ToolCallRequest, ToolCallResult, ToolDeclaration};
use crate::session::transcript::Role;

pub use memory::{MemoryTransport, RemoteEnd};

/// Everything the remote agent needs to open a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSetup {
    pub session_id: String,
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    pub tools: Vec<ToolDeclaration>,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
}

/// Message sent to the remote agent
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Forwarded capture audio as PCM16 little-endian bytes
    Audio { pcm: Vec<u8>, sample_rate: u32, sequence: u64 },
    /// Text prompt
    Text(String),
    /// Acknowledgement of a tool call
    ToolResult(ToolCallResult),
}

/// Event received from the remote agent
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The remote side confirmed the session
    Opened,
    TranscriptionDelta { role: Role, text: String },
    /// Encoded agent audio (PCM16 little-endian)
    AudioFragment(Vec<u8>),
    /// All function calls of one remote turn
    ToolCall(Vec<ToolCallRequest>),
    TurnComplete,
    /// The user talked over the agent
    Interrupted,
    Error(String),
    Closed,
}

/// Live connection handed to the engine by `Transport::open`
pub struct TransportLink {
    pub outbound: mpsc::Sender<Outbound>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

#[async_trait::async_trait]
pub trait Transport: Send {
    /// Connect and send the session setup
    ///
    /// Returning does not mean the session is open: the remote side confirms
    /// with `TransportEvent::Opened`.
    async fn open(&mut self, setup: &SessionSetup) -> Result<TransportLink>;

    /// Release the connection; closing twice is a no-op
    async fn close(&mut self) -> Result<()>;

    fn name(&self) -> &str;
}
