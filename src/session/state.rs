use serde::{Deserialize, Serialize};

use super::transcript::Utterance;

/// Lifecycle status of the engine's session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
        }
    }
}

/// Observable state published on every change, for presentation layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    /// Current or most recent session
    pub session_id: Option<String>,
    pub is_agent_speaking: bool,
    pub is_user_speaking: bool,
    /// Finalized utterances; kept after teardown until the next start
    pub transcript: Vec<Utterance>,
    /// In-progress user text
    pub live_user: String,
    /// In-progress agent text
    pub live_agent: String,
    pub time_remaining: u32,
    /// Tool shown as running, cleared shortly after it acknowledges
    pub active_tool: Option<String>,
    /// Why the last session failed to start or ended abnormally
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn idle(max_duration_secs: u32) -> Self {
        Self {
            status: SessionStatus::Disconnected,
            session_id: None,
            is_agent_speaking: false,
            is_user_speaking: false,
            transcript: Vec::new(),
            live_user: String::new(),
            live_agent: String::new(),
            time_remaining: max_duration_secs,
            active_tool: None,
            last_error: None,
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The application asked to stop
    UserStop,
    /// The call reached its maximum length
    DurationLimit,
    /// Nobody said anything for too long
    Idle,
    /// The agent hung up and the goodbye finished playing
    AgentTerminated,
    /// The transport never confirmed the session
    ConnectTimeout,
    /// The remote side closed the session
    RemoteClosed,
    /// The transport failed
    Transport(String),
    /// The capture or output device stopped delivering
    DeviceLost(String),
    /// The engine itself is shutting down
    Shutdown,
}

impl EndReason {
    /// Error text surfaced to observers, if the end was abnormal
    pub fn error_text(&self) -> Option<String> {
        match self {
            EndReason::Transport(msg) => Some(format!("Transport error: {}", msg)),
            EndReason::DeviceLost(msg) => Some(format!("Device lost: {}", msg)),
            EndReason::ConnectTimeout => Some("Timed out waiting for the transport".to_string()),
            _ => None,
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndReason::UserStop => write!(f, "stopped by user"),
            EndReason::DurationLimit => write!(f, "maximum duration reached"),
            EndReason::Idle => write!(f, "idle timeout"),
            EndReason::AgentTerminated => write!(f, "agent ended the call"),
            EndReason::ConnectTimeout => write!(f, "connect timeout"),
            EndReason::RemoteClosed => write!(f, "closed by remote"),
            EndReason::Transport(msg) => write!(f, "transport: {}", msg),
            EndReason::DeviceLost(msg) => write!(f, "device lost: {}", msg),
            EndReason::Shutdown => write!(f, "engine shutdown"),
        }
    }
}
