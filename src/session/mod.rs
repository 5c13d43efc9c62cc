//! Voice session management
//!
//! This module provides the `VoiceEngine` that owns one conversation at a time:
//! - Capture gating and forwarding (VAD)
//! - Gapless playback of agent audio, with barge-in
//! - Transcript assembly and tool dispatch
//! - Duration, idle and hang-up timing
//! - Teardown and hand-off of the finished session

mod config;
mod engine;
mod handle;
mod state;
pub mod timers;
pub mod tools;
pub mod transcript;

pub use config::{SessionConfig, DEFAULT_SYSTEM_INSTRUCTION};
pub use engine::{Collaborators, VoiceEngine};
pub use handle::SessionHandle;
pub use state::{EndReason, SessionSnapshot, SessionStatus};
pub use timers::{DurationTimer, IdleTimer, SessionTimers, TimerExpiry};
pub use tools::{LeadRecord, ToolCallRequest, ToolCallResult, ToolDeclaration, ToolDispatcher};
pub use transcript::{Role, TranscriptAssembler, Utterance};
