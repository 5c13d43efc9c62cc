//! Error taxonomy for the voice session engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the session engine
///
/// Device and transport failures never escape a running session: the engine
/// tears down and reports them through the observable `last_error`. They are
/// only returned directly from `start_session` while connecting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The capture or playback device could not be opened
    #[error("Device acquisition failed: {0}")]
    DeviceAcquisition(String),

    /// The remote transport failed or closed
    #[error("Transport error: {0}")]
    Transport(String),

    /// An inbound audio fragment could not be decoded
    #[error("Decode failure: {0}")]
    Decode(String),

    /// The finished session payload could not be delivered
    #[error("Delivery failure: {0}")]
    Delivery(String),

    /// A session is already connecting or connected
    #[error("A session is already active")]
    AlreadyActive,

    /// The engine task is no longer running
    #[error("Session engine is not running")]
    EngineStopped,
}

impl EngineError {
    pub(crate) fn device(err: anyhow::Error) -> Self {
        EngineError::DeviceAcquisition(format!("{:#}", err))
    }

    pub(crate) fn transport(err: anyhow::Error) -> Self {
        EngineError::Transport(format!("{:#}", err))
    }
}
