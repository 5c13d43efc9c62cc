pub mod audio;
pub mod config;
pub mod delivery;
pub mod error;
pub mod http;
pub mod nats;
pub mod session;
pub mod transport;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioFile, AudioFrame, ClockedOutput, PlaybackDevice,
    SessionRecorder, VoiceActivityDetector, WavFileBackend,
};
pub use config::Config;
pub use delivery::{Delivery, DeliveryPayload, FileDelivery, NoDelivery};
pub use error::{EngineError, Result};
pub use http::{create_router, AppState};
pub use nats::{NatsDelivery, NatsTransport};
pub use session::{
    Collaborators, EndReason, SessionConfig, SessionHandle, SessionSnapshot, SessionStatus,
    VoiceEngine,
};
pub use transport::{MemoryTransport, Transport, TransportEvent};
