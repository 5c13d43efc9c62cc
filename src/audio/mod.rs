pub mod backend;
pub mod codec;
pub mod file;
pub mod mixer;
pub mod playback;
pub mod vad;

pub use backend::{AudioBackend, AudioBackendConfig, AudioDirection, AudioFrame};
pub use file::{AudioFile, WavFileBackend};
pub use mixer::{MixerConfig, SessionRecorder};
pub use playback::{ClockedOutput, PlaybackDevice, PlaybackScheduler, PlaybackUnit, UnitId};
pub use vad::{VadConfig, VadDecision, VoiceActivityDetector};
