use anyhow::Result;
use tokio::sync::mpsc;

/// Which way an audio frame travels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioDirection {
    /// Local microphone audio headed for the remote agent
    Capture,
    /// Remote agent audio headed for the speaker
    Playback,
}

/// One block of captured 16-bit PCM
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples in capture order
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Position of this frame in its direction's stream, starting at 0
    pub sequence: u64,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
    /// Capture or playback
    pub direction: AudioDirection,
}

impl AudioFrame {
    /// Build a mono capture frame
    pub fn capture(samples: Vec<i16>, sample_rate: u32, sequence: u64) -> Self {
        Self::mono(samples, sample_rate, sequence, AudioDirection::Capture)
    }

    /// Build a mono frame of decoded agent audio
    pub fn playback(samples: Vec<i16>, sample_rate: u32, sequence: u64) -> Self {
        Self::mono(samples, sample_rate, sequence, AudioDirection::Playback)
    }

    fn mono(samples: Vec<i16>, sample_rate: u32, sequence: u64, direction: AudioDirection) -> Self {
        let timestamp_ms = if sample_rate == 0 {
            0
        } else {
            sequence * samples.len() as u64 * 1000 / sample_rate as u64
        };

        Self {
            samples,
            sample_rate,
            channels: 1,
            sequence,
            timestamp_ms,
            direction,
        }
    }

    /// Duration of the frame in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,
    /// Samples per frame (one capture callback)
    pub frame_size: usize,
    /// Frames buffered between the capture callback and the engine
    pub channel_capacity: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz mono for the remote agent
            frame_size: 4096,   // ~256ms per callback
            channel_capacity: 32,
        }
    }
}

/// A microphone-like source that yields fixed-size frames while running
///
/// The backend owns the capture device between `start` and `stop`. Frames are
/// pushed with `try_send` so a slow consumer drops frames instead of stalling
/// the capture callback.
#[async_trait::async_trait]
pub trait AudioBackend: Send {
    /// Start capturing audio
    ///
    /// Frames arrive on the returned receiver until `stop` is called
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and release the device
    ///
    /// Stopping a backend that is not capturing is a no-op.
    async fn stop(&mut self) -> Result<()>;

    /// True between a successful `start` and the next `stop`
    fn is_capturing(&self) -> bool;

    /// Short label used in log lines
    fn name(&self) -> &str;
}
