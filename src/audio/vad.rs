//! Energy-based voice activity detection
//!
//! Each capture frame is compared against a slowly adapting estimate of the
//! room's ambient energy. Frames well above that floor (and above an absolute
//! minimum) are speech. After speech ends, a hang counter keeps forwarding
//! frames for a while so trailing syllables reach the remote agent.

use serde::{Deserialize, Serialize};

use super::backend::AudioFrame;

/// Tunables for the detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Speech must exceed `noise_floor * sensitivity`
    pub sensitivity: f32,
    /// Absolute RMS a frame must exceed to count as speech
    pub min_rms: f32,
    /// Frames still forwarded after the last speech frame
    pub hang_frames: u32,
    /// Noise floor at session start
    pub initial_noise_floor: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sensitivity: 1.1,
            min_rms: 0.003,
            hang_frames: 60,
            initial_noise_floor: 0.005,
        }
    }
}

/// Result of classifying one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadDecision {
    /// Send this frame to the remote agent
    pub forward: bool,
    /// The frame itself was classified as speech
    pub speech: bool,
    /// Frame energy
    pub rms: f32,
    /// Noise floor after this frame
    pub noise_floor: f32,
}

pub struct VoiceActivityDetector {
    config: VadConfig,
    noise_floor: f32,
    hang_remaining: u32,
}

impl VoiceActivityDetector {
    pub fn new(config: VadConfig) -> Self {
        Self {
            noise_floor: config.initial_noise_floor,
            hang_remaining: 0,
            config,
        }
    }

    /// Start from a specific noise floor estimate
    pub fn with_noise_floor(config: VadConfig, noise_floor: f32) -> Self {
        Self {
            noise_floor,
            hang_remaining: 0,
            config,
        }
    }

    pub fn noise_floor(&self) -> f32 {
        self.noise_floor
    }

    pub fn hang_remaining(&self) -> u32 {
        self.hang_remaining
    }

    /// Classify a capture frame
    pub fn process(&mut self, frame: &AudioFrame) -> VadDecision {
        self.update(frame_rms(&frame.samples))
    }

    /// Classify a frame from its precomputed RMS energy
    pub fn update(&mut self, rms: f32) -> VadDecision {
        self.noise_floor = self.noise_floor * 0.99 + rms * 0.01;

        let speech =
            rms > self.noise_floor * self.config.sensitivity && rms > self.config.min_rms;

        let forward = if speech {
            self.hang_remaining = self.config.hang_frames;
            true
        } else if self.hang_remaining > 0 {
            self.hang_remaining -= 1;
            true
        } else {
            false
        };

        VadDecision {
            forward,
            speech,
            rms,
            noise_floor: self.noise_floor,
        }
    }

    /// Forget all adaptation; used at session start
    pub fn reset(&mut self) {
        self.noise_floor = self.config.initial_noise_floor;
        self.hang_remaining = 0;
    }
}

/// Root-mean-square energy of i16 samples, normalised to [0, 1]
pub fn frame_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / 32768.0;
            v * v
        })
        .sum();

    (sum_squares / samples.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_detector() -> VoiceActivityDetector {
        let config = VadConfig {
            sensitivity: 1.1,
            min_rms: 0.003,
            hang_frames: 60,
            initial_noise_floor: 0.01,
        };
        VoiceActivityDetector::with_noise_floor(config, 0.01)
    }

    #[test]
    fn test_speech_frame_resets_hang_counter() {
        let mut vad = scenario_detector();

        let decision = vad.update(0.02);
        assert!(decision.speech);
        assert!(decision.forward);
        assert_eq!(vad.hang_remaining(), 60);
    }

    #[test]
    fn test_silence_during_hang_is_forwarded() {
        let mut vad = scenario_detector();
        vad.update(0.02);

        let decision = vad.update(0.001);
        assert!(!decision.speech);
        assert!(decision.forward);
        assert_eq!(vad.hang_remaining(), 59);
    }

    #[test]
    fn test_forwarding_stops_when_hang_expires() {
        let mut vad = scenario_detector();
        vad.update(0.02);

        for _ in 0..60 {
            assert!(vad.update(0.001).forward);
        }
        let decision = vad.update(0.001);
        assert!(!decision.forward);
        assert_eq!(vad.hang_remaining(), 0);
    }

    #[test]
    fn test_quiet_room_is_not_speech() {
        // Above the floor ratio but under the absolute minimum
        let mut vad = VoiceActivityDetector::with_noise_floor(VadConfig::default(), 0.0001);
        let decision = vad.update(0.002);
        assert!(!decision.speech);
        assert!(!decision.forward);
    }

    #[test]
    fn test_noise_floor_is_exponential_average() {
        let mut vad = scenario_detector();
        let decision = vad.update(0.02);
        assert!((decision.noise_floor - 0.0101).abs() < 1e-6);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        vad.update(0.5);
        vad.reset();
        assert_eq!(vad.noise_floor(), 0.005);
        assert_eq!(vad.hang_remaining(), 0);
    }

    #[test]
    fn test_frame_rms_of_constant_signal() {
        let rms = frame_rms(&[16384; 128]);
        assert!((rms - 0.5).abs() < 1e-6);
        assert_eq!(frame_rms(&[]), 0.0);
    }
}
