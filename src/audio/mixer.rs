// Session recorder mixing local and remote audio
//
// The microphone and the agent's voice run on independent clocks and rates.
// The recorder lays both onto one timeline at the recording rate:
// - capture frames are appended back to back from the moment recording starts
// - playback units are placed at their scheduled output-clock position
// Overlapping samples are added together with clipping.

use anyhow::{Context, Result};
use std::io::Cursor;
use tracing::{debug, info, warn};

use super::backend::AudioFrame;
use super::playback::PlaybackUnit;

/// Configuration for the session recorder
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Sample rate of the recording (the playback rate)
    pub sample_rate: u32,
    /// Longest recording kept; later audio is dropped
    pub max_duration_secs: u64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            max_duration_secs: 330,
        }
    }
}

/// Mixed mono recording of one conversation
pub struct SessionRecorder {
    config: MixerConfig,
    timeline: Vec<i16>,
    capture_cursor: usize,
    /// Output clock time when recording started
    playback_origin: f64,
    truncated: bool,
}

impl SessionRecorder {
    /// Start recording; `playback_origin` is the output clock time right now
    pub fn new(config: MixerConfig, playback_origin: f64) -> Self {
        info!(
            "Session recorder started: {}Hz, up to {}s",
            config.sample_rate, config.max_duration_secs
        );

        Self {
            config,
            timeline: Vec::new(),
            capture_cursor: 0,
            playback_origin,
            truncated: false,
        }
    }

    /// Append a capture frame at the capture cursor
    pub fn add_capture(&mut self, frame: &AudioFrame) {
        let samples = resample_linear(&frame.samples, frame.sample_rate, self.config.sample_rate);
        let position = self.capture_cursor;
        self.capture_cursor += samples.len();
        self.mix_at(position, &samples);
    }

    /// Mix the audible part of a playback unit at its scheduled position
    pub fn add_playback(&mut self, unit: &PlaybackUnit, played: &[i16]) {
        if played.is_empty() {
            return;
        }

        let offset_secs = (unit.start_at - self.playback_origin).max(0.0);
        let position = (offset_secs * self.config.sample_rate as f64).round() as usize;
        let samples = resample_linear(played, unit.sample_rate, self.config.sample_rate);

        debug!(
            "Mixing playback unit {} at {:.3}s ({} samples)",
            unit.id,
            offset_secs,
            samples.len()
        );
        self.mix_at(position, &samples);
    }

    /// Add `samples` into the timeline starting at `position`, clipping on overflow
    fn mix_at(&mut self, position: usize, samples: &[i16]) {
        let limit = self.config.sample_rate as usize * self.config.max_duration_secs as usize;
        if position >= limit {
            self.note_truncation();
            return;
        }

        let end = (position + samples.len()).min(limit);
        if end < position + samples.len() {
            self.note_truncation();
        }
        if self.timeline.len() < end {
            self.timeline.resize(end, 0);
        }

        for (slot, &sample) in self.timeline[position..end].iter_mut().zip(samples) {
            let sum = *slot as i32 + sample as i32;
            *slot = sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        }
    }

    fn note_truncation(&mut self) {
        if !self.truncated {
            warn!(
                "Recording exceeded {}s, dropping further audio",
                self.config.max_duration_secs
            );
            self.truncated = true;
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.timeline
    }

    pub fn duration_secs(&self) -> f64 {
        self.timeline.len() as f64 / self.config.sample_rate as f64
    }

    /// Render the recording as a 16-bit mono WAV file
    pub fn render_wav(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.config.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer =
                hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
            for &sample in &self.timeline {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            writer.finalize().context("Failed to finalize WAV")?;
        }

        Ok(cursor.into_inner())
    }
}

/// Linear-interpolation resampler for mono i16 audio
pub fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let index = (pos as usize).min(last);
            let next = (index + 1).min(last);
            let frac = pos - index as f64;
            let value = samples[index] as f64 * (1.0 - frac) + samples[next] as f64 * frac;
            value.round() as i16
        })
        .collect()
}
