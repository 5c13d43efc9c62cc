use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::mixer::resample_linear;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Mono samples at `target_rate`, averaging channels and resampling linearly
    pub fn to_mono(&self, target_rate: u32) -> Vec<i16> {
        let mono: Vec<i16> = if self.channels <= 1 {
            self.samples.clone()
        } else {
            let channels = self.channels as usize;
            self.samples
                .chunks_exact(channels)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / channels as i32) as i16
                })
                .collect()
        };

        resample_linear(&mono, self.sample_rate, target_rate)
    }
}

/// Capture device that replays a WAV file at real-time pace
///
/// Once the file is exhausted the backend keeps emitting silent frames, the
/// way an open microphone in a quiet room would, until it is stopped.
pub struct WavFileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    task: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn new(path: impl Into<PathBuf>, config: AudioBackendConfig) -> Self {
        Self {
            path: path.into(),
            config,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for WavFileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.task.is_some() {
            anyhow::bail!("Capture already started on {}", self.path.display());
        }

        let path = self.path.clone();
        let target_rate = self.config.sample_rate;
        let samples = tokio::task::spawn_blocking(move || {
            AudioFile::open(&path).map(|audio| audio.to_mono(target_rate))
        })
        .await
        .context("Capture loader panicked")?
        .with_context(|| format!("Failed to open capture file {}", self.path.display()))?;

        let frame_size = self.config.frame_size.max(1);
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let frame_period =
            Duration::from_secs_f64(frame_size as f64 / target_rate.max(1) as f64);
        let samples: Arc<[i16]> = samples.into();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_period);
            let mut sequence = 0u64;
            let mut offset = 0usize;

            loop {
                ticker.tick().await;

                let mut block = vec![0i16; frame_size];
                if offset < samples.len() {
                    let end = (offset + frame_size).min(samples.len());
                    block[..end - offset].copy_from_slice(&samples[offset..end]);
                    offset = end;
                }

                let frame = AudioFrame::capture(block, target_rate, sequence);
                sequence += 1;

                match tx.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("Capture consumer is behind, dropping frame {}", sequence - 1);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("Capture receiver dropped, stopping file capture");
                        break;
                    }
                }
            }
        });

        self.task = Some(task);
        info!("File capture started: {}", self.path.display());

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("File capture stopped: {}", self.path.display());
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.is_some()
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
