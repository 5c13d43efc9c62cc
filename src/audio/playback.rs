//! Gapless, cancelable scheduling of remote agent audio
//!
//! Fragments arrive faster than they play. Instead of starting each one on
//! arrival, the scheduler chains start times on the output clock so
//! consecutive fragments play back to back. An interruption stops everything
//! at once and forgets the chained offset.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::backend::{AudioDirection, AudioFrame};

pub type UnitId = u64;

/// A decoded buffer placed on the output timeline
#[derive(Debug, Clone)]
pub struct PlaybackUnit {
    pub id: UnitId,
    /// Output clock time (seconds) at which playback starts
    pub start_at: f64,
    /// Length in seconds
    pub duration: f64,
    pub sample_rate: u32,
    pub samples: Arc<[i16]>,
}

impl PlaybackUnit {
    pub fn end_at(&self) -> f64 {
        self.start_at + self.duration
    }

    /// Samples actually heard if playback is cut at output time `at`
    pub fn played_prefix(&self, at: f64) -> &[i16] {
        let elapsed = (at - self.start_at).clamp(0.0, self.duration);
        let count = ((elapsed * self.sample_rate as f64) as usize).min(self.samples.len());
        &self.samples[..count]
    }
}

#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start: f64,
    active: BTreeMap<UnitId, PlaybackUnit>,
    next_id: UnitId,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule one frame of decoded agent audio
    pub fn schedule_frame(&mut self, frame: AudioFrame, now: f64) -> PlaybackUnit {
        debug_assert_eq!(frame.direction, AudioDirection::Playback);
        self.schedule(frame.samples, frame.sample_rate, now)
    }

    /// Place a decoded buffer at `max(next_start, now)` and chain the next start after it
    pub fn schedule(&mut self, samples: Vec<i16>, sample_rate: u32, now: f64) -> PlaybackUnit {
        let duration = if sample_rate == 0 {
            0.0
        } else {
            samples.len() as f64 / sample_rate as f64
        };
        let start_at = self.next_start.max(now);
        self.next_start = start_at + duration;

        let unit = PlaybackUnit {
            id: self.next_id,
            start_at,
            duration,
            sample_rate,
            samples: samples.into(),
        };
        self.next_id += 1;

        debug!(
            "Scheduled unit {} at {:.3}s for {:.3}s ({} active)",
            unit.id,
            unit.start_at,
            unit.duration,
            self.active.len() + 1
        );

        self.active.insert(unit.id, unit.clone());
        unit
    }

    /// Remove a unit whose playback finished
    ///
    /// Returns `None` for units that were already canceled.
    pub fn complete(&mut self, id: UnitId) -> Option<PlaybackUnit> {
        self.active.remove(&id)
    }

    /// Drop every scheduled or playing unit and reset the chained start time
    ///
    /// The caller stops the returned units on the output device.
    pub fn cancel_all(&mut self) -> Vec<PlaybackUnit> {
        self.next_start = 0.0;
        std::mem::take(&mut self.active).into_values().collect()
    }

    pub fn is_agent_speaking(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }
}

/// Output device able to play buffers at scheduled clock times
#[async_trait::async_trait]
pub trait PlaybackDevice: Send {
    /// Open the device and restart its clock at zero
    ///
    /// Returns a channel receiving the id of every unit that finished playing.
    async fn open(&mut self) -> Result<mpsc::UnboundedReceiver<UnitId>>;

    /// Current output clock time in seconds
    fn now(&self) -> f64;

    /// Start `unit` at its scheduled time
    fn play(&mut self, unit: &PlaybackUnit) -> Result<()>;

    /// Stop a unit immediately; unknown or finished units are ignored
    fn stop(&mut self, id: UnitId);

    /// Stop everything and release the device
    async fn close(&mut self) -> Result<()>;

    fn name(&self) -> &str;
}

/// Virtual output device driven by the tokio clock
///
/// Each unit's completion fires when its scheduled end time is reached.
/// Stopping a unit aborts its completion so it never reports as finished.
#[derive(Default)]
pub struct ClockedOutput {
    epoch: Option<Instant>,
    completions: Option<mpsc::UnboundedSender<UnitId>>,
    playing: HashMap<UnitId, JoinHandle<()>>,
}

impl ClockedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn playing_count(&self) -> usize {
        self.playing.values().filter(|task| !task.is_finished()).count()
    }
}

#[async_trait::async_trait]
impl PlaybackDevice for ClockedOutput {
    async fn open(&mut self) -> Result<mpsc::UnboundedReceiver<UnitId>> {
        if self.epoch.is_some() {
            anyhow::bail!("Output device already open");
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.epoch = Some(Instant::now());
        self.completions = Some(tx);
        info!("Output device opened");

        Ok(rx)
    }

    fn now(&self) -> f64 {
        self.epoch
            .map(|epoch| epoch.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn play(&mut self, unit: &PlaybackUnit) -> Result<()> {
        let (Some(epoch), Some(tx)) = (self.epoch, self.completions.clone()) else {
            anyhow::bail!("Output device is not open");
        };

        self.playing.retain(|_, task| !task.is_finished());

        let ends_at = epoch + Duration::from_secs_f64(unit.end_at().max(0.0));
        let id = unit.id;
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(ends_at).await;
            let _ = tx.send(id);
        });
        self.playing.insert(id, task);

        Ok(())
    }

    fn stop(&mut self, id: UnitId) {
        if let Some(task) = self.playing.remove(&id) {
            task.abort();
        }
    }

    async fn close(&mut self) -> Result<()> {
        for (_, task) in self.playing.drain() {
            task.abort();
        }
        if self.epoch.take().is_some() {
            info!("Output device closed");
        }
        self.completions = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "clocked-output"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragments_are_chained_gaplessly() {
        let mut scheduler = PlaybackScheduler::new();

        let first = scheduler.schedule(vec![0; 24000], 24000, 0.5);
        let second = scheduler.schedule(vec![0; 12000], 24000, 0.6);

        assert_eq!(first.start_at, 0.5);
        assert_eq!(second.start_at, 1.5);
        assert_eq!(scheduler.next_start(), 2.0);
        assert_eq!(scheduler.active_len(), 2);
    }

    #[test]
    fn test_playback_frames_chain_like_buffers() {
        let mut scheduler = PlaybackScheduler::new();

        let first = AudioFrame::playback(vec![0; 12000], 24000, 0);
        let second = AudioFrame::playback(vec![0; 2400], 24000, 1);

        let first = scheduler.schedule_frame(first, 0.25);
        let second = scheduler.schedule_frame(second, 0.3);

        assert_eq!(first.sample_rate, 24000);
        assert_eq!(second.start_at, 0.75);
        assert!((scheduler.next_start() - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_late_fragment_starts_at_current_time() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(vec![0; 2400], 24000, 0.0);

        let late = scheduler.schedule(vec![0; 2400], 24000, 3.0);
        assert_eq!(late.start_at, 3.0);
    }

    #[test]
    fn test_cancel_clears_active_set_and_offset() {
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(vec![0; 24000], 24000, 1.0);
        scheduler.schedule(vec![0; 24000], 24000, 1.0);

        let canceled = scheduler.cancel_all();
        assert_eq!(canceled.len(), 2);
        assert!(!scheduler.is_agent_speaking());
        assert_eq!(scheduler.next_start(), 0.0);

        let next = scheduler.schedule(vec![0; 240], 24000, 1.2);
        assert_eq!(next.start_at, 1.2);
    }

    #[test]
    fn test_completion_of_canceled_unit_is_ignored() {
        let mut scheduler = PlaybackScheduler::new();
        let unit = scheduler.schedule(vec![0; 240], 24000, 0.0);
        scheduler.cancel_all();

        assert!(scheduler.complete(unit.id).is_none());
    }

    #[test]
    fn test_agent_speaking_tracks_active_set() {
        let mut scheduler = PlaybackScheduler::new();
        assert!(!scheduler.is_agent_speaking());

        let a = scheduler.schedule(vec![0; 240], 24000, 0.0);
        let b = scheduler.schedule(vec![0; 240], 24000, 0.0);
        assert!(scheduler.is_agent_speaking());

        scheduler.complete(a.id);
        assert!(scheduler.is_agent_speaking());
        scheduler.complete(b.id);
        assert!(!scheduler.is_agent_speaking());
    }

    #[test]
    fn test_played_prefix_is_clamped() {
        let mut scheduler = PlaybackScheduler::new();
        let unit = scheduler.schedule(vec![1; 1000], 1000, 2.0);

        assert_eq!(unit.played_prefix(1.0).len(), 0);
        assert_eq!(unit.played_prefix(2.5).len(), 500);
        assert_eq!(unit.played_prefix(9.0).len(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clocked_output_reports_completion() {
        let mut output = ClockedOutput::new();
        let mut done = output.open().await.unwrap();
        let mut scheduler = PlaybackScheduler::new();

        let unit = scheduler.schedule(vec![0; 24000], 24000, output.now());
        output.play(&unit).unwrap();

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(done.recv().await, Some(unit.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_unit_never_completes() {
        let mut output = ClockedOutput::new();
        let mut done = output.open().await.unwrap();
        let mut scheduler = PlaybackScheduler::new();

        let unit = scheduler.schedule(vec![0; 24000], 24000, output.now());
        output.play(&unit).unwrap();
        output.stop(unit.id);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(done.try_recv().is_err());

        output.close().await.unwrap();
        assert_eq!(output.playing_count(), 0);
    }
}
