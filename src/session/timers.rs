use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Counts the call down one second at a time
#[derive(Debug, Clone)]
pub struct DurationTimer {
    max_secs: u32,
    remaining: u32,
}

impl DurationTimer {
    pub fn new(max_secs: u32) -> Self {
        Self {
            max_secs,
            remaining: max_secs,
        }
    }

    /// Advance by one second; returns `true` once the countdown hits zero
    pub fn tick(&mut self) -> bool {
        if self.remaining <= 1 {
            self.remaining = 0;
            true
        } else {
            self.remaining -= 1;
            false
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn elapsed(&self) -> u32 {
        self.max_secs - self.remaining
    }

    pub fn max_secs(&self) -> u32 {
        self.max_secs
    }

    pub fn reset(&mut self) {
        self.remaining = self.max_secs;
    }
}

/// Detects a conversation that is open but silent
#[derive(Debug, Clone)]
pub struct IdleTimer {
    threshold: Duration,
    last_activity: Instant,
}

impl IdleTimer {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_activity) > self.threshold
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }
}

/// Why a timer check ended the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerExpiry {
    Duration,
    Idle,
}

/// The session's countdown and idle check, driven by one 1 Hz ticker
///
/// The ticker only exists between `start` and `cancel`; `cancel` is safe to
/// call any number of times.
#[derive(Debug)]
pub struct SessionTimers {
    pub duration: DurationTimer,
    pub idle: IdleTimer,
    ticker: Option<Interval>,
}

impl SessionTimers {
    pub fn new(max_duration_secs: u32, idle_threshold: Duration) -> Self {
        Self {
            duration: DurationTimer::new(max_duration_secs),
            idle: IdleTimer::new(idle_threshold),
            ticker: None,
        }
    }

    /// Begin counting; the first tick lands one second from now
    pub fn start(&mut self) {
        let now = Instant::now();
        self.idle.touch(now);
        let mut ticker = interval_at(now + Duration::from_secs(1), Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        self.ticker = Some(ticker);
        debug!("Session timers started ({}s max)", self.duration.max_secs());
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Wait for the next tick; pends forever while stopped
    pub async fn next_tick(&mut self) {
        match self.ticker.as_mut() {
            Some(ticker) => {
                ticker.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Handle one tick; the duration limit wins over the idle check
    pub fn on_tick(&mut self, now: Instant) -> Option<TimerExpiry> {
        if self.duration.tick() {
            return Some(TimerExpiry::Duration);
        }
        if self.idle.is_expired(now) {
            return Some(TimerExpiry::Idle);
        }
        None
    }

    pub fn record_activity(&mut self, now: Instant) {
        self.idle.touch(now);
    }

    pub fn cancel(&mut self) {
        if self.ticker.take().is_some() {
            debug!("Session timers canceled");
        }
    }

    /// Cancel and restore the full countdown
    pub fn reset(&mut self) {
        self.cancel();
        self.duration.reset();
        self.idle.touch(Instant::now());
    }
}
