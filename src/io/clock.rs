//! Project timer.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Deserialize;

/// Millisecond time source.
pub trait TimeSource: Send + Sync + std::fmt::Debug {
    fn now_ms(&self) -> f64;
}

/// Wall-clock time since creation.
#[derive(Debug)]
pub struct SystemTime {
    origin: Instant,
}

impl Default for SystemTime {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl TimeSource for SystemTime {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Time that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    now: Arc<Mutex<f64>>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(
        &self,
        ms: f64,
    ) {
        *self.now.lock() += ms;
    }

    pub fn set(
        &self,
        ms: f64,
    ) {
        *self.now.lock() = ms;
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> f64 {
        *self.now.lock()
    }
}

/// Data the host may post to the clock.
#[derive(Debug, Clone, Deserialize)]
pub struct ClockCommand {
    #[serde(default)]
    pub paused: Option<bool>,
    #[serde(default)]
    pub reset: bool,
}

/// The project timer, pausable and resettable.
#[derive(Debug)]
pub struct Clock {
    source: Arc<dyn TimeSource>,
    start_ms: f64,
    paused_at: Option<f64>,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(Arc::new(SystemTime::default()))
    }
}

impl Clock {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        let start_ms = source.now_ms();
        Self {
            source,
            start_ms,
            paused_at: None,
        }
    }

    /// Current time of the underlying source, in milliseconds.
    #[inline]
    pub fn now_ms(&self) -> f64 {
        self.paused_at.unwrap_or_else(|| self.source.now_ms())
    }

    /// Seconds since the last reset.
    pub fn project_timer(&self) -> f64 {
        (self.now_ms() - self.start_ms) / 1000.0
    }

    pub fn reset_project_timer(&mut self) {
        self.start_ms = self.now_ms();
    }

    pub fn pause(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(self.source.now_ms());
        }
    }

    pub fn resume(&mut self) {
        if let Some(paused_at) = self.paused_at.take() {
            self.start_ms += self.source.now_ms() - paused_at;
        }
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn post_data(
        &mut self,
        command: ClockCommand,
    ) {
        match command.paused {
            Some(true) => self.pause(),
            Some(false) => self.resume(),
            None => {}
        }
        if command.reset {
            self.reset_project_timer();
        }
    }
}
