//! Fixed-rate tick driver.
//!
//! Calls [`Scheduler::step_once`] once per interval on the caller's thread.
//! A tick that overruns its slot is not made up for; the driver never runs
//! two ticks at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::{Scheduler, StepReport};

/// Cloneable handle that stops a running [`TickDriver`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Drives a scheduler at a fixed cadence.
#[derive(Debug)]
pub struct TickDriver {
    interval: Duration,
    stop: StopHandle,
}

impl TickDriver {
    /// Create a driver ticking every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            stop: StopHandle::default(),
        }
    }

    /// Create a driver ticking `rate_hz` times per second.
    pub fn with_rate(rate_hz: f64) -> Self {
        let rate = if rate_hz.is_finite() && rate_hz > 0.0 {
            rate_hz
        } else {
            60.0
        };
        Self::new(Duration::from_secs_f64(1.0 / rate))
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Tick until stopped, the scheduler quits, `max_ticks` is reached or
    /// `on_step` returns false.
    pub fn run(
        &self,
        scheduler: &mut Scheduler,
        max_ticks: Option<u64>,
        mut on_step: impl FnMut(&Scheduler, &StepReport) -> bool,
    ) -> u64 {
        scheduler.start();
        let mut ticks = 0u64;
        let mut next = Instant::now();
        while scheduler.is_started() && !self.stop.is_stopped() {
            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }
            let report = scheduler.step_once();
            ticks += 1;
            if !on_step(scheduler, &report) {
                break;
            }

            next += self.interval;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                next = now;
            }
        }
        debug!("Tick driver ran {} ticks", ticks);
        ticks
    }
}
