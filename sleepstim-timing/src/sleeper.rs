use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::clock::Clock;

/// Shared cancellation request, checked at every wait boundary.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("wait interrupted by a stop request")]
pub struct Interrupted;

/// Hybrid deadline wait: coarse OS sleep in bounded slices until the deadline
/// is within `spin_threshold`, then busy-wait.
///
/// The spin tail occupies the calling thread; overshoot is bounded by one
/// spin step instead of the OS scheduler granularity.
#[derive(Debug, Clone)]
pub struct Sleeper<C: Clock> {
    clock: C,
    spin_threshold: Duration,
    max_slice: Duration,
}

impl<C: Clock> Sleeper<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            spin_threshold: Duration::from_millis(2),
            max_slice: Duration::from_millis(5),
        }
    }

    pub fn with_spin_threshold(mut self, threshold: Duration) -> Self {
        self.spin_threshold = threshold;
        self
    }

    /// Longest uninterrupted coarse sleep; bounds cancellation latency.
    pub fn with_max_slice(mut self, slice: Duration) -> Self {
        self.max_slice = slice.max(Duration::from_micros(100));
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Blocks until `clock.now() >= deadline`. Never returns `Ok` early.
    pub fn sleep_until(&self, deadline: f64, stop: &StopFlag) -> Result<(), Interrupted> {
        let threshold = self.spin_threshold.as_secs_f64();
        loop {
            if stop.is_stopped() {
                return Err(Interrupted);
            }
            let remaining = deadline - self.clock.now();
            if !(remaining > 0.0) {
                return Ok(());
            }
            if remaining > threshold {
                // Clamped before conversion: far deadlines overflow `Duration`.
                let coarse = (remaining - threshold).min(self.max_slice.as_secs_f64());
                self.clock.sleep(Duration::from_secs_f64(coarse));
            } else {
                self.clock.spin();
            }
        }
    }

    pub fn sleep_for(&self, seconds: f64, stop: &StopFlag) -> Result<(), Interrupted> {
        self.sleep_until(self.clock.now() + seconds, stop)
    }
}
