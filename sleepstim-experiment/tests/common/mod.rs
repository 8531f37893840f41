#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sleepstim_core::{HardwareError, Stimulus, StimulusBank, TriggerCode, TriggerSink};
use sleepstim_physio::{PhaseDetector, PhaseEvent, PhysioError};
use sleepstim_timing::{Clock, ManualClock, StopFlag};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn manual_clock(start: f64) -> ManualClock {
    ManualClock::new(start, Duration::from_micros(10))
}

/// Trigger codes with the clock time they were emitted at.
#[derive(Clone, Default)]
pub struct TriggerLog(Arc<Mutex<Vec<(f64, u8)>>>);

impl TriggerLog {
    pub fn entries(&self) -> Vec<(f64, u8)> {
        self.0.lock().unwrap().clone()
    }

    pub fn times(&self) -> Vec<f64> {
        self.entries().into_iter().map(|(t, _)| t).collect()
    }

    pub fn codes(&self) -> Vec<u8> {
        self.entries().into_iter().map(|(_, c)| c).collect()
    }
}

pub struct RecordingTrigger<C> {
    clock: C,
    log: TriggerLog,
    fail_on: Option<usize>,
    stop_after: Option<(usize, StopFlag)>,
}

impl<C: Clock> RecordingTrigger<C> {
    pub fn new(clock: C) -> (Self, TriggerLog) {
        let log = TriggerLog::default();
        (
            Self {
                clock,
                log: log.clone(),
                fail_on: None,
                stop_after: None,
            },
            log,
        )
    }

    /// The `n`-th signal (1-based) fails.
    pub fn failing_on(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }

    /// Raises `stop` once `n` codes have been emitted.
    pub fn stopping_after(mut self, n: usize, stop: StopFlag) -> Self {
        self.stop_after = Some((n, stop));
        self
    }
}

impl<C: Clock> TriggerSink for RecordingTrigger<C> {
    fn signal(&mut self, code: TriggerCode) -> Result<(), HardwareError> {
        let mut log = self.log.0.lock().unwrap();
        if self.fail_on == Some(log.len() + 1) {
            return Err(HardwareError::Trigger {
                code: code.value(),
                reason: "port closed".into(),
            });
        }
        log.push((self.clock.now(), code.value()));
        if let Some((n, stop)) = &self.stop_after {
            if log.len() >= *n {
                stop.stop();
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayCall {
    pub called_at: f64,
    pub start_at: f64,
    pub code: u8,
}

#[derive(Clone, Default)]
pub struct PlayLog(Arc<Mutex<Vec<PlayCall>>>);

impl PlayLog {
    pub fn calls(&self) -> Vec<PlayCall> {
        self.0.lock().unwrap().clone()
    }
}

/// Bank holding sounds for every stimulus except those listed as missing.
pub struct RecordingBank<C> {
    clock: C,
    log: PlayLog,
    missing: Vec<f64>,
}

impl<C: Clock> RecordingBank<C> {
    pub fn new(clock: C) -> (Self, PlayLog) {
        let log = PlayLog::default();
        (
            Self {
                clock,
                log: log.clone(),
                missing: Vec::new(),
            },
            log,
        )
    }

    pub fn without(mut self, frequency: f64) -> Self {
        self.missing.push(frequency);
        self
    }
}

impl<C: Clock> StimulusBank for RecordingBank<C> {
    fn contains(&self, stimulus: &Stimulus) -> bool {
        !self.missing.contains(&stimulus.frequency)
    }

    fn play(&mut self, stimulus: &Stimulus, at: f64) -> Result<(), HardwareError> {
        self.log.0.lock().unwrap().push(PlayCall {
            called_at: self.clock.now(),
            start_at: at,
            code: stimulus.code.value(),
        });
        Ok(())
    }
}

/// Replays fixed event times on a [`ManualClock`]. Each event is reported
/// `latency` seconds after it happened; once the script runs out the
/// detector stalls.
pub struct ScriptedDetector {
    clock: ManualClock,
    events: VecDeque<f64>,
    latency: f64,
    emitted: u64,
}

impl ScriptedDetector {
    pub fn new(clock: ManualClock, events: &[f64]) -> Self {
        Self {
            clock,
            events: events.iter().copied().collect(),
            latency: 0.0,
            emitted: 0,
        }
    }

    pub fn with_latency(mut self, latency: f64) -> Self {
        self.latency = latency;
        self
    }
}

impl PhaseDetector for ScriptedDetector {
    fn next_event(&mut self, stop: &StopFlag) -> Result<PhaseEvent, PhysioError> {
        if stop.is_stopped() {
            return Err(PhysioError::Cancelled);
        }
        let Some(timestamp) = self.events.pop_front() else {
            let timeout = Duration::from_secs(5);
            self.clock.advance(timeout);
            return Err(PhysioError::Stalled {
                stream: "scripted".into(),
                timeout,
            });
        };
        let seen = timestamp + self.latency;
        if self.clock.now() < seen {
            self.clock.set(seen);
        }
        let event = PhaseEvent {
            index: self.emitted,
            timestamp,
        };
        self.emitted += 1;
        Ok(event)
    }
}
