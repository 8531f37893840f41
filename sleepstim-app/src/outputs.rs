//! Trigger and audio outputs available from the command line.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use sleepstim_core::{HardwareError, Stimulus, StimulusBank, TriggerCode, TriggerSink};
use sleepstim_timing::{Clock, HighPrecisionClock};
use tracing::{debug, info};

/// Reports trigger codes in the log only.
#[derive(Debug, Default)]
pub struct LogTrigger {
    emitted: u64,
}

impl TriggerSink for LogTrigger {
    fn signal(&mut self, code: TriggerCode) -> Result<(), HardwareError> {
        self.emitted += 1;
        info!(code = code.value(), n = self.emitted, "trigger");
        Ok(())
    }
}

/// Drives a trigger line through a device file such as a parallel port or a
/// serial trigger box: writes the code byte, holds it for the pulse width,
/// then writes `0` so the next code is seen as a new edge.
#[derive(Debug)]
pub struct DeviceTrigger {
    device: File,
    path: String,
    clock: HighPrecisionClock,
    pulse: Duration,
}

impl DeviceTrigger {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HardwareError> {
        let path = path.as_ref();
        let device = OpenOptions::new().write(true).open(path)?;
        info!(device = %path.display(), "trigger device opened");
        Ok(Self {
            device,
            path: path.display().to_string(),
            clock: HighPrecisionClock::new(),
            pulse: Duration::from_millis(5),
        })
    }

    pub fn with_pulse(mut self, pulse: Duration) -> Self {
        self.pulse = pulse;
        self
    }

    fn write_byte(&mut self, byte: u8) -> std::io::Result<()> {
        self.device.write_all(&[byte])?;
        self.device.flush()
    }
}

impl TriggerSink for DeviceTrigger {
    fn signal(&mut self, code: TriggerCode) -> Result<(), HardwareError> {
        let fail = |e: std::io::Error, path: &str| HardwareError::Trigger {
            code: code.value(),
            reason: format!("{path}: {e}"),
        };
        self.write_byte(code.value()).map_err(|e| fail(e, &self.path))?;
        self.clock.sleep(self.pulse);
        self.write_byte(0).map_err(|e| fail(e, &self.path))?;
        debug!(code = code.value(), device = %self.path, "trigger pulse written");
        Ok(())
    }
}

/// Stand-in audio engine: knows the registered tones and logs each request
/// with its lead over the requested start.
#[derive(Debug)]
pub struct LoggingBank {
    clock: HighPrecisionClock,
    loaded: BTreeSet<String>,
}

impl LoggingBank {
    pub fn new<'a>(clock: HighPrecisionClock, stimuli: impl IntoIterator<Item = &'a Stimulus>) -> Self {
        Self {
            clock,
            loaded: stimuli.into_iter().map(Stimulus::key).collect(),
        }
    }
}

impl StimulusBank for LoggingBank {
    fn contains(&self, stimulus: &Stimulus) -> bool {
        self.loaded.contains(&stimulus.key())
    }

    fn play(&mut self, stimulus: &Stimulus, at: f64) -> Result<(), HardwareError> {
        let lead_ms = (at - self.clock.now()) * 1e3;
        info!(stimulus = %stimulus, at, lead_ms, "play");
        Ok(())
    }
}
