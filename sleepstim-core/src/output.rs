//! Output capabilities driven by the scheduler.
//!
//! Implementations are owned exclusively by one scheduler for the duration of
//! a task. Any error they return aborts the task.

use crate::error::HardwareError;
use crate::stimulus::Stimulus;
use crate::trigger::TriggerCode;

/// Marks events on the recording equipment.
pub trait TriggerSink: Send {
    /// Fires `code` synchronously. Expected to return within about a
    /// millisecond.
    fn signal(&mut self, code: TriggerCode) -> Result<(), HardwareError>;
}

/// Plays pre-loaded tones.
pub trait StimulusBank: Send {
    /// Whether a sound is loaded for `stimulus`.
    fn contains(&self, stimulus: &Stimulus) -> bool;

    /// Schedules `stimulus` to start at absolute clock time `at` (seconds).
    fn play(&mut self, stimulus: &Stimulus, at: f64) -> Result<(), HardwareError>;
}

impl<T: TriggerSink + ?Sized> TriggerSink for Box<T> {
    fn signal(&mut self, code: TriggerCode) -> Result<(), HardwareError> {
        (**self).signal(code)
    }
}

impl<B: StimulusBank + ?Sized> StimulusBank for Box<B> {
    fn contains(&self, stimulus: &Stimulus) -> bool {
        (**self).contains(stimulus)
    }

    fn play(&mut self, stimulus: &Stimulus, at: f64) -> Result<(), HardwareError> {
        (**self).play(stimulus, at)
    }
}
