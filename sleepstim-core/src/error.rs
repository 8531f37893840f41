//! Error types shared by every sleepstim crate.

use thiserror::Error;

/// Invalid or inconsistent configuration, detected before any hardware or
/// audio side effect takes place.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be strictly positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("invalid {name} range: min {min} is greater than max {max}")]
    InvalidRange { name: &'static str, min: f64, max: f64 },

    #[error("trigger '{key}' is not registered")]
    UnregisteredTrigger { key: String },

    #[error("invalid trigger key '{key}', expected '<target|deviant>/<frequency>'")]
    InvalidTriggerKey { key: String },

    #[error("trigger code {code} is used by both '{first}' and '{second}'")]
    DuplicateCode {
        code: u8,
        first: String,
        second: String,
    },

    #[error("trigger code for '{key}' must be in 1..=255")]
    ZeroCode { key: String },

    #[error("target and deviant frequencies must differ, both are {0} Hz")]
    SameFrequency(f64),

    #[error("an oddball sequence needs at least one target")]
    NoTarget,

    #[error(
        "cannot place {deviants} deviants among {targets} targets with at most \
         {max_consecutive} consecutive deviant(s)"
    )]
    InfeasibleSequence {
        targets: usize,
        deviants: usize,
        max_consecutive: usize,
    },

    #[error("channel '{channel}' not found in stream '{stream}'")]
    UnknownChannel { channel: String, stream: String },

    #[error("no sound loaded for stimulus {0}")]
    UnknownStimulus(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Rejects zero, negative and non-finite values.
    pub fn check_positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(ConfigError::NonPositive { name, value })
        }
    }
}

/// Failure of the trigger or audio output. Always fatal to the running task.
#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("trigger sink failed to signal code {code}: {reason}")]
    Trigger { code: u8, reason: String },

    #[error("playback of {stimulus} failed: {reason}")]
    Playback { stimulus: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_positive_rejects_zero_negative_and_nan() {
        assert_eq!(ConfigError::check_positive("delay", 0.5), Ok(0.5));
        assert!(ConfigError::check_positive("delay", 0.0).is_err());
        assert!(ConfigError::check_positive("delay", -1.0).is_err());
        assert!(ConfigError::check_positive("delay", f64::NAN).is_err());
        assert!(ConfigError::check_positive("delay", f64::INFINITY).is_err());
    }
}
