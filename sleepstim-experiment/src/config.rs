use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sleepstim_core::{ConfigError, SequenceGenerator, TriggerRegistry, TriggerTable};
use sleepstim_physio::{CardiacSettings, RespirationSettings};

use crate::scheduler::SchedulerTiming;

/// Run-wide settings. Times are in seconds.
///
/// Every field has a built-in default; a TOML file only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    pub n_target: usize,
    pub n_deviant: usize,
    pub max_consecutive_deviants: usize,
    /// Lead between the call to the audio engine and the intended onset.
    pub target_delay: f64,
    /// Fixed start latency of the audio engine.
    pub playback_latency: f64,
    pub sound_duration: f64,
    /// Offset from the respiration landmark to stimulus onset.
    pub respiration_delay: f64,
    pub stall_timeout: f64,
    /// Samples buffered between the stream producer and the detector.
    pub stream_buffer: usize,
    pub seed: Option<u64>,
    pub triggers: TriggerTable,
    pub respiration: RespirationSettings,
    pub cardiac: CardiacSettings,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            n_target: 100,
            n_deviant: 20,
            max_consecutive_deviants: 1,
            target_delay: 0.1,
            playback_latency: 0.0,
            sound_duration: 0.1,
            respiration_delay: 1.0,
            stall_timeout: 5.0,
            stream_buffer: 4096,
            seed: None,
            triggers: TriggerTable::default(),
            respiration: RespirationSettings::default(),
            cardiac: CardiacSettings::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::check_positive("target_delay", self.target_delay)?;
        ConfigError::check_positive("sound_duration", self.sound_duration)?;
        ConfigError::check_positive("respiration_delay", self.respiration_delay)?;
        ConfigError::check_positive("stall_timeout", self.stall_timeout)?;
        Duration::try_from_secs_f64(self.stall_timeout).map_err(|_| {
            ConfigError::Invalid(format!(
                "stall_timeout of {} s is out of range",
                self.stall_timeout
            ))
        })?;
        if !(self.playback_latency >= 0.0 && self.playback_latency <= self.target_delay) {
            return Err(ConfigError::Invalid(format!(
                "playback_latency must lie in [0, target_delay = {}], got {}",
                self.target_delay, self.playback_latency
            )));
        }
        if self.stream_buffer == 0 {
            return Err(ConfigError::Invalid("stream_buffer must be at least 1".into()));
        }
        self.generator()
            .check_feasible(self.n_target, self.n_deviant)?;
        self.registry()?;
        Ok(())
    }

    pub fn registry(&self) -> Result<TriggerRegistry, ConfigError> {
        TriggerRegistry::new(&self.triggers)
    }

    pub fn generator(&self) -> SequenceGenerator {
        SequenceGenerator::new(self.max_consecutive_deviants)
    }

    pub fn timing(&self) -> SchedulerTiming {
        SchedulerTiming {
            target_delay: self.target_delay,
            playback_latency: self.playback_latency,
            sound_duration: self.sound_duration,
        }
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.stall_timeout).unwrap_or(Duration::MAX)
    }
}
