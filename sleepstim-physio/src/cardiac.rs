//! R-peak detection on an ECG channel.
//!
//! Band-pass (high-pass then low-pass) keeps the QRS band, the squared output
//! is compared with a fraction of a slowly decaying running maximum. The first
//! threshold crossing opens a short search window and the largest energy
//! within it is the beat. No new crossing is accepted during the refractory
//! period that follows a beat.

use std::time::Duration;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, Q_BUTTERWORTH_F32, ToHertz, Type};
use serde::{Deserialize, Serialize};
use sleepstim_core::ConfigError;

use crate::detector::{LandmarkTracker, StreamDetector};
use crate::error::PhysioResult;
use crate::stream::SampleSource;

pub type CardiacDetector<S> = StreamDetector<S, BeatTracker>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardiacSettings {
    pub high_pass_hz: f32,
    pub low_pass_hz: f32,
    /// Fraction of the running energy maximum a beat must exceed.
    pub threshold_ratio: f64,
    /// Minimum inter-beat interval, in seconds.
    pub refractory_s: f64,
    /// Window after the threshold crossing searched for the energy maximum.
    pub search_window_s: f64,
    /// Time constant of the running maximum, in seconds.
    pub decay_s: f64,
    pub warmup_s: f64,
}

impl Default for CardiacSettings {
    fn default() -> Self {
        Self {
            high_pass_hz: 5.0,
            low_pass_hz: 20.0,
            threshold_ratio: 0.4,
            refractory_s: 0.25,
            search_window_s: 0.1,
            decay_s: 3.0,
            warmup_s: 2.0,
        }
    }
}

impl CardiacSettings {
    pub fn validate(&self, sample_rate: f64) -> Result<(), ConfigError> {
        ConfigError::check_positive("sample_rate", sample_rate)?;
        ConfigError::check_positive("cardiac.high_pass_hz", self.high_pass_hz as f64)?;
        ConfigError::check_positive("cardiac.low_pass_hz", self.low_pass_hz as f64)?;
        ConfigError::check_positive("cardiac.threshold_ratio", self.threshold_ratio)?;
        ConfigError::check_positive("cardiac.refractory_s", self.refractory_s)?;
        ConfigError::check_positive("cardiac.search_window_s", self.search_window_s)?;
        ConfigError::check_positive("cardiac.decay_s", self.decay_s)?;
        if self.high_pass_hz >= self.low_pass_hz {
            return Err(ConfigError::Invalid(
                "cardiac band requires 0 < high_pass_hz < low_pass_hz".into(),
            ));
        }
        if self.low_pass_hz as f64 * 2.0 >= sample_rate {
            return Err(ConfigError::Invalid(format!(
                "cardiac low-pass {} Hz is above Nyquist for {} Hz",
                self.low_pass_hz, sample_rate
            )));
        }
        if self.search_window_s >= self.refractory_s {
            return Err(ConfigError::Invalid(
                "cardiac.search_window_s must be shorter than cardiac.refractory_s".into(),
            ));
        }
        if !(self.warmup_s >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "cardiac.warmup_s must be >= 0, got {}",
                self.warmup_s
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    opened: f64,
    t: f64,
    energy: f64,
}

pub struct BeatTracker {
    settings: CardiacSettings,
    high_pass: DirectForm2Transposed<f32>,
    low_pass: DirectForm2Transposed<f32>,
    coefficients: (Coefficients<f32>, Coefficients<f32>),
    decay: f64,
    running_max: f64,
    candidate: Option<Candidate>,
    first_sample: Option<f64>,
    last_beat: Option<f64>,
}

impl BeatTracker {
    pub fn new(settings: CardiacSettings, sample_rate: f64) -> Result<Self, ConfigError> {
        settings.validate(sample_rate)?;
        let fs = (sample_rate as f32).hz();
        let hp = Coefficients::<f32>::from_params(
            Type::HighPass,
            fs,
            settings.high_pass_hz.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|e| ConfigError::Invalid(format!("cardiac high-pass: {e:?}")))?;
        let lp = Coefficients::<f32>::from_params(
            Type::LowPass,
            fs,
            settings.low_pass_hz.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|e| ConfigError::Invalid(format!("cardiac low-pass: {e:?}")))?;
        Ok(Self {
            decay: 1.0 - 1.0 / (settings.decay_s * sample_rate),
            settings,
            high_pass: DirectForm2Transposed::<f32>::new(hp.clone()),
            low_pass: DirectForm2Transposed::<f32>::new(lp.clone()),
            coefficients: (hp, lp),
            running_max: 0.0,
            candidate: None,
            first_sample: None,
            last_beat: None,
        })
    }

    fn in_refractory(&self, t: f64) -> bool {
        self.last_beat
            .is_some_and(|last| t - last < self.settings.refractory_s)
    }

    fn emit(&mut self, candidate: Candidate) -> Option<f64> {
        let first = self.first_sample.unwrap_or(candidate.t);
        if candidate.t - first < self.settings.warmup_s || self.in_refractory(candidate.t) {
            return None;
        }
        self.last_beat = Some(candidate.t);
        Some(candidate.t)
    }
}

impl LandmarkTracker for BeatTracker {
    fn push(&mut self, timestamp: f64, value: f32) -> Option<f64> {
        self.first_sample.get_or_insert(timestamp);
        let y = self.low_pass.run(self.high_pass.run(value + 1e-20)) as f64;
        let energy = y * y;
        self.running_max = if energy > self.running_max {
            energy
        } else {
            self.running_max * self.decay
        };
        let threshold = self.settings.threshold_ratio * self.running_max;

        if let Some(mut candidate) = self.candidate {
            if timestamp - candidate.opened <= self.settings.search_window_s {
                if energy > candidate.energy {
                    candidate.t = timestamp;
                    candidate.energy = energy;
                }
                self.candidate = Some(candidate);
                return None;
            }
            self.candidate = None;
            return self.emit(candidate);
        }

        if energy > threshold && energy > f64::EPSILON && !self.in_refractory(timestamp) {
            self.candidate = Some(Candidate {
                opened: timestamp,
                t: timestamp,
                energy,
            });
        }
        None
    }

    fn reset(&mut self) {
        self.high_pass = DirectForm2Transposed::<f32>::new(self.coefficients.0.clone());
        self.low_pass = DirectForm2Transposed::<f32>::new(self.coefficients.1.clone());
        self.running_max = 0.0;
        self.candidate = None;
        self.first_sample = None;
        self.last_beat = None;
    }
}

impl<S: SampleSource> StreamDetector<S, BeatTracker> {
    pub fn cardiac(
        source: S,
        channel: &str,
        settings: CardiacSettings,
        stall_timeout: Duration,
    ) -> PhysioResult<Self> {
        let tracker = BeatTracker::new(settings, source.info().sample_rate)?;
        StreamDetector::new(source, channel, tracker, stall_timeout)
    }
}
