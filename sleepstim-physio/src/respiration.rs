//! Inhalation-peak detection on a respiration belt or airflow channel.
//!
//! The raw signal is smoothed by a Butterworth low-pass, then peaks are picked
//! with hysteresis: a maximum is confirmed once the smoothed signal falls
//! `prominence` times the current breathing amplitude below it. The amplitude
//! comes from upper and lower envelopes that decay towards the signal, so the
//! detector follows slow changes in breathing depth. Consecutive peaks closer
//! than the debounce window are suppressed.
//!
//! Reported timestamps are those of the smoothed peak, i.e. delayed from the
//! raw peak by the filter's group delay. The delay is constant for a given
//! breathing rate, so the landmark stays repeatable from cycle to cycle.

use std::time::Duration;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, Q_BUTTERWORTH_F32, ToHertz, Type};
use serde::{Deserialize, Serialize};
use sleepstim_core::ConfigError;

use crate::detector::{LandmarkTracker, StreamDetector};
use crate::error::PhysioResult;
use crate::stream::SampleSource;

pub type RespirationDetector<S> = StreamDetector<S, RespirationTracker>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RespirationSettings {
    pub low_pass_hz: f32,
    /// Shortest breathing cycle expected, in seconds.
    pub min_cycle_s: f64,
    /// Fraction of `min_cycle_s` during which a new peak is ignored.
    pub debounce_fraction: f64,
    /// Hysteresis as a fraction of the peak-to-trough amplitude.
    pub prominence: f64,
    /// Time constant of the amplitude envelopes, in seconds.
    pub envelope_s: f64,
    /// Peaks before this many seconds of signal are not reported.
    pub warmup_s: f64,
}

impl Default for RespirationSettings {
    fn default() -> Self {
        Self {
            low_pass_hz: 1.0,
            min_cycle_s: 2.0,
            debounce_fraction: 0.5,
            prominence: 0.3,
            envelope_s: 10.0,
            warmup_s: 2.0,
        }
    }
}

impl RespirationSettings {
    pub fn validate(&self, sample_rate: f64) -> Result<(), ConfigError> {
        ConfigError::check_positive("sample_rate", sample_rate)?;
        ConfigError::check_positive("respiration.low_pass_hz", self.low_pass_hz as f64)?;
        ConfigError::check_positive("respiration.min_cycle_s", self.min_cycle_s)?;
        ConfigError::check_positive("respiration.debounce_fraction", self.debounce_fraction)?;
        ConfigError::check_positive("respiration.prominence", self.prominence)?;
        ConfigError::check_positive("respiration.envelope_s", self.envelope_s)?;
        if !(self.warmup_s >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "respiration.warmup_s must be >= 0, got {}",
                self.warmup_s
            )));
        }
        if self.low_pass_hz as f64 * 2.0 >= sample_rate {
            return Err(ConfigError::Invalid(format!(
                "respiration low-pass {} Hz is above Nyquist for {} Hz",
                self.low_pass_hz, sample_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Seeking {
    Peak { t: f64, y: f64 },
    Trough { y: f64 },
}

pub struct RespirationTracker {
    settings: RespirationSettings,
    filter: DirectForm2Transposed<f32>,
    coefficients: Coefficients<f32>,
    envelope_alpha: f64,
    upper: f64,
    lower: f64,
    state: Option<Seeking>,
    first_sample: Option<f64>,
    last_peak: Option<f64>,
}

impl RespirationTracker {
    pub fn new(settings: RespirationSettings, sample_rate: f64) -> Result<Self, ConfigError> {
        settings.validate(sample_rate)?;
        let coefficients = Coefficients::<f32>::from_params(
            Type::LowPass,
            (sample_rate as f32).hz(),
            settings.low_pass_hz.hz(),
            Q_BUTTERWORTH_F32,
        )
        .map_err(|e| ConfigError::Invalid(format!("respiration filter: {e:?}")))?;
        Ok(Self {
            envelope_alpha: 1.0 / (settings.envelope_s * sample_rate),
            settings,
            filter: DirectForm2Transposed::<f32>::new(coefficients.clone()),
            coefficients,
            upper: 0.0,
            lower: 0.0,
            state: None,
            first_sample: None,
            last_peak: None,
        })
    }

    fn debounce(&self) -> f64 {
        self.settings.min_cycle_s * self.settings.debounce_fraction
    }

    fn track_envelope(&mut self, y: f64) {
        if y > self.upper {
            self.upper = y;
        } else {
            self.upper += (y - self.upper) * self.envelope_alpha;
        }
        if y < self.lower {
            self.lower = y;
        } else {
            self.lower += (y - self.lower) * self.envelope_alpha;
        }
    }

    fn confirm(&mut self, t: f64) -> Option<f64> {
        let first = self.first_sample.unwrap_or(t);
        if t - first < self.settings.warmup_s {
            return None;
        }
        if self.last_peak.is_some_and(|last| t - last < self.debounce()) {
            return None;
        }
        self.last_peak = Some(t);
        Some(t)
    }
}

impl LandmarkTracker for RespirationTracker {
    fn push(&mut self, timestamp: f64, value: f32) -> Option<f64> {
        let y = self.filter.run(value + 1e-20) as f64;
        if self.first_sample.is_none() {
            self.first_sample = Some(timestamp);
            self.upper = y;
            self.lower = y;
        }
        self.track_envelope(y);
        let hysteresis = self.settings.prominence * (self.upper - self.lower);

        match self.state {
            None => {
                self.state = Some(Seeking::Peak { t: timestamp, y });
                None
            }
            Some(Seeking::Peak { t, y: best }) => {
                if y > best {
                    self.state = Some(Seeking::Peak { t: timestamp, y });
                    None
                } else if hysteresis > f64::EPSILON && y < best - hysteresis {
                    self.state = Some(Seeking::Trough { y });
                    self.confirm(t)
                } else {
                    None
                }
            }
            Some(Seeking::Trough { y: best }) => {
                if y < best {
                    self.state = Some(Seeking::Trough { y });
                } else if hysteresis > f64::EPSILON && y > best + hysteresis {
                    self.state = Some(Seeking::Peak { t: timestamp, y });
                }
                None
            }
        }
    }

    fn reset(&mut self) {
        self.filter = DirectForm2Transposed::<f32>::new(self.coefficients.clone());
        self.upper = 0.0;
        self.lower = 0.0;
        self.state = None;
        self.first_sample = None;
        self.last_peak = None;
    }
}

impl<S: SampleSource> StreamDetector<S, RespirationTracker> {
    pub fn respiration(
        source: S,
        channel: &str,
        settings: RespirationSettings,
        stall_timeout: Duration,
    ) -> PhysioResult<Self> {
        let tracker = RespirationTracker::new(settings, source.info().sample_rate)?;
        StreamDetector::new(source, channel, tracker, stall_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::Waveform;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const FS: f64 = 50.0;

    fn run(tracker: &mut RespirationTracker, seconds: f64, f: impl Fn(f64) -> f32) -> Vec<f64> {
        let n = (seconds * FS) as usize;
        (0..n)
            .filter_map(|i| {
                let t = i as f64 / FS;
                tracker.push(t, f(t))
            })
            .collect()
    }

    #[test]
    fn one_peak_per_breath() {
        let mut tracker = RespirationTracker::new(RespirationSettings::default(), FS).unwrap();
        let breath = Waveform::Respiration { rate_hz: 0.25 };
        let peaks = run(&mut tracker, 60.0, |t| breath.value(t));
        // 15 cycles, minus those inside the warm-up.
        assert!((13..=15).contains(&peaks.len()), "{peaks:?}");
        for pair in peaks.windows(2) {
            assert!((pair[1] - pair[0] - 4.0).abs() < 0.1, "{pair:?}");
        }
    }

    #[test]
    fn noise_does_not_double_fire() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut tracker = RespirationTracker::new(RespirationSettings::default(), FS).unwrap();
        let breath = Waveform::Respiration { rate_hz: 0.3 };
        let noise: Vec<f32> = (0..(60.0 * FS) as usize)
            .map(|_| rng.random_range(-0.15..0.15))
            .collect();
        let peaks = run(&mut tracker, 60.0, |t| {
            breath.value(t) + noise[(t * FS).round() as usize]
        });
        for pair in peaks.windows(2) {
            assert!(pair[1] - pair[0] >= 1.0, "double detection {pair:?}");
        }
        assert!(peaks.len() >= 15, "missed breaths: {peaks:?}");
    }

    #[test]
    fn flat_signal_never_fires() {
        let mut tracker = RespirationTracker::new(RespirationSettings::default(), FS).unwrap();
        assert!(run(&mut tracker, 30.0, |_| 0.5).is_empty());
    }

    #[test]
    fn reset_restarts_warmup() {
        let mut tracker = RespirationTracker::new(RespirationSettings::default(), FS).unwrap();
        let breath = Waveform::Respiration { rate_hz: 0.25 };
        assert!(!run(&mut tracker, 20.0, |t| breath.value(t)).is_empty());
        tracker.reset();
        let n = (1.5 * FS) as usize;
        let early: Vec<f64> = (0..n)
            .filter_map(|i| {
                let t = 100.0 + i as f64 / FS;
                tracker.push(t, breath.value(t))
            })
            .collect();
        assert!(early.is_empty());
    }

    #[test]
    fn settings_are_validated() {
        let settings = RespirationSettings {
            low_pass_hz: 30.0,
            ..Default::default()
        };
        assert!(RespirationTracker::new(settings, FS).is_err());
        let settings = RespirationSettings {
            prominence: 0.0,
            ..Default::default()
        };
        assert!(RespirationTracker::new(settings, FS).is_err());
        assert!(RespirationTracker::new(RespirationSettings::default(), 0.0).is_err());
    }
}
