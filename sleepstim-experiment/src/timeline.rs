//! Onset offsets for time-driven tasks.

use rand::Rng;
use sleepstim_core::ConfigError;

/// Offsets from the start of a task, one per stimulus. The first offset is 0
/// and offsets strictly increase.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    offsets: Vec<f64>,
}

impl Timeline {
    /// Evenly spaced onsets: `i * delay`.
    pub fn isochronous(n: usize, delay: f64) -> Result<Self, ConfigError> {
        ConfigError::check_positive("delay", delay)?;
        Ok(Self {
            offsets: (0..n).map(|i| i as f64 * delay).collect(),
        })
    }

    /// Onsets separated by independent uniform draws from `[min, max]`.
    pub fn asynchronous<R: Rng + ?Sized>(
        n: usize,
        min: f64,
        max: f64,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        ConfigError::check_positive("minimum delay", min)?;
        ConfigError::check_positive("maximum delay", max)?;
        if min > max {
            return Err(ConfigError::InvalidRange {
                name: "delay",
                min,
                max,
            });
        }
        let mut offsets = Vec::with_capacity(n);
        let mut t = 0.0;
        for i in 0..n {
            if i > 0 {
                t += rng.random_range(min..=max);
            }
            offsets.push(t);
        }
        Ok(Self { offsets })
    }

    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}
