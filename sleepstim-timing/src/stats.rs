use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Summary of how late triggers fired relative to their intended instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatenessStats {
    pub count: usize,
    pub mean_ms: f64,
    pub jitter_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Bounded history of lateness samples, oldest evicted first.
#[derive(Debug, Clone)]
pub struct LatenessRecorder {
    samples: VecDeque<f64>,
    max_samples: usize,
}

impl LatenessRecorder {
    pub fn new(max_samples: usize) -> Self {
        let max_samples = max_samples.max(1);
        Self {
            samples: VecDeque::with_capacity(max_samples.min(4096)),
            max_samples,
        }
    }

    /// Records `seconds` of lateness (negative when early).
    pub fn record(&mut self, seconds: f64) {
        if self.samples.len() >= self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(seconds);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn stats(&self) -> LatenessStats {
        if self.samples.is_empty() {
            return LatenessStats::default();
        }
        let ms: Vec<f64> = self.samples.iter().map(|s| s * 1_000.0).collect();
        let n = ms.len() as f64;
        let mean = ms.iter().sum::<f64>() / n;
        let var = ms.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        LatenessStats {
            count: ms.len(),
            mean_ms: mean,
            jitter_ms: var.sqrt(),
            min_ms: ms.iter().copied().fold(f64::INFINITY, f64::min),
            max_ms: ms.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

impl Default for LatenessRecorder {
    fn default() -> Self {
        Self::new(1000)
    }
}
