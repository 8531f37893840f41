use std::path::Path;

use serde::{Deserialize, Serialize};
use sleepstim_timing::LatenessStats;

use crate::state::SchedulerState;

/// Outcome of one task run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task: String,
    pub state: SchedulerState,
    /// Stimuli handed to the audio engine.
    pub presented: usize,
    /// Trigger codes emitted, block markers included.
    pub triggers: usize,
    pub missed_deadlines: usize,
    /// Clock time at which the scheduler entered `Running`.
    pub started_at: Option<f64>,
    pub finished_at: Option<f64>,
    /// Trigger lateness relative to the intended instant.
    pub lateness: LatenessStats,
}

impl TaskReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.to_json()?)
    }
}
