use serde::{Deserialize, Serialize};

/// Lifecycle of one scheduler run.
///
/// `Idle → Running → Draining → Complete`, with `Aborted` reachable from
/// `Running` and `Draining`. A finished scheduler may go back to `Idle` for
/// the next task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    #[default]
    Idle,
    Running,
    Draining,
    Complete,
    Aborted,
}

impl SchedulerState {
    pub fn can_transition(self, to: SchedulerState) -> bool {
        use SchedulerState::*;
        matches!(
            (self, to),
            (Idle, Running)
                | (Running, Draining)
                | (Draining, Complete)
                | (Running, Aborted)
                | (Draining, Aborted)
                | (Complete, Idle)
                | (Aborted, Idle)
        )
    }

    pub fn is_finished(self) -> bool {
        matches!(self, SchedulerState::Complete | SchedulerState::Aborted)
    }
}
