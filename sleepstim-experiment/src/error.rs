use std::time::Duration;

use sleepstim_core::{ConfigError, HardwareError};
use sleepstim_physio::PhysioError;
use sleepstim_timing::Interrupted;
use thiserror::Error;

use crate::state::SchedulerState;

/// Why a task did not run to completion.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("stream '{stream}' stalled: no samples for {timeout:?}")]
    StreamStall { stream: String, timeout: Duration },

    #[error("stream '{0}' disconnected")]
    StreamDisconnected(String),

    #[error("task cancelled")]
    Cancelled,

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error("scheduler cannot go from {from:?} to {to:?}")]
    InvalidTransition {
        from: SchedulerState,
        to: SchedulerState,
    },
}

impl From<PhysioError> for TaskError {
    fn from(err: PhysioError) -> Self {
        match err {
            PhysioError::Stalled { stream, timeout } => TaskError::StreamStall { stream, timeout },
            PhysioError::Disconnected(stream) => TaskError::StreamDisconnected(stream),
            PhysioError::Cancelled => TaskError::Cancelled,
            PhysioError::Config(e) => TaskError::Config(e),
        }
    }
}

impl From<Interrupted> for TaskError {
    fn from(_: Interrupted) -> Self {
        TaskError::Cancelled
    }
}
