use std::time::Duration;

use sleepstim_core::ConfigError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysioError {
    #[error("no samples received from stream '{stream}' for {timeout:?}")]
    Stalled { stream: String, timeout: Duration },

    #[error("stream '{0}' disconnected")]
    Disconnected(String),

    #[error("event detection cancelled")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type PhysioResult<T> = Result<T, PhysioError>;
