pub mod error;
pub mod output;
pub mod sequence;
pub mod stimulus;
pub mod trigger;

pub use error::{ConfigError, HardwareError};
pub use output::{StimulusBank, TriggerSink};
pub use sequence::{Sequence, SequenceGenerator};
pub use stimulus::{Stimulus, StimulusKind};
pub use trigger::{BlockTriggers, TriggerCode, TriggerRegistry, TriggerTable};
