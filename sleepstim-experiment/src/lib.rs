pub mod config;
pub mod error;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod timeline;

pub use config::ExperimentConfig;
pub use error::TaskError;
pub use report::TaskReport;
pub use runner::TaskRunner;
pub use scheduler::{SchedulerTiming, StimulusScheduler};
pub use state::SchedulerState;
pub use timeline::Timeline;
