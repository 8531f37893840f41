pub mod clock;
pub mod sleeper;
pub mod stats;

pub use clock::{Clock, HighPrecisionClock, ManualClock};
pub use sleeper::{Interrupted, Sleeper, StopFlag};
pub use stats::{LatenessRecorder, LatenessStats};
