//! Physiological stream ingestion and reference-event detection.
//!
//! Samples arrive through a [`SampleSource`], typically a [`StreamInlet`] fed
//! by a producer thread through a bounded queue. A [`PhaseDetector`] turns one
//! channel of that stream into an unbounded sequence of [`PhaseEvent`]s:
//! inhalation peaks for respiration, R-peaks for ECG.

pub mod cardiac;
pub mod detector;
pub mod error;
pub mod respiration;
pub mod simulate;
pub mod stream;

pub use cardiac::{BeatTracker, CardiacDetector, CardiacSettings};
pub use detector::{Events, LandmarkTracker, PhaseDetector, PhaseEvent, StreamDetector};
pub use error::PhysioError;
pub use respiration::{RespirationDetector, RespirationSettings, RespirationTracker};
pub use simulate::{SimulatedChannel, SimulatedStream, Waveform};
pub use stream::{Sample, SampleSource, StreamInfo, StreamInlet, StreamOutlet, stream_channel};
