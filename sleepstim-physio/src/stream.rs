//! Boundary to the live sample transport.
//!
//! Discovery and connection belong to the transport; this module only needs
//! "next sample with timestamp" and "channel name to index". The in-process
//! hand-off between a producer thread and the detector is a bounded `flume`
//! channel that drops the oldest sample when the consumer falls behind.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
use sleepstim_core::ConfigError;
use tracing::warn;

use crate::error::{PhysioError, PhysioResult};

#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub name: String,
    pub channels: Vec<String>,
    /// Nominal sampling rate in Hz.
    pub sample_rate: f64,
    /// Added to sample timestamps to express them on the scheduler's clock.
    pub clock_offset: f64,
}

impl StreamInfo {
    pub fn new(name: impl Into<String>, channels: &[&str], sample_rate: f64) -> Self {
        Self {
            name: name.into(),
            channels: channels.iter().map(|c| c.to_string()).collect(),
            sample_rate,
            clock_offset: 0.0,
        }
    }

    pub fn channel_index(&self, channel: &str) -> Result<usize, ConfigError> {
        self.channels
            .iter()
            .position(|c| c == channel)
            .ok_or_else(|| ConfigError::UnknownChannel {
                channel: channel.to_string(),
                stream: self.name.clone(),
            })
    }
}

/// One multi-channel sample, timestamped on the stream's clock (seconds).
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub values: Vec<f32>,
}

pub trait SampleSource: Send {
    fn info(&self) -> &StreamInfo;

    /// Waits up to `timeout` for the next sample. `Ok(None)` on timeout.
    fn pull(&mut self, timeout: Duration) -> PhysioResult<Option<Sample>>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn info(&self) -> &StreamInfo {
        (**self).info()
    }

    fn pull(&mut self, timeout: Duration) -> PhysioResult<Option<Sample>> {
        (**self).pull(timeout)
    }
}

/// Creates a bounded producer/consumer pair holding at most `capacity`
/// samples.
pub fn stream_channel(info: StreamInfo, capacity: usize) -> (StreamOutlet, StreamInlet) {
    let (tx, rx) = flume::bounded(capacity.max(1));
    let closed = Arc::new(AtomicBool::new(false));
    let outlet = StreamOutlet {
        name: info.name.clone(),
        tx,
        overflow: rx.clone(),
        dropped: Arc::new(AtomicU64::new(0)),
        closed: closed.clone(),
    };
    let inlet = StreamInlet { info, rx, closed };
    (outlet, inlet)
}

/// Producer half. Never blocks.
#[derive(Clone)]
pub struct StreamOutlet {
    name: String,
    tx: Sender<Sample>,
    overflow: Receiver<Sample>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl StreamOutlet {
    /// Queues `sample`, evicting the oldest queued sample if full.
    pub fn push(&self, sample: Sample) -> PhysioResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(PhysioError::Disconnected(self.name.clone()));
        }
        let mut sample = sample;
        loop {
            match self.tx.try_send(sample) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) => {
                    if self.overflow.try_recv().is_ok() {
                        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        if dropped == 1 || dropped % 1000 == 0 {
                            warn!(
                                stream = %self.name,
                                dropped,
                                "consumer falling behind, dropping oldest samples"
                            );
                        }
                    }
                    sample = rejected;
                }
                Err(TrySendError::Disconnected(_)) => {
                    return Err(PhysioError::Disconnected(self.name.clone()));
                }
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

/// Consumer half.
pub struct StreamInlet {
    info: StreamInfo,
    rx: Receiver<Sample>,
    closed: Arc<AtomicBool>,
}

impl StreamInlet {
    pub fn queued(&self) -> usize {
        self.rx.len()
    }
}

impl SampleSource for StreamInlet {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn pull(&mut self, timeout: Duration) -> PhysioResult<Option<Sample>> {
        match self.rx.recv_timeout(timeout) {
            Ok(sample) => Ok(Some(sample)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(PhysioError::Disconnected(self.info.name.clone()))
            }
        }
    }
}

impl Drop for StreamInlet {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: f64) -> Sample {
        Sample {
            timestamp: t,
            values: vec![t as f32],
        }
    }

    #[test]
    fn resolves_channels_by_name() {
        let info = StreamInfo::new("polysomnograph", &["ECG", "RESP"], 256.0);
        assert_eq!(info.channel_index("RESP"), Ok(1));
        assert!(matches!(
            info.channel_index("EMG"),
            Err(ConfigError::UnknownChannel { .. })
        ));
    }

    #[test]
    fn full_queue_drops_oldest() {
        let (outlet, mut inlet) = stream_channel(StreamInfo::new("s", &["x"], 10.0), 4);
        for i in 0..10 {
            outlet.push(sample(i as f64)).unwrap();
        }
        assert_eq!(outlet.dropped(), 6);
        assert_eq!(inlet.queued(), 4);
        let received: Vec<f64> = std::iter::from_fn(|| {
            inlet
                .pull(Duration::from_millis(1))
                .unwrap()
                .map(|s| s.timestamp)
        })
        .collect();
        assert_eq!(received, vec![6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn pull_times_out_then_reports_disconnect() {
        let (outlet, mut inlet) = stream_channel(StreamInfo::new("s", &["x"], 10.0), 4);
        assert_eq!(inlet.pull(Duration::from_millis(5)), Ok(None));
        outlet.push(sample(1.0)).unwrap();
        drop(outlet);
        assert_eq!(inlet.pull(Duration::from_millis(5)), Ok(Some(sample(1.0))));
        assert!(matches!(
            inlet.pull(Duration::from_millis(5)),
            Err(PhysioError::Disconnected(_))
        ));
    }

    #[test]
    fn push_after_inlet_dropped_fails() {
        let (outlet, inlet) = stream_channel(StreamInfo::new("s", &["x"], 10.0), 4);
        drop(inlet);
        assert!(outlet.is_closed());
        assert!(outlet.push(sample(0.0)).is_err());
    }
}
