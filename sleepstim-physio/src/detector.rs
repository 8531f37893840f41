use std::time::{Duration, Instant};

use sleepstim_timing::StopFlag;
use tracing::{debug, warn};

use crate::error::{PhysioError, PhysioResult};
use crate::stream::{Sample, SampleSource};

/// Largest step between consecutive sample timestamps before the tracker is
/// restarted, in seconds.
const MAX_GAP_S: f64 = 0.5;

/// A detected reference instant, on the scheduler's clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseEvent {
    /// Zero-based rank in the detector's output.
    pub index: u64,
    pub timestamp: f64,
}

/// Lazy, unbounded source of reference events.
pub trait PhaseDetector {
    /// Blocks until the next event. Fails with [`PhysioError::Stalled`] when
    /// the stream stops delivering samples and with
    /// [`PhysioError::Cancelled`] once `stop` is raised.
    fn next_event(&mut self, stop: &StopFlag) -> PhysioResult<PhaseEvent>;

    fn events<'a>(&'a mut self, stop: &'a StopFlag) -> Events<'a, Self>
    where
        Self: Sized,
    {
        Events {
            detector: self,
            stop,
            failed: false,
        }
    }
}

impl<D: PhaseDetector + ?Sized> PhaseDetector for Box<D> {
    fn next_event(&mut self, stop: &StopFlag) -> PhysioResult<PhaseEvent> {
        (**self).next_event(stop)
    }
}

/// Iterator over detector output. Yields the first error, then ends.
pub struct Events<'a, D> {
    detector: &'a mut D,
    stop: &'a StopFlag,
    failed: bool,
}

impl<D: PhaseDetector> Iterator for Events<'_, D> {
    type Item = PhysioResult<PhaseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = self.detector.next_event(self.stop);
        self.failed = next.is_err();
        Some(next)
    }
}

/// Online landmark detection on one channel.
pub trait LandmarkTracker: Send {
    /// Feeds one sample; returns the stream timestamp of a landmark confirmed
    /// by this sample, if any. Returned timestamps are strictly increasing.
    fn push(&mut self, timestamp: f64, value: f32) -> Option<f64>;

    /// Forgets all filter state; the following samples go through warm-up
    /// again.
    fn reset(&mut self);
}

/// Drives a [`LandmarkTracker`] from one channel of a [`SampleSource`],
/// adding stall detection and cancellation.
///
/// A jump in sample timestamps (a dropout or a backwards step) restarts the
/// tracker so stale filter state never produces a landmark.
pub struct StreamDetector<S, T> {
    source: S,
    tracker: T,
    channel: usize,
    stall_timeout: Duration,
    poll_interval: Duration,
    last_sample: Option<Instant>,
    last_timestamp: Option<f64>,
    last_event: Option<f64>,
    emitted: u64,
}

impl<S: SampleSource, T: LandmarkTracker> StreamDetector<S, T> {
    pub fn new(
        source: S,
        channel: &str,
        tracker: T,
        stall_timeout: Duration,
    ) -> PhysioResult<Self> {
        let channel = source.info().channel_index(channel)?;
        Ok(Self {
            source,
            tracker,
            channel,
            stall_timeout,
            poll_interval: Duration::from_millis(20),
            last_sample: None,
            last_timestamp: None,
            last_event: None,
            emitted: 0,
        })
    }

    /// Upper bound on how long one pull blocks before the stop flag is
    /// checked again.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    fn stalled(&self) -> PhysioError {
        PhysioError::Stalled {
            stream: self.source.info().name.clone(),
            timeout: self.stall_timeout,
        }
    }

    /// Next sample, or `None` once the stream has been silent for the stall
    /// timeout. Samples already queued are taken before the silence is
    /// judged, so time spent away from the detector never counts as a stall.
    fn next_sample(&mut self, stop: &StopFlag) -> PhysioResult<Option<Sample>> {
        if let Some(sample) = self.source.pull(Duration::ZERO)? {
            return Ok(Some(sample));
        }
        let last_sample = *self.last_sample.get_or_insert_with(Instant::now);
        loop {
            if stop.is_stopped() {
                return Err(PhysioError::Cancelled);
            }
            let silent = last_sample.elapsed();
            if silent >= self.stall_timeout {
                warn!(stream = %self.source.info().name, ?silent, "stream stalled");
                return Ok(None);
            }
            let wait = self.poll_interval.min(self.stall_timeout - silent);
            if let Some(sample) = self.source.pull(wait)? {
                return Ok(Some(sample));
            }
        }
    }
}

impl<S: SampleSource, T: LandmarkTracker> PhaseDetector for StreamDetector<S, T> {
    fn next_event(&mut self, stop: &StopFlag) -> PhysioResult<PhaseEvent> {
        loop {
            if stop.is_stopped() {
                return Err(PhysioError::Cancelled);
            }
            let Some(sample) = self.next_sample(stop)? else {
                return Err(self.stalled());
            };
            self.last_sample = Some(Instant::now());

            if self.last_timestamp.is_some_and(|prev| {
                !(sample.timestamp > prev && sample.timestamp - prev <= MAX_GAP_S)
            }) {
                warn!(
                    previous = self.last_timestamp,
                    timestamp = sample.timestamp,
                    "gap in stream timestamps, restarting detection"
                );
                self.tracker.reset();
            }
            self.last_timestamp = Some(sample.timestamp);

            let Some(&value) = sample.values.get(self.channel) else {
                warn!(
                    width = sample.values.len(),
                    channel = self.channel,
                    "sample narrower than the stream layout, skipped"
                );
                continue;
            };
            let Some(landmark) = self.tracker.push(sample.timestamp, value) else {
                continue;
            };

            let timestamp = landmark + self.source.info().clock_offset;
            if self.last_event.is_some_and(|last| timestamp <= last) {
                warn!(timestamp, "non-monotonic landmark discarded");
                continue;
            }
            self.last_event = Some(timestamp);
            let event = PhaseEvent {
                index: self.emitted,
                timestamp,
            };
            self.emitted += 1;
            debug!(index = event.index, timestamp, "reference event detected");
            return Ok(event);
        }
    }
}
