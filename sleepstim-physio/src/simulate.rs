//! Synthetic physiological streams for dry runs and tests.

use std::f64::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sleepstim_timing::{Clock, Sleeper, StopFlag};
use tracing::{debug, info};

use crate::stream::{Sample, StreamInfo, StreamInlet, StreamOutlet, stream_channel};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Waveform {
    /// Sinusoidal breathing, inhalation peaks at `(k + 1/4) / rate_hz`.
    Respiration { rate_hz: f64 },
    /// PQRST complex repeated at `bpm`, R-wave [`Waveform::R_WAVE_S`] into
    /// each beat.
    Ecg { bpm: f64 },
    Flat(f32),
}

fn gauss(t: f64, center: f64, width: f64) -> f64 {
    (-0.5 * ((t - center) / width).powi(2)).exp()
}

impl Waveform {
    pub const R_WAVE_S: f64 = 0.2;

    pub fn value(&self, t: f64) -> f32 {
        match *self {
            Waveform::Respiration { rate_hz } => (2.0 * PI * rate_hz * t).sin() as f32,
            Waveform::Ecg { bpm } => {
                let tau = t.rem_euclid(60.0 / bpm);
                let r = Self::R_WAVE_S;
                let v = 0.1 * gauss(tau, r - 0.12, 0.025) - 0.1 * gauss(tau, r - 0.025, 0.008)
                    + gauss(tau, r, 0.01)
                    - 0.15 * gauss(tau, r + 0.025, 0.008)
                    + 0.25 * gauss(tau, r + 0.25, 0.05);
                v as f32
            }
            Waveform::Flat(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedChannel {
    pub name: String,
    pub waveform: Waveform,
    /// Peak amplitude of uniform additive noise.
    pub noise: f32,
}

impl SimulatedChannel {
    pub fn new(name: impl Into<String>, waveform: Waveform) -> Self {
        Self {
            name: name.into(),
            waveform,
            noise: 0.0,
        }
    }

    pub fn with_noise(mut self, noise: f32) -> Self {
        self.noise = noise.abs();
        self
    }
}

/// Producer thread pushing synthetic samples in real time into a bounded
/// stream. Stops and joins on drop.
pub struct SimulatedStream {
    stop: StopFlag,
    paused: Arc<AtomicBool>,
    outlet: StreamOutlet,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedStream {
    pub fn spawn<C: Clock + 'static>(
        name: &str,
        sample_rate: f64,
        channels: Vec<SimulatedChannel>,
        clock: C,
        capacity: usize,
        seed: u64,
    ) -> (Self, StreamInlet) {
        let names: Vec<&str> = channels.iter().map(|c| c.name.as_str()).collect();
        let info = StreamInfo::new(name, &names, sample_rate);
        let (outlet, inlet) = stream_channel(info, capacity);
        let stop = StopFlag::new();
        let paused = Arc::new(AtomicBool::new(false));

        let handle = {
            let stop = stop.clone();
            let paused = paused.clone();
            let outlet = outlet.clone();
            let name = name.to_string();
            std::thread::spawn(move || {
                produce(&name, sample_rate, &channels, clock, &outlet, &stop, &paused, seed)
            })
        };
        info!(stream = name, sample_rate, "simulated stream started");

        (
            Self {
                stop,
                paused,
                outlet,
                handle: Some(handle),
            },
            inlet,
        )
    }

    /// Withholds samples without closing the stream, as a frozen amplifier
    /// would.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn dropped(&self) -> u64 {
        self.outlet.dropped()
    }
}

impl Drop for SimulatedStream {
    fn drop(&mut self) {
        self.stop.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn produce<C: Clock>(
    name: &str,
    sample_rate: f64,
    channels: &[SimulatedChannel],
    clock: C,
    outlet: &StreamOutlet,
    stop: &StopFlag,
    paused: &AtomicBool,
    seed: u64,
) {
    let mut rng = StdRng::seed_from_u64(seed);
    let sleeper = Sleeper::new(clock.clone());
    let start = clock.now();
    let mut n: u64 = 0;
    loop {
        let t = start + n as f64 / sample_rate;
        if sleeper.sleep_until(t, stop).is_err() {
            break;
        }
        n += 1;
        if paused.load(Ordering::SeqCst) {
            continue;
        }
        let values = channels
            .iter()
            .map(|c| {
                let noise = if c.noise > 0.0 {
                    rng.random_range(-c.noise..c.noise)
                } else {
                    0.0
                };
                c.waveform.value(t) + noise
            })
            .collect();
        if outlet.push(Sample { timestamp: t, values }).is_err() {
            break;
        }
    }
    debug!(stream = name, samples = n, "simulated stream stopped");
}
