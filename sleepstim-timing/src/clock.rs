use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time source in seconds, plus the primitives [`crate::Sleeper`]
/// composes into deadline waits.
pub trait Clock: Clone + Send + Sync {
    fn now(&self) -> f64;

    /// Coarse OS sleep. May overshoot by the scheduler granularity.
    fn sleep(&self, d: Duration);

    /// One step of a busy wait.
    fn spin(&self) {
        std::hint::spin_loop();
    }
}

/// Wall-clock implementation backed by [`Instant`], unaffected by system
/// clock adjustments. Clones share the same origin.
#[derive(Debug, Clone, Copy)]
pub struct HighPrecisionClock {
    origin: Instant,
}

impl Clock for HighPrecisionClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }
}

impl HighPrecisionClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        #[cfg(target_os = "windows")]
        self.windows_sleep(duration);
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(target_os = "macos")]
        self.macos_sleep(duration);
        #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "windows")]
    fn windows_sleep(&self, duration: Duration) {
        use windows::Win32::Foundation::{BOOL, CloseHandle};
        use windows::Win32::System::Threading::{
            CreateWaitableTimerW, INFINITE, SetWaitableTimer, WaitForSingleObject,
        };
        use windows::core::PCWSTR;

        // Relative due time in 100 ns intervals.
        let due = -((duration.as_nanos() / 100) as i64).max(1);

        unsafe {
            let Ok(timer) = CreateWaitableTimerW(None, BOOL::from(true), PCWSTR::null()) else {
                std::thread::sleep(duration);
                return;
            };
            if SetWaitableTimer(timer, &due, 0, None, None, BOOL::from(false)).is_ok() {
                WaitForSingleObject(timer, INFINITE);
            } else {
                std::thread::sleep(duration);
            }
            let _ = CloseHandle(timer);
        }
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{CLOCK_MONOTONIC, clock_nanosleep, timespec};

        let req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };

        // An EINTR wake-up returns early; the sleeper re-checks the deadline.
        unsafe {
            clock_nanosleep(CLOCK_MONOTONIC, 0, &req, std::ptr::null_mut());
        }
    }

    #[cfg(target_os = "macos")]
    fn macos_sleep(&self, duration: Duration) {
        use mach2::mach_time::{
            mach_absolute_time, mach_timebase_info, mach_timebase_info_data_t, mach_wait_until,
        };

        unsafe {
            let mut timebase = mach_timebase_info_data_t { numer: 0, denom: 0 };
            if mach_timebase_info(&mut timebase) != 0 || timebase.numer == 0 {
                std::thread::sleep(duration);
                return;
            }
            let ticks = duration.as_nanos() as u64 * timebase.denom as u64 / timebase.numer as u64;
            mach_wait_until(mach_absolute_time() + ticks);
        }
    }
}

impl Default for HighPrecisionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Virtual clock for deterministic tests.
///
/// `sleep` advances time by exactly the requested duration and `spin` by a
/// fixed tick, so a [`crate::Sleeper`] driven by it terminates without real
/// waiting. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
    tick_ns: u64,
}

impl ManualClock {
    pub fn new(start: f64, tick: Duration) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new((start * 1e9).round() as u64)),
            tick_ns: (tick.as_nanos() as u64).max(1),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.nanos.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, seconds: f64) {
        self.nanos
            .store((seconds * 1e9).round() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0.0, Duration::from_micros(10))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.nanos.load(Ordering::SeqCst) as f64 / 1e9
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }

    fn spin(&self) {
        self.nanos.fetch_add(self.tick_ns, Ordering::SeqCst);
    }
}
