//! Presentation loop shared by every task.
//!
//! A stimulus is presented at `fire_at`, the intended acoustic onset and
//! trigger instant. The audio engine is called `target_delay` ahead of it
//! with a start time corrected for its playback latency; the trigger fires
//! at `fire_at` itself.

use sleepstim_core::{
    BlockTriggers, ConfigError, Sequence, Stimulus, StimulusBank, TriggerCode, TriggerSink,
};
use sleepstim_physio::PhaseDetector;
use sleepstim_timing::{Clock, LatenessRecorder, Sleeper, StopFlag};
use tracing::{debug, error, info, warn};

use crate::error::TaskError;
use crate::report::TaskReport;
use crate::state::SchedulerState;
use crate::timeline::Timeline;

/// Drain margin after the last onset, as a multiple of the sound duration.
const DRAIN_FACTOR: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerTiming {
    pub target_delay: f64,
    pub playback_latency: f64,
    pub sound_duration: f64,
}

pub struct StimulusScheduler<C: Clock, T, B> {
    sleeper: Sleeper<C>,
    trigger: T,
    bank: B,
    timing: SchedulerTiming,
    state: SchedulerState,
    task: String,
    lateness: LatenessRecorder,
    presented: usize,
    triggers: usize,
    missed: usize,
    started_at: Option<f64>,
    finished_at: Option<f64>,
}

impl<C, T, B> StimulusScheduler<C, T, B>
where
    C: Clock,
    T: TriggerSink,
    B: StimulusBank,
{
    pub fn new(clock: C, trigger: T, bank: B, timing: SchedulerTiming) -> Self {
        Self {
            sleeper: Sleeper::new(clock),
            trigger,
            bank,
            timing,
            state: SchedulerState::Idle,
            task: String::new(),
            lateness: LatenessRecorder::default(),
            presented: 0,
            triggers: 0,
            missed: 0,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn timing(&self) -> SchedulerTiming {
        self.timing
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    pub fn now(&self) -> f64 {
        self.sleeper.now()
    }

    pub fn into_outputs(self) -> (T, B) {
        (self.trigger, self.bank)
    }

    /// Summary of the current or most recent run.
    pub fn report(&self) -> TaskReport {
        TaskReport {
            task: self.task.clone(),
            state: self.state,
            presented: self.presented,
            triggers: self.triggers,
            missed_deadlines: self.missed,
            started_at: self.started_at,
            finished_at: self.finished_at,
            lateness: self.lateness.stats(),
        }
    }

    /// Time-driven run: element `i` fires at
    /// `start + target_delay + timeline[i]`.
    pub fn run_timeline(
        &mut self,
        task: &str,
        sequence: &Sequence,
        timeline: &Timeline,
        stop: &StopFlag,
    ) -> Result<TaskReport, TaskError> {
        if sequence.len() != timeline.len() {
            return Err(ConfigError::Invalid(format!(
                "sequence has {} stimuli but timeline has {} onsets",
                sequence.len(),
                timeline.len()
            ))
            .into());
        }
        let start = self.begin(task)?;
        let result = self.timeline_loop(start, sequence, timeline, stop);
        self.finish(result)
    }

    /// Signal-driven run: element `i` fires `delay` seconds after the `i`-th
    /// reference event.
    pub fn run_phase_locked<D: PhaseDetector + ?Sized>(
        &mut self,
        task: &str,
        sequence: &Sequence,
        detector: &mut D,
        delay: f64,
        stop: &StopFlag,
    ) -> Result<TaskReport, TaskError> {
        ConfigError::check_positive("delay", delay)?;
        self.begin(task)?;
        let result = self.phase_locked_loop(sequence, detector, delay, stop);
        self.finish(result)
    }

    /// Marks a stimulus-free block: start code, `duration` seconds, stop code.
    pub fn run_block(
        &mut self,
        task: &str,
        block: BlockTriggers,
        duration: f64,
        stop: &StopFlag,
    ) -> Result<TaskReport, TaskError> {
        ConfigError::check_positive("duration", duration)?;
        let start = self.begin(task)?;
        let result = self.block_loop(start, block, duration, stop);
        self.finish(result)
    }

    fn timeline_loop(
        &mut self,
        start: f64,
        sequence: &Sequence,
        timeline: &Timeline,
        stop: &StopFlag,
    ) -> Result<(), TaskError> {
        let mut last_fire = start;
        for (stimulus, offset) in sequence.iter().zip(timeline.offsets()) {
            let fire_at = start + self.timing.target_delay + offset;
            last_fire = self.present(stimulus, fire_at, stop)?;
        }
        self.drain(last_fire, stop)
    }

    fn phase_locked_loop<D: PhaseDetector + ?Sized>(
        &mut self,
        sequence: &Sequence,
        detector: &mut D,
        delay: f64,
        stop: &StopFlag,
    ) -> Result<(), TaskError> {
        let mut previous: Option<f64> = None;
        let mut last_fire = self.sleeper.now();
        for stimulus in sequence {
            let event = loop {
                let event = detector.next_event(stop)?;
                if previous.is_some_and(|p| event.timestamp <= p) {
                    warn!(
                        index = event.index,
                        timestamp = event.timestamp,
                        "reference event out of order, discarded"
                    );
                    continue;
                }
                break event;
            };
            previous = Some(event.timestamp);
            last_fire = self.present(stimulus, event.timestamp + delay, stop)?;
        }
        self.drain(last_fire, stop)
    }

    fn block_loop(
        &mut self,
        start: f64,
        block: BlockTriggers,
        duration: f64,
        stop: &StopFlag,
    ) -> Result<(), TaskError> {
        self.signal(block.start)?;
        self.sleeper.sleep_until(start + duration, stop)?;
        self.transition(SchedulerState::Draining)?;
        self.signal(block.stop)?;
        Ok(())
    }

    /// Plays `stimulus` and fires its trigger at `fire_at`. Returns the
    /// instant the trigger actually fired at.
    fn present(
        &mut self,
        stimulus: &Stimulus,
        fire_at: f64,
        stop: &StopFlag,
    ) -> Result<f64, TaskError> {
        if stop.is_stopped() {
            return Err(TaskError::Cancelled);
        }
        let now = self.sleeper.now();
        if now > fire_at {
            self.missed += 1;
            warn!(
                stimulus = %stimulus,
                late_ms = (now - fire_at) * 1e3,
                "deadline already passed, presenting immediately"
            );
            // Start now; the trigger still marks the acoustic onset.
            self.bank.play(stimulus, now)?;
            self.sleeper
                .sleep_until(now + self.timing.playback_latency, stop)?;
        } else {
            self.sleeper
                .sleep_until(fire_at - self.timing.target_delay, stop)?;
            self.bank
                .play(stimulus, fire_at - self.timing.playback_latency)?;
            self.sleeper.sleep_until(fire_at, stop)?;
        }
        self.presented += 1;
        let fired = self.signal(stimulus.code)?;
        self.lateness.record(fired - fire_at);
        debug!(
            stimulus = %stimulus,
            code = stimulus.code.value(),
            fire_at,
            lateness_ms = (fired - fire_at) * 1e3,
            "stimulus presented"
        );
        Ok(fired)
    }

    fn signal(&mut self, code: TriggerCode) -> Result<f64, TaskError> {
        let fired = self.sleeper.now();
        self.trigger.signal(code)?;
        self.triggers += 1;
        Ok(fired)
    }

    fn drain(&mut self, last_fire: f64, stop: &StopFlag) -> Result<(), TaskError> {
        self.transition(SchedulerState::Draining)?;
        let until = last_fire + DRAIN_FACTOR * self.timing.sound_duration;
        self.sleeper.sleep_until(until, stop)?;
        Ok(())
    }

    /// Resets the counters and enters `Running`. Returns the start instant.
    fn begin(&mut self, task: &str) -> Result<f64, TaskError> {
        if self.state.is_finished() {
            self.transition(SchedulerState::Idle)?;
        }
        self.transition(SchedulerState::Running)?;
        let start = self.sleeper.now();
        self.task = task.to_string();
        self.lateness = LatenessRecorder::default();
        self.presented = 0;
        self.triggers = 0;
        self.missed = 0;
        self.started_at = Some(start);
        self.finished_at = None;
        info!(task, start, "task running");
        Ok(start)
    }

    fn finish(&mut self, result: Result<(), TaskError>) -> Result<TaskReport, TaskError> {
        self.finished_at = Some(self.sleeper.now());
        match result {
            Ok(()) => {
                self.transition(SchedulerState::Complete)?;
                let report = self.report();
                info!(
                    task = %report.task,
                    presented = report.presented,
                    missed = report.missed_deadlines,
                    mean_lateness_ms = report.lateness.mean_ms,
                    "task complete"
                );
                Ok(report)
            }
            Err(err) => {
                self.abort(&err);
                Err(err)
            }
        }
    }

    fn abort(&mut self, err: &TaskError) {
        if self.state.can_transition(SchedulerState::Aborted) {
            self.state = SchedulerState::Aborted;
        }
        error!(
            task = %self.task,
            presented = self.presented,
            error = %err,
            "task aborted"
        );
    }

    fn transition(&mut self, to: SchedulerState) -> Result<(), TaskError> {
        if !self.state.can_transition(to) {
            return Err(TaskError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!(from = ?self.state, ?to, "scheduler state");
        self.state = to;
        Ok(())
    }
}
