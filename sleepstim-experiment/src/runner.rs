use rand::Rng;
use sleepstim_core::{
    ConfigError, Sequence, Stimulus, StimulusBank, TriggerRegistry, TriggerSink,
};
use sleepstim_physio::{PhaseDetector, SampleSource, StreamDetector};
use sleepstim_timing::{Clock, StopFlag};
use tracing::info;

use crate::config::ExperimentConfig;
use crate::error::TaskError;
use crate::report::TaskReport;
use crate::scheduler::StimulusScheduler;
use crate::timeline::Timeline;

/// Runs the experiment tasks against one set of outputs.
///
/// Every task validates its parameters, resolves its trigger codes and
/// generates its sequence before the first trigger or tone, so a rejected
/// configuration leaves the hardware untouched.
pub struct TaskRunner<C: Clock, T, B, R> {
    config: ExperimentConfig,
    registry: TriggerRegistry,
    scheduler: StimulusScheduler<C, T, B>,
    rng: R,
}

impl<C, T, B, R> TaskRunner<C, T, B, R>
where
    C: Clock,
    T: TriggerSink,
    B: StimulusBank,
    R: Rng,
{
    pub fn new(
        config: ExperimentConfig,
        clock: C,
        trigger: T,
        bank: B,
        rng: R,
    ) -> Result<Self, TaskError> {
        config.validate()?;
        let registry = config.registry()?;
        let scheduler = StimulusScheduler::new(clock, trigger, bank, config.timing());
        Ok(Self {
            config,
            registry,
            scheduler,
            rng,
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn registry(&self) -> &TriggerRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &StimulusScheduler<C, T, B> {
        &self.scheduler
    }

    pub fn into_outputs(self) -> (T, B) {
        self.scheduler.into_outputs()
    }

    /// Silent block framed by the baseline start and stop codes.
    pub fn baseline(&mut self, duration: f64, stop: &StopFlag) -> Result<TaskReport, TaskError> {
        let block = self.registry.block("baseline")?;
        info!(duration, "starting baseline");
        self.scheduler.run_block("baseline", block, duration, stop)
    }

    /// Oddball sequence at a fixed inter-stimulus interval.
    pub fn isochronous(
        &mut self,
        delay: f64,
        target: f64,
        deviant: f64,
        stop: &StopFlag,
    ) -> Result<TaskReport, TaskError> {
        self.check_interval("delay", delay)?;
        let sequence = self.sequence(target, deviant)?;
        let timeline = Timeline::isochronous(sequence.len(), delay)?;
        info!(delay, target, deviant, n = sequence.len(), "starting isochronous task");
        self.scheduler
            .run_timeline("isochronous", &sequence, &timeline, stop)
    }

    /// Oddball sequence with uniformly jittered inter-stimulus intervals.
    pub fn asynchronous(
        &mut self,
        (min, max): (f64, f64),
        target: f64,
        deviant: f64,
        stop: &StopFlag,
    ) -> Result<TaskReport, TaskError> {
        self.check_interval("minimum delay", min)?;
        if min > max {
            return Err(ConfigError::InvalidRange {
                name: "delay",
                min,
                max,
            }
            .into());
        }
        let sequence = self.sequence(target, deviant)?;
        let timeline = Timeline::asynchronous(sequence.len(), min, max, &mut self.rng)?;
        info!(min, max, target, deviant, n = sequence.len(), "starting asynchronous task");
        self.scheduler
            .run_timeline("asynchronous", &sequence, &timeline, stop)
    }

    /// Oddball sequence locked to inhalation peaks, `respiration_delay`
    /// seconds after each.
    pub fn synchronous_respiration<S: SampleSource>(
        &mut self,
        source: S,
        channel: &str,
        target: f64,
        deviant: f64,
        stop: &StopFlag,
    ) -> Result<TaskReport, TaskError> {
        let sequence = self.sequence(target, deviant)?;
        let mut detector = StreamDetector::respiration(
            source,
            channel,
            self.config.respiration.clone(),
            self.config.stall_timeout(),
        )?;
        let delay = self.config.respiration_delay;
        info!(channel, delay, target, deviant, "starting respiration-locked task");
        self.scheduler.run_phase_locked(
            "synchronous-respiration",
            &sequence,
            &mut detector,
            delay,
            stop,
        )
    }

    /// Oddball sequence locked to R-peaks, `delay` seconds after each.
    pub fn synchronous_cardiac<S: SampleSource>(
        &mut self,
        source: S,
        channel: &str,
        delay: f64,
        target: f64,
        deviant: f64,
        stop: &StopFlag,
    ) -> Result<TaskReport, TaskError> {
        ConfigError::check_positive("delay", delay)?;
        let sequence = self.sequence(target, deviant)?;
        let mut detector = StreamDetector::cardiac(
            source,
            channel,
            self.config.cardiac.clone(),
            self.config.stall_timeout(),
        )?;
        info!(channel, delay, target, deviant, "starting cardiac-locked task");
        self.scheduler.run_phase_locked(
            "synchronous-cardiac",
            &sequence,
            &mut detector,
            delay,
            stop,
        )
    }

    /// Phase-locked task driven by any detector.
    pub fn synchronous_with<D: PhaseDetector + ?Sized>(
        &mut self,
        task: &str,
        detector: &mut D,
        delay: f64,
        target: f64,
        deviant: f64,
        stop: &StopFlag,
    ) -> Result<TaskReport, TaskError> {
        ConfigError::check_positive("delay", delay)?;
        let sequence = self.sequence(target, deviant)?;
        info!(task, delay, target, deviant, "starting phase-locked task");
        self.scheduler
            .run_phase_locked(task, &sequence, detector, delay, stop)
    }

    /// Inter-stimulus intervals must leave room for the playback lead.
    fn check_interval(&self, name: &'static str, value: f64) -> Result<(), ConfigError> {
        ConfigError::check_positive(name, value)?;
        if value <= self.config.target_delay {
            return Err(ConfigError::Invalid(format!(
                "{name} ({value} s) must exceed target_delay ({} s)",
                self.config.target_delay
            )));
        }
        Ok(())
    }

    fn sequence(&mut self, target: f64, deviant: f64) -> Result<Sequence, TaskError> {
        let (target, deviant) = self.registry.oddball_pair(target, deviant)?;
        self.check_loaded(&target)?;
        self.check_loaded(&deviant)?;
        let kinds = self.config.generator().generate(
            &mut self.rng,
            self.config.n_target,
            self.config.n_deviant,
        )?;
        Ok(Sequence::new(&kinds, target, deviant))
    }

    fn check_loaded(&self, stimulus: &Stimulus) -> Result<(), ConfigError> {
        if self.scheduler.bank().contains(stimulus) {
            Ok(())
        } else {
            Err(ConfigError::UnknownStimulus(stimulus.key()))
        }
    }
}
