use std::time::Duration;

use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use sleepstim_core::TriggerSink;
use sleepstim_experiment::{ExperimentConfig, TaskError, TaskReport, TaskRunner};
use sleepstim_physio::{SimulatedChannel, SimulatedStream, StreamInlet, Waveform};
use sleepstim_timing::{HighPrecisionClock, StopFlag};
use tracing::{info, warn};

use crate::cli::{Cli, StreamArgs, Task};
use crate::outputs::{DeviceTrigger, LogTrigger, LoggingBank};

type Runner = TaskRunner<HighPrecisionClock, Box<dyn TriggerSink>, LoggingBank, StdRng>;

pub struct App {
    cli: Cli,
    config: ExperimentConfig,
    clock: HighPrecisionClock,
    stop: StopFlag,
}

impl App {
    pub fn new(cli: Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => ExperimentConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ExperimentConfig::default(),
        };
        if cli.seed.is_some() {
            config.seed = cli.seed;
        }
        config.validate().context("invalid configuration")?;

        let stop = StopFlag::new();
        let handler_stop = stop.clone();
        ctrlc::set_handler(move || handler_stop.stop())
            .context("installing the Ctrl-C handler")?;

        Ok(Self {
            cli,
            config,
            clock: HighPrecisionClock::new(),
            stop,
        })
    }

    pub fn run(self) -> Result<()> {
        let mut runner = self.runner()?;
        let result = self.run_task(&mut runner);

        let report = match &result {
            Ok(report) => report.clone(),
            Err(_) => runner.scheduler().report(),
        };
        if let Some(path) = &self.cli.report {
            report
                .save(path)
                .with_context(|| format!("writing report to {}", path.display()))?;
            info!(path = %path.display(), "report written");
        }
        if report.missed_deadlines > 0 {
            warn!(missed = report.missed_deadlines, "some stimuli missed their deadline");
        }

        result?;
        Ok(())
    }

    fn runner(&self) -> Result<Runner> {
        let trigger: Box<dyn TriggerSink> = match self.cli.trigger.as_str() {
            "log" => Box::new(LogTrigger::default()),
            path => Box::new(
                DeviceTrigger::open(path)?
                    .with_pulse(Duration::from_millis(self.cli.trigger_pulse_ms)),
            ),
        };
        let registry = self.config.registry()?;
        let bank = LoggingBank::new(self.clock, registry.stimuli());
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(TaskRunner::new(
            self.config.clone(),
            self.clock,
            trigger,
            bank,
            rng,
        )?)
    }

    fn run_task(&self, runner: &mut Runner) -> Result<TaskReport, TaskError> {
        let stop = &self.stop;
        match &self.cli.task {
            Task::Baseline { duration } => runner.baseline(*duration, stop),
            Task::Isochronous { delay, tones } => {
                runner.isochronous(*delay, tones.target, tones.deviant, stop)
            }
            Task::Asynchronous { delays, tones } => {
                let (min, max) = (delays[0], delays[1]);
                runner.asynchronous((min, max), tones.target, tones.deviant, stop)
            }
            Task::SynchronousRespiration { stream, tones } => {
                let rate = stream.rate.unwrap_or(0.25);
                let (_producer, inlet) =
                    self.open_stream(stream, Waveform::Respiration { rate_hz: rate })?;
                runner.synchronous_respiration(
                    inlet,
                    &stream.ch_name,
                    tones.target,
                    tones.deviant,
                    stop,
                )
            }
            Task::SynchronousCardiac {
                stream,
                delay,
                tones,
            } => {
                let bpm = stream.rate.unwrap_or(60.0);
                let (_producer, inlet) = self.open_stream(stream, Waveform::Ecg { bpm })?;
                runner.synchronous_cardiac(
                    inlet,
                    &stream.ch_name,
                    *delay,
                    tones.target,
                    tones.deviant,
                    stop,
                )
            }
        }
    }

    fn open_stream(
        &self,
        args: &StreamArgs,
        waveform: Waveform,
    ) -> Result<(SimulatedStream, StreamInlet), TaskError> {
        if !args.simulate {
            return Err(TaskError::StreamDisconnected(format!(
                "{} (no acquisition transport built in, run with --simulate)",
                args.stream
            )));
        }
        let seed = self.config.seed.unwrap_or(0);
        Ok(SimulatedStream::spawn(
            &args.stream,
            args.sample_rate,
            vec![SimulatedChannel::new(&args.ch_name, waveform).with_noise(0.02)],
            self.clock,
            self.config.stream_buffer,
            seed,
        ))
    }
}
