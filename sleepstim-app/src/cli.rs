use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Auditory oddball stimulation for sleep experiments.
#[derive(Parser, Debug)]
#[command(name = "sleepstim", author, version, about)]
pub struct Cli {
    /// Log filter, e.g. `debug` or `sleepstim_experiment=debug`. Defaults to
    /// RUST_LOG, then `info`.
    #[arg(long, global = true)]
    pub verbose: Option<String>,

    /// TOML file overriding the built-in settings.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Trigger output: `log`, or a device file receiving one byte per code.
    #[arg(long, global = true, default_value = "log")]
    pub trigger: String,

    /// How long a device trigger code is held before the line is reset to 0.
    #[arg(long, global = true, default_value_t = 5)]
    pub trigger_pulse_ms: u64,

    /// Write the task report as JSON to this file.
    #[arg(long, global = true)]
    pub report: Option<PathBuf>,

    /// Seed for sequence and interval generation.
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    #[command(subcommand)]
    pub task: Task,
}

#[derive(Subcommand, Debug)]
pub enum Task {
    /// Silent baseline framed by start and stop triggers.
    Baseline {
        /// Duration of the baseline in seconds.
        #[arg(long)]
        duration: f64,
    },
    /// Oddball sequence at a fixed inter-stimulus interval.
    Isochronous {
        /// Delay between two stimuli in seconds.
        #[arg(long)]
        delay: f64,
        #[command(flatten)]
        tones: Tones,
    },
    /// Oddball sequence with random inter-stimulus intervals.
    Asynchronous {
        /// Minimum and maximum delay between two stimuli in seconds.
        #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], default_values_t = [0.5, 1.5])]
        delays: Vec<f64>,
        #[command(flatten)]
        tones: Tones,
    },
    /// Oddball sequence locked to inhalation peaks.
    SynchronousRespiration {
        #[command(flatten)]
        stream: StreamArgs,
        #[command(flatten)]
        tones: Tones,
    },
    /// Oddball sequence locked to R-peaks.
    SynchronousCardiac {
        #[command(flatten)]
        stream: StreamArgs,
        /// Delay between the R-peak and the stimulus in seconds.
        #[arg(long)]
        delay: f64,
        #[command(flatten)]
        tones: Tones,
    },
}

#[derive(Args, Debug, Clone, Copy)]
pub struct Tones {
    /// Target tone frequency in Hz.
    #[arg(long, default_value_t = 1000.0)]
    pub target: f64,
    /// Deviant tone frequency in Hz.
    #[arg(long, default_value_t = 2000.0)]
    pub deviant: f64,
}

#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// Name of the physiological stream.
    #[arg(long)]
    pub stream: String,
    /// Channel to lock on.
    #[arg(long = "ch-name")]
    pub ch_name: String,
    /// Feed the task from a synthetic stream instead of an acquisition
    /// device.
    #[arg(long)]
    pub simulate: bool,
    /// Sampling rate of the synthetic stream in Hz.
    #[arg(long, default_value_t = 250.0)]
    pub sample_rate: f64,
    /// Breathing rate (Hz) or heart rate (bpm) of the synthetic stream.
    #[arg(long)]
    pub rate: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_asynchronous_delays() {
        let cli = Cli::parse_from([
            "sleepstim",
            "--seed",
            "4",
            "asynchronous",
            "--delays",
            "0.8",
            "1.2",
            "--target",
            "500",
        ]);
        assert_eq!(cli.seed, Some(4));
        let Task::Asynchronous { delays, tones } = cli.task else {
            panic!("wrong subcommand");
        };
        assert_eq!(delays, [0.8, 1.2]);
        assert_eq!(tones.target, 500.0);
        assert_eq!(tones.deviant, 2000.0);
    }

    #[test]
    fn parses_cardiac_stream_options() {
        let cli = Cli::parse_from([
            "sleepstim",
            "synchronous-cardiac",
            "--stream",
            "psg",
            "--ch-name",
            "ECG",
            "--delay",
            "0.3",
            "--simulate",
            "--verbose",
            "debug",
        ]);
        assert_eq!(cli.verbose.as_deref(), Some("debug"));
        let Task::SynchronousCardiac { stream, delay, .. } = cli.task else {
            panic!("wrong subcommand");
        };
        assert_eq!(stream.ch_name, "ECG");
        assert!(stream.simulate);
        assert_eq!(delay, 0.3);
    }

    #[test]
    fn missing_required_option_is_an_error() {
        assert!(Cli::try_parse_from(["sleepstim", "isochronous"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
