//! Command-line argument parsing.
//!
//! Uses clap derive macros for type-safe argument parsing. Flags mirror
//! the configuration file: anything given on the command line overrides
//! the loaded [`AppConfig`] via the `apply` methods, so components only
//! ever see one configuration object.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;

/// whisper-bench: benchmark and evaluate speech-to-text runs
#[derive(Parser, Debug, Clone)]
#[command(name = "whisper-bench")]
#[command(version)]
#[command(about = "Benchmark an external speech-to-text command and score its output")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a transcription job, score it, and append an evaluation row
    Evaluate(EvaluateArgs),

    /// Score an existing hypothesis transcript against a reference
    Compare(CompareArgs),

    /// Watch the container runtime and record telemetry for matching containers
    Monitor(MonitorArgs),

    /// Periodically append host/GPU usage snapshots
    GpuLog(GpuLogArgs),
}

/// Arguments for the evaluate command
#[derive(Parser, Debug, Clone)]
pub struct EvaluateArgs {
    /// Audio file to transcribe
    #[arg(long, default_value = "input-samples/harvard.wav")]
    pub input: PathBuf,

    /// Ground-truth transcript to score against
    #[arg(long, default_value = "ground-truth/harvard.txt")]
    pub reference_file: PathBuf,

    /// Hypothesis transcript, when produced out of band (defaults to
    /// the runner's own output path)
    #[arg(long)]
    pub hypothesis_file: Option<PathBuf>,

    /// Transcription executable to invoke
    #[arg(long)]
    pub model: Option<String>,

    /// Model size/variant (tiny.en, base, small, medium, large)
    #[arg(long)]
    pub model_name: Option<String>,

    /// Directory for storing the model
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Directory for transcripts and the evaluation log
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Language for transcription
    #[arg(long)]
    pub language: Option<String>,

    /// Skip concurrent telemetry sampling
    #[arg(long)]
    pub no_telemetry: bool,

    /// Lowercase and strip punctuation before scoring
    #[arg(long)]
    pub normalize: bool,
}

impl EvaluateArgs {
    /// Fold command-line overrides into the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(model) = &self.model {
            config.model.executable = model.clone();
            config.model.name = model.clone();
        }
        if let Some(model_name) = &self.model_name {
            config.model.model_name = model_name.clone();
        }
        if let Some(model_dir) = &self.model_dir {
            config.model.model_dir = model_dir.clone();
        }
        if let Some(output_dir) = &self.output_dir {
            config.paths.output_dir = output_dir.clone();
        }
        if let Some(language) = &self.language {
            config.model.language = language.clone();
        }
        if self.normalize {
            config.metrics.normalize = true;
        }
    }
}

/// Arguments for the compare command
#[derive(Parser, Debug, Clone)]
pub struct CompareArgs {
    /// The ground-truth transcription
    pub reference: PathBuf,

    /// The transcription output to evaluate
    pub hypothesis: PathBuf,

    /// Also append a row to <output_dir>/wer_results.csv
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Print the metrics as JSON instead of key=value lines
    #[arg(long)]
    pub json: bool,

    /// Lowercase and strip punctuation before scoring
    #[arg(long)]
    pub normalize: bool,
}

/// Arguments for the monitor command
#[derive(Parser, Debug, Clone)]
pub struct MonitorArgs {
    /// Only containers whose name starts with this prefix are monitored
    #[arg(long)]
    pub prefix: Option<String>,

    /// Seconds between telemetry samples while a container runs
    #[arg(long)]
    pub interval: Option<f64>,

    /// Seconds between runtime scans while idle
    #[arg(long)]
    pub scan_interval: Option<f64>,
}

impl MonitorArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(prefix) = &self.prefix {
            config.telemetry.container_prefix = prefix.clone();
        }
        if let Some(interval) = self.interval {
            config.telemetry.sample_interval_secs = interval;
        }
        if let Some(scan_interval) = self.scan_interval {
            config.telemetry.scan_interval_secs = scan_interval;
        }
    }
}

/// Arguments for the gpu-log command
#[derive(Parser, Debug, Clone)]
pub struct GpuLogArgs {
    /// Seconds between snapshot rows
    #[arg(long, default_value_t = 10.0)]
    pub interval: f64,
}
