//! # Configuration Management
//!
//! This module handles loading and managing harness configuration from
//! multiple sources:
//! - TOML configuration files (whisper-bench.toml)
//! - Environment variables (with WB_ prefix)
//! - Default values (built into the code)
//!
//! One `AppConfig` is constructed at process start and passed explicitly
//! into every component. Nothing in the harness reads configuration from
//! globals, so the same process can host several differently-configured
//! samplers or runners in tests.
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (WB_MODEL__EXECUTABLE, WB_TELEMETRY__RUNTIME, ...)
//! 2. Configuration file (whisper-bench.toml)
//! 3. Default values (defined in the Default impl)
//!
//! The `INSTANCE` and `FLAVOR` environment variables do not follow the
//! WB_ convention; they select the telemetry output directory segment
//! (`<telemetry.output_dir>/<INSTANCE>/<FLAVOR>/`) and are read here so
//! the rest of the code never touches the environment.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};

/// Main harness configuration that contains all settings.
///
/// Breaking configuration into logical groups (model, paths, telemetry,
/// metrics) keeps each component's knobs together and makes the TOML
/// file mirror the code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub paths: PathsConfig,
    pub telemetry: TelemetryConfig,
    pub metrics: MetricsConfig,
}

/// Settings for the external transcription command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Executable invoked for transcription (e.g. "whisper")
    pub executable: String,
    /// Model family identifier recorded in the evaluation log
    pub name: String,
    /// Model size/variant passed to the executable ("tiny.en", "base", ...)
    pub model_name: String,
    /// Directory the executable stores/loads model weights from
    pub model_dir: PathBuf,
    /// ISO 639-1 language code passed to the executable
    pub language: String,
}

/// Filesystem locations for run outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory where hypothesis transcripts and evaluation logs land
    pub output_dir: PathBuf,
}

/// Telemetry sampler and monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Container runtime CLI queried for running containers ("podman", "docker")
    pub runtime: String,
    /// Only containers whose name starts with this prefix are monitored
    pub container_prefix: String,
    /// GPU query tool invoked for per-GPU statistics
    pub gpu_tool: String,
    /// Seconds between telemetry samples while a container is watched
    pub sample_interval_secs: f64,
    /// Seconds between runtime scans when waiting for containers to appear
    pub scan_interval_secs: f64,
    /// Base directory for telemetry CSV logs (extended by INSTANCE/FLAVOR)
    pub output_dir: PathBuf,
    /// Instance segment of the telemetry output path (INSTANCE env var)
    pub instance: String,
    /// Flavor segment of the telemetry output path (FLAVOR env var)
    pub flavor: String,
}

/// Accuracy metric options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Lowercase and strip punctuation before tokenizing. Off by default:
    /// scores are then comparable with uncorrected whisper output, at the
    /// cost of counting "Hello" vs "hello" as a substitution.
    pub normalize: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig {
                executable: "whisper".to_string(),
                name: "whisper".to_string(),
                model_name: "tiny.en".to_string(),
                model_dir: PathBuf::from("/tmp"),
                language: "en".to_string(),
            },
            paths: PathsConfig {
                output_dir: PathBuf::from("/tmp"),
            },
            telemetry: TelemetryConfig {
                runtime: "podman".to_string(),
                container_prefix: "whisper-".to_string(),
                gpu_tool: "nvidia-smi".to_string(),
                sample_interval_secs: 10.0,
                scan_interval_secs: 0.1,
                output_dir: PathBuf::from("data/metrics"),
                instance: "unknown_instance".to_string(),
                flavor: "unknown_flavor".to_string(),
            },
            metrics: MetricsConfig { normalize: false },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `whisper-bench.toml`, and the
    /// environment, in that priority order.
    ///
    /// `INSTANCE` and `FLAVOR` are handled as explicit overrides because
    /// deployment scripts set them without the WB_ prefix.
    pub fn load() -> BenchResult<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("whisper-bench").required(false))
            .add_source(config::Environment::with_prefix("WB").separator("__"));

        if let Ok(instance) = env::var("INSTANCE") {
            settings = settings.set_override("telemetry.instance", instance)?;
        }

        if let Ok(flavor) = env::var("FLAVOR") {
            settings = settings.set_override("telemetry.flavor", flavor)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching bad values here gives one clear startup error instead of
    /// a confusing failure mid-run.
    pub fn validate(&self) -> BenchResult<()> {
        if self.model.executable.trim().is_empty() {
            return Err(BenchError::usage("model.executable cannot be empty"));
        }

        if self.telemetry.sample_interval_secs <= 0.0 {
            return Err(BenchError::usage(
                "telemetry.sample_interval_secs must be greater than 0",
            ));
        }

        if self.telemetry.scan_interval_secs <= 0.0 {
            return Err(BenchError::usage(
                "telemetry.scan_interval_secs must be greater than 0",
            ));
        }

        if self.telemetry.container_prefix.trim().is_empty() {
            return Err(BenchError::usage(
                "telemetry.container_prefix cannot be empty",
            ));
        }

        Ok(())
    }

    /// Directory telemetry CSV logs are written to:
    /// `<telemetry.output_dir>/<instance>/<flavor>/`.
    pub fn telemetry_log_dir(&self) -> PathBuf {
        self.telemetry
            .output_dir
            .join(&self.telemetry.instance)
            .join(&self.telemetry.flavor)
    }
}
