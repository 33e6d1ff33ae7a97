//! # Transcription
//!
//! Runs the external speech-to-text facility and captures timing around
//! it. The model itself is a black box behind the [`Transcriber`] trait:
//! audio path in, hypothesis text file out. The production implementation
//! ([`runner::CommandTranscriber`]) shells out to the configured whisper
//! executable; tests substitute a fake.

pub mod runner;

pub use runner::CommandTranscriber;

use std::path::PathBuf;

use chrono::{DateTime, Local};

use crate::error::BenchResult;

/// One transcription job's inputs.
#[derive(Debug, Clone)]
pub struct TranscriptionJob {
    /// Audio file to transcribe
    pub input: PathBuf,
    /// Directory the hypothesis text file is written under
    pub output_dir: PathBuf,
    /// Directory the model weights are stored/loaded from
    pub model_dir: PathBuf,
    /// Model size/variant ("tiny.en", "base", ...)
    pub model_name: String,
    /// ISO 639-1 language code
    pub language: String,
}

impl TranscriptionJob {
    /// Where the hypothesis lands: `<output_dir>/<input stem>.txt`.
    /// The path is deterministic so callers can find the transcript
    /// without parsing tool output.
    pub fn hypothesis_path(&self) -> PathBuf {
        let stem = self
            .input
            .file_stem()
            .map_or_else(|| "transcript".to_string(), |s| s.to_string_lossy().into_owned());
        self.output_dir.join(format!("{stem}.txt"))
    }
}

/// Wall-clock and processor timing for one job.
#[derive(Debug, Clone, Copy)]
pub struct TimingRecord {
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
    /// Wall-clock seconds
    pub duration_secs: f64,
    /// CPU-seconds consumed by the job, where the platform exposes them.
    /// Distinct from wall time: a multi-threaded job can consume more
    /// CPU-seconds than it spends on the clock.
    pub processor_time_secs: Option<f64>,
}

/// Numeric precision the model computes in, recorded per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatingPointMode {
    Fp16,
    Fp32,
}

impl std::fmt::Display for FloatingPointMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fp16 => write!(f, "FP16"),
            Self::Fp32 => write!(f, "FP32"),
        }
    }
}

/// Result of a successful transcription run.
#[derive(Debug, Clone)]
pub struct TranscriptionOutcome {
    pub hypothesis_path: PathBuf,
    pub timing: TimingRecord,
    pub floating_point_mode: FloatingPointMode,
}

/// The external speech-to-text capability.
pub trait Transcriber {
    fn transcribe(
        &self,
        job: &TranscriptionJob,
    ) -> impl std::future::Future<Output = BenchResult<TranscriptionOutcome>> + Send;
}
