//! Command-backed transcription runner.
//!
//! Invokes the configured whisper executable with an argument vector,
//! times the call, and reports where the hypothesis file was written.
//! A non-zero exit is fatal to the run: the error carries the tool's
//! stderr and no accuracy computation happens afterwards.

use std::time::Instant;

use chrono::Local;
use tracing::info;

use crate::command::CommandSpec;
use crate::config::ModelConfig;
use crate::error::{BenchError, BenchResult};
use crate::telemetry::gpu;
use crate::transcription::{
    FloatingPointMode, Transcriber, TimingRecord, TranscriptionJob, TranscriptionOutcome,
};

/// Compute capability at which the model runs half precision.
const FP16_MIN_COMPUTE_CAP: f64 = 7.0;

/// Kernel tick rate for `/proc/self/stat` CPU counters.
const CLOCK_TICKS_PER_SEC: f64 = 100.0;

/// [`Transcriber`] backed by the external whisper command.
#[derive(Debug, Clone)]
pub struct CommandTranscriber {
    executable: String,
    gpu_tool: String,
}

impl CommandTranscriber {
    pub fn new(model: &ModelConfig, gpu_tool: impl Into<String>) -> Self {
        Self {
            executable: model.executable.clone(),
            gpu_tool: gpu_tool.into(),
        }
    }

    /// FP16 on GPUs with tensor-core class compute capability, FP32
    /// otherwise (including CPU-only hosts).
    async fn floating_point_mode(&self) -> FloatingPointMode {
        match gpu::max_compute_capability(&self.gpu_tool).await {
            Some(cap) if cap >= FP16_MIN_COMPUTE_CAP => FloatingPointMode::Fp16,
            _ => FloatingPointMode::Fp32,
        }
    }
}

impl Transcriber for CommandTranscriber {
    async fn transcribe(&self, job: &TranscriptionJob) -> BenchResult<TranscriptionOutcome> {
        std::fs::create_dir_all(&job.output_dir)
            .map_err(|e| BenchError::io("creating output directory", e))?;

        let spec = CommandSpec::new(&self.executable)
            .arg(job.input.display().to_string())
            .args(["--model", &job.model_name])
            .args(["--model_dir", &job.model_dir.display().to_string()])
            .args(["--output_dir", &job.output_dir.display().to_string()])
            .args(["--output_format", "txt"])
            .args(["--language", &job.language]);

        info!(
            input = %job.input.display(),
            model = %job.model_name,
            "starting transcription"
        );

        let started_at = Local::now();
        let wall_start = Instant::now();
        let cpu_before = children_cpu_seconds();

        let output = spec.run().await?;

        let ended_at = Local::now();
        let duration_secs = wall_start.elapsed().as_secs_f64();
        let processor_time_secs = match (cpu_before, children_cpu_seconds()) {
            (Some(before), Some(after)) => Some(after - before),
            _ => None,
        };

        if !output.success() {
            return Err(BenchError::external_tool(
                &self.executable,
                format!("{}: {}", output.status, output.stderr.trim()),
            ));
        }

        let timing = TimingRecord {
            started_at,
            ended_at,
            duration_secs,
            processor_time_secs,
        };

        info!(
            duration_secs = format!("{duration_secs:.3}"),
            "transcription completed"
        );

        Ok(TranscriptionOutcome {
            hypothesis_path: job.hypothesis_path(),
            timing,
            floating_point_mode: self.floating_point_mode().await,
        })
    }
}

/// CPU-seconds of reaped child processes, from `/proc/self/stat`
/// (cutime + cstime). The kernel folds a child's CPU time into these
/// counters when the parent waits on it, which is exactly when the
/// transcription command finishes. `None` off Linux or on parse failure.
fn children_cpu_seconds() -> Option<f64> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    parse_children_cpu_ticks(&stat).map(|ticks| ticks as f64 / CLOCK_TICKS_PER_SEC)
}

fn parse_children_cpu_ticks(stat: &str) -> Option<u64> {
    // The comm field is parenthesized and may contain spaces; fields
    // after the closing paren are whitespace separated. cutime and
    // cstime are fields 16 and 17 overall, so 14 and 15 counting from
    // the state field.
    let after_comm = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let cutime: u64 = fields.get(13)?.parse().ok()?;
    let cstime: u64 = fields.get(14)?.parse().ok()?;
    Some(cutime + cstime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job_in(dir: &std::path::Path) -> TranscriptionJob {
        TranscriptionJob {
            input: PathBuf::from("input-samples/harvard.wav"),
            output_dir: dir.to_path_buf(),
            model_dir: PathBuf::from("/tmp"),
            model_name: "tiny.en".to_string(),
            language: "en".to_string(),
        }
    }

    fn transcriber(executable: &str) -> CommandTranscriber {
        CommandTranscriber {
            executable: executable.to_string(),
            gpu_tool: "definitely-not-a-gpu-tool".to_string(),
        }
    }

    #[test]
    fn parses_children_cpu_ticks_from_stat() {
        // pid (comm) state ... utime=14 stime=15 cutime=16 cstime=17 ...
        let stat = "1234 (whisper bench) S 1 1234 1234 0 -1 4194304 100 200 0 0 \
                    50 25 300 400 20 0 4 0 100 0 0";
        assert_eq!(parse_children_cpu_ticks(stat), Some(700));
    }

    #[test]
    fn children_cpu_probe_does_not_panic() {
        // On Linux this returns Some; elsewhere None. Either is fine.
        let _ = children_cpu_seconds();
    }

    #[tokio::test]
    async fn failing_command_is_fatal_with_external_tool_error() {
        let dir = std::env::temp_dir().join(format!(
            "whisper-bench-runner-test-{}",
            std::process::id()
        ));
        let err = transcriber("false")
            .transcribe(&job_in(&dir))
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::ExternalTool { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_executable_is_an_external_tool_error() {
        let dir = std::env::temp_dir().join(format!(
            "whisper-bench-runner-missing-{}",
            std::process::id()
        ));
        let err = transcriber("definitely-not-a-transcriber")
            .transcribe(&job_in(&dir))
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::ExternalTool { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn successful_run_times_the_call_and_names_the_hypothesis() {
        let dir = std::env::temp_dir().join(format!(
            "whisper-bench-runner-ok-{}",
            std::process::id()
        ));
        // `true` accepts and ignores the whisper-style arguments.
        let outcome = transcriber("true").transcribe(&job_in(&dir)).await.unwrap();
        assert_eq!(outcome.hypothesis_path, dir.join("harvard.txt"));
        assert!(outcome.timing.duration_secs >= 0.0);
        assert!(outcome.timing.ended_at >= outcome.timing.started_at);
        // No GPU tool in tests, so the probe lands on FP32.
        assert_eq!(outcome.floating_point_mode, FloatingPointMode::Fp32);
        std::fs::remove_dir_all(&dir).ok();
    }
}
