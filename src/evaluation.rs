//! # Evaluation Pipeline
//!
//! Orchestrates one benchmark run end to end:
//!
//! 1. start the telemetry sampling task (when enabled),
//! 2. run the transcription job and capture its timing,
//! 3. stop the sampler once timing is captured, so telemetry coverage
//!    spans the whole job without racing its completion,
//! 4. score the hypothesis against the reference,
//! 5. append exactly one evaluation-log row.
//!
//! ## Failure policy
//! A transcription failure aborts the run before any row is written; a
//! missing reference or hypothesis file only skips metric computation,
//! and the run is still recorded with `N/A` accuracy columns. An empty
//! reference is an input error and aborts loudly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{BenchError, BenchResult};
use crate::metrics::{compute_metrics, AccuracyMetrics, MetricsOptions};
use crate::record::schema::{EvaluationRecord, TelemetryRecord};
use crate::record::{append_record, append_records};
use crate::telemetry::{TelemetrySample, TelemetrySampler};
use crate::transcription::{Transcriber, TranscriptionJob};

/// Per-invocation inputs, on top of [`AppConfig`].
#[derive(Debug, Clone)]
pub struct EvaluateRequest {
    pub input: PathBuf,
    pub reference_file: PathBuf,
    /// Overrides the runner's deterministic hypothesis path when the
    /// transcript was produced out of band.
    pub hypothesis_file: Option<PathBuf>,
    /// Sample host/GPU telemetry concurrently with the job.
    pub telemetry: bool,
}

/// What one run produced, beyond the appended log row.
#[derive(Debug)]
pub struct EvaluationReport {
    pub record: EvaluationRecord,
    pub metrics: Option<AccuracyMetrics>,
    pub log_path: PathBuf,
    pub telemetry_samples: usize,
}

/// Run one benchmark end to end and append its evaluation-log row.
pub async fn run_evaluation<T: Transcriber>(
    config: &AppConfig,
    transcriber: &T,
    request: &EvaluateRequest,
) -> BenchResult<EvaluationReport> {
    let job = TranscriptionJob {
        input: request.input.clone(),
        output_dir: config.paths.output_dir.clone(),
        model_dir: config.model.model_dir.clone(),
        model_name: config.model.model_name.clone(),
        language: config.model.language.clone(),
    };

    let telemetry_task = request.telemetry.then(|| spawn_host_sampler(config));

    // Run the job; the sampler is stopped before the error (if any)
    // propagates, so no task outlives the run.
    let outcome = transcriber.transcribe(&job).await;
    let samples = match telemetry_task {
        Some((stop, handle)) => {
            let _ = stop.send(true);
            match handle.await {
                Ok(samples) => samples,
                Err(e) => {
                    warn!(error = %e, "telemetry sampler task failed, its samples are lost");
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            if !samples.is_empty() {
                warn!(
                    samples = samples.len(),
                    "transcription failed, discarding telemetry collected for the aborted run"
                );
            }
            return Err(e);
        }
    };

    if let Some(cpu_secs) = outcome.timing.processor_time_secs {
        info!(
            processor_time_secs = format!("{cpu_secs:.3}"),
            wall_secs = format!("{:.3}", outcome.timing.duration_secs),
            "job timing captured"
        );
    }

    let run_label = run_label(&request.input);
    if !samples.is_empty() {
        let telemetry_log = config
            .telemetry_log_dir()
            .join("system_non_functional_metrics.csv");
        for sample in &samples {
            let rows = TelemetryRecord::from_sample(&run_label, sample, None);
            append_records(&telemetry_log, &rows)?;
        }
        let peak_gpu = samples
            .iter()
            .filter_map(TelemetrySample::max_gpu_utilization)
            .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |a| a.max(v))));
        info!(
            samples = samples.len(),
            peak_gpu_utilization = ?peak_gpu,
            log = %telemetry_log.display(),
            "telemetry recorded for run"
        );
    }

    let hypothesis_path = request
        .hypothesis_file
        .clone()
        .unwrap_or_else(|| outcome.hypothesis_path.clone());
    let options = MetricsOptions {
        normalize: config.metrics.normalize,
    };
    let metrics = evaluate_accuracy(&request.reference_file, &hypothesis_path, &options)?;

    let record = EvaluationRecord::new(
        &config.model.name,
        &config.model.model_name,
        &config.model.model_dir.display().to_string(),
        &request.input.display().to_string(),
        &config.paths.output_dir.display().to_string(),
        &outcome.timing,
        metrics,
        &outcome.floating_point_mode.to_string(),
        &executed_command(config, request),
    );

    let log_path = config.paths.output_dir.join("evaluation_results.csv");
    append_record(&log_path, &record)?;
    info!(log = %log_path.display(), "evaluation recorded");

    Ok(EvaluationReport {
        record,
        metrics,
        log_path,
        telemetry_samples: samples.len(),
    })
}

/// Score the hypothesis against the reference.
///
/// A missing file on either side downgrades to `Ok(None)` with a
/// warning; the caller records sentinels. An empty reference is a real
/// error and propagates.
pub fn evaluate_accuracy(
    reference_path: &Path,
    hypothesis_path: &Path,
    options: &MetricsOptions,
) -> BenchResult<Option<AccuracyMetrics>> {
    let reference = match read_transcript(reference_path) {
        Ok(text) => text,
        Err(BenchError::MissingFile { path }) => {
            warn!(path = %path.display(), "reference file not found, skipping accuracy metrics");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    let hypothesis = match read_transcript(hypothesis_path) {
        Ok(text) => text,
        Err(BenchError::MissingFile { path }) => {
            warn!(path = %path.display(), "hypothesis file not found, skipping accuracy metrics");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    compute_metrics(&reference, &hypothesis, options).map(Some)
}

fn read_transcript(path: &Path) -> BenchResult<String> {
    if !path.exists() {
        return Err(BenchError::missing_file(path));
    }
    std::fs::read_to_string(path).map_err(|e| BenchError::io("reading transcript", e))
}

/// Host sampling loop that runs alongside the job: one sample per
/// configured interval until told to stop.
fn spawn_host_sampler(
    config: &AppConfig,
) -> (
    watch::Sender<bool>,
    tokio::task::JoinHandle<Vec<TelemetrySample>>,
) {
    let sampler = TelemetrySampler::new(config.telemetry.clone());
    let interval = Duration::from_secs_f64(config.telemetry.sample_interval_secs);
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut samples = Vec::new();
        loop {
            tokio::select! {
                changed = stop_rx.changed() => {
                    // Closed channel counts as a stop; re-polling it
                    // would complete instantly and bypass the interval.
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {}
            }
            if stop_rx.has_changed().is_err() || *stop_rx.borrow() {
                break;
            }
            samples.push(sampler.sample().await);
        }
        samples
    });

    (stop_tx, handle)
}

/// Label telemetry rows produced by an evaluate run (the "container
/// name" column is a run label outside container contexts).
fn run_label(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map_or_else(|| "run".to_string(), |s| s.to_string_lossy().into_owned());
    format!("evaluate:{stem}")
}

/// The reproduction command recorded with each row.
fn executed_command(config: &AppConfig, request: &EvaluateRequest) -> String {
    format!(
        "whisper-bench evaluate --model-name {} --input {} --reference-file {} --language {}",
        config.model.model_name,
        request.input.display(),
        request.reference_file.display(),
        config.model.language
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::{
        FloatingPointMode, TimingRecord, TranscriptionOutcome,
    };
    use chrono::Local;

    /// Writes a canned transcript instead of calling a real model.
    struct FakeTranscriber {
        text: &'static str,
        delay: Duration,
    }

    impl FakeTranscriber {
        fn saying(text: &'static str) -> Self {
            Self {
                text,
                delay: Duration::ZERO,
            }
        }
    }

    impl Transcriber for FakeTranscriber {
        async fn transcribe(&self, job: &TranscriptionJob) -> BenchResult<TranscriptionOutcome> {
            tokio::time::sleep(self.delay).await;
            std::fs::create_dir_all(&job.output_dir)
                .map_err(|e| BenchError::io("creating output directory", e))?;
            let path = job.hypothesis_path();
            std::fs::write(&path, self.text)
                .map_err(|e| BenchError::io("writing hypothesis", e))?;
            let now = Local::now();
            Ok(TranscriptionOutcome {
                hypothesis_path: path,
                timing: TimingRecord {
                    started_at: now,
                    ended_at: now,
                    duration_secs: 0.05,
                    processor_time_secs: None,
                },
                floating_point_mode: FloatingPointMode::Fp32,
            })
        }
    }

    /// Always fails, like a model command exiting non-zero.
    struct BrokenTranscriber;

    impl Transcriber for BrokenTranscriber {
        async fn transcribe(&self, _job: &TranscriptionJob) -> BenchResult<TranscriptionOutcome> {
            Err(BenchError::external_tool("whisper", "exit status: 1"))
        }
    }

    fn test_setup(tag: &str) -> (AppConfig, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "whisper-bench-eval-{tag}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let mut config = AppConfig::default();
        config.paths.output_dir = dir.join("out");
        config.telemetry.output_dir = dir.join("metrics");
        config.telemetry.gpu_tool = "definitely-not-a-gpu-tool".to_string();
        config.telemetry.runtime = "definitely-not-a-container-runtime".to_string();
        (config, dir)
    }

    fn request(dir: &Path, reference: &Path) -> EvaluateRequest {
        EvaluateRequest {
            input: dir.join("harvard.wav"),
            reference_file: reference.to_path_buf(),
            hypothesis_file: None,
            telemetry: false,
        }
    }

    #[tokio::test]
    async fn perfect_transcript_scores_zero_error() {
        let (config, dir) = test_setup("perfect");
        let reference = dir.join("reference.txt");
        std::fs::write(&reference, "the quick brown fox\n").unwrap();

        let transcriber = FakeTranscriber::saying("the quick brown fox");
        let report = run_evaluation(&config, &transcriber, &request(&dir, &reference))
            .await
            .unwrap();

        let metrics = report.metrics.unwrap();
        assert_eq!(metrics.wer, 0.0);
        assert_eq!(metrics.wip, 1.0);

        let contents = std::fs::read_to_string(&report.log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2, "header plus one row");
        assert!(lines[1].contains("FP32"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_reference_records_sentinel_row() {
        let (config, dir) = test_setup("missing-ref");
        let transcriber = FakeTranscriber::saying("whatever");
        let report = run_evaluation(
            &config,
            &transcriber,
            &request(&dir, &dir.join("no-such-reference.txt")),
        )
        .await
        .unwrap();

        assert!(report.metrics.is_none());
        let contents = std::fs::read_to_string(&report.log_path).unwrap();
        assert!(contents.lines().nth(1).unwrap().contains("N/A"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn transcription_failure_aborts_without_a_row() {
        let (config, dir) = test_setup("broken");
        let reference = dir.join("reference.txt");
        std::fs::write(&reference, "some reference text").unwrap();

        let err = run_evaluation(&config, &BrokenTranscriber, &request(&dir, &reference))
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::ExternalTool { .. }));
        assert!(!config.paths.output_dir.join("evaluation_results.csv").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn empty_reference_fails_loudly() {
        let (config, dir) = test_setup("empty-ref");
        let reference = dir.join("reference.txt");
        std::fs::write(&reference, "   \n").unwrap();

        let transcriber = FakeTranscriber::saying("whatever");
        let err = run_evaluation(&config, &transcriber, &request(&dir, &reference))
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::InvalidInput(_)));

        std::fs::remove_dir_all(&dir).ok();
    }

    /// Dropping the stop sender must end the sampling loop rather than
    /// leaving `changed()` permanently ready, which would starve the
    /// ticker and collect samples without pause.
    #[tokio::test]
    async fn host_sampler_stops_when_stop_sender_is_dropped() {
        let (config, dir) = test_setup("dropped-sender");
        let (stop, handle) = spawn_host_sampler(&config);
        drop(stop);

        let samples = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sampler task must stop once the channel closes")
            .unwrap();
        assert!(samples.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    /// A failed transcription keeps both logs clean: the error
    /// propagates, collected telemetry is dropped, and no row of either
    /// kind is appended.
    #[tokio::test]
    async fn failed_run_keeps_telemetry_out_of_the_logs() {
        let (mut config, dir) = test_setup("broken-telemetry");
        config.telemetry.sample_interval_secs = 0.02;
        let reference = dir.join("reference.txt");
        std::fs::write(&reference, "some reference text").unwrap();

        let mut req = request(&dir, &reference);
        req.telemetry = true;
        let err = run_evaluation(&config, &BrokenTranscriber, &req)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::ExternalTool { .. }));
        assert!(!config
            .telemetry_log_dir()
            .join("system_non_functional_metrics.csv")
            .exists());
        assert!(!config.paths.output_dir.join("evaluation_results.csv").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn telemetry_task_is_stopped_and_counted() {
        let (mut config, dir) = test_setup("telemetry");
        config.telemetry.sample_interval_secs = 0.02;
        let reference = dir.join("reference.txt");
        std::fs::write(&reference, "hello world").unwrap();

        // Keep the job alive long enough for the sampler's first tick,
        // which fires immediately, to land a sample.
        let transcriber = FakeTranscriber {
            text: "hello world",
            delay: Duration::from_millis(150),
        };
        let mut req = request(&dir, &reference);
        req.telemetry = true;
        let report = run_evaluation(&config, &transcriber, &req).await.unwrap();

        assert!(report.telemetry_samples >= 1);
        let telemetry_log = config
            .telemetry_log_dir()
            .join("system_non_functional_metrics.csv");
        let contents = std::fs::read_to_string(&telemetry_log).unwrap();
        assert!(contents.contains("evaluate:harvard"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
