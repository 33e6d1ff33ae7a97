//! Canonical log schemas.
//!
//! One schema per log kind, stable across releases:
//! - [`EvaluationRecord`]: one row per benchmark run.
//! - [`TelemetryRecord`]: one row per GPU per poll (a single `N/A` row
//!   on GPU-less hosts, so the CPU figures are still captured).
//! - [`HostSnapshotRecord`]: one maxima row per gpu-log tick.
//! - [`ComparisonRecord`]: one row per transcript comparison.

use chrono::{DateTime, Local};

use crate::metrics::AccuracyMetrics;
use crate::record::{field_or_na, secs_or_na, CsvRecord, NA};
use crate::telemetry::TelemetrySample;
use crate::transcription::TimingRecord;

/// One benchmark run: metadata, timing, accuracy.
#[derive(Debug, Clone)]
pub struct EvaluationRecord {
    pub date: String,
    pub timestamp: String,
    pub model: String,
    pub model_name: String,
    pub model_dir: String,
    pub input_file: String,
    pub output_dir: String,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    /// `None` when metric computation was skipped (missing transcript)
    pub metrics: Option<AccuracyMetrics>,
    pub floating_point_format: String,
    pub executed_command: String,
}

impl EvaluationRecord {
    /// Assemble a row from run metadata and captured timing.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: &str,
        model_name: &str,
        model_dir: &str,
        input_file: &str,
        output_dir: &str,
        timing: &TimingRecord,
        metrics: Option<AccuracyMetrics>,
        floating_point_format: &str,
        executed_command: &str,
    ) -> Self {
        Self {
            date: timing.started_at.format("%Y-%m-%d").to_string(),
            timestamp: timing.started_at.format("%H%M%S").to_string(),
            model: model.to_string(),
            model_name: model_name.to_string(),
            model_dir: model_dir.to_string(),
            input_file: input_file.to_string(),
            output_dir: output_dir.to_string(),
            start_time: unix_seconds(&timing.started_at),
            end_time: unix_seconds(&timing.ended_at),
            duration: timing.duration_secs,
            metrics,
            floating_point_format: floating_point_format.to_string(),
            executed_command: executed_command.to_string(),
        }
    }
}

impl CsvRecord for EvaluationRecord {
    const HEADERS: &'static [&'static str] = &[
        "date",
        "timestamp",
        "model",
        "model_name",
        "model_dir",
        "input_file",
        "output_dir",
        "start_time",
        "end_time",
        "duration",
        "wer",
        "mer",
        "wil",
        "wip",
        "cer",
        "floating_point_format",
        "executed_command",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.timestamp.clone(),
            self.model.clone(),
            self.model_name.clone(),
            self.model_dir.clone(),
            self.input_file.clone(),
            self.output_dir.clone(),
            format!("{:.3}", self.start_time),
            format!("{:.3}", self.end_time),
            format!("{:.3}", self.duration),
            field_or_na(self.metrics.map(|m| m.wer)),
            field_or_na(self.metrics.map(|m| m.mer)),
            field_or_na(self.metrics.map(|m| m.wil)),
            field_or_na(self.metrics.map(|m| m.wip)),
            field_or_na(self.metrics.map(|m| m.cer)),
            self.floating_point_format.clone(),
            self.executed_command.clone(),
        ]
    }
}

/// Container lifecycle timings captured by the monitor.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleTimings {
    pub startup_secs: f64,
    pub task_secs: f64,
    pub shutdown_secs: f64,
}

impl LifecycleTimings {
    pub fn total_secs(&self) -> f64 {
        self.startup_secs + self.task_secs + self.shutdown_secs
    }
}

/// One telemetry row: host figures plus one GPU's figures.
#[derive(Debug, Clone)]
pub struct TelemetryRecord {
    pub date: String,
    pub timestamp: String,
    pub container_name: String,
    pub cpu_name: String,
    pub cpu_core_count: usize,
    pub cpu_usage_pct: f64,
    pub memory_used_mb: f64,
    pub gpu_index: Option<u32>,
    pub gpu_name: Option<String>,
    pub gpu_count: usize,
    pub gpu_usage_pct: Option<f64>,
    pub gpu_temperature_c: Option<f64>,
    pub gpu_power_pct: Option<f64>,
    pub gpu_vram_pct: Option<f64>,
    pub timings: Option<LifecycleTimings>,
}

impl TelemetryRecord {
    /// Expand one sample into rows: one per GPU, or a single row with
    /// `N/A` GPU fields when no GPU is visible.
    pub fn from_sample(
        container_name: &str,
        sample: &TelemetrySample,
        timings: Option<LifecycleTimings>,
    ) -> Vec<Self> {
        let base = Self {
            date: sample.taken_at.format("%Y-%m-%d").to_string(),
            timestamp: sample.taken_at.format("%H:%M:%S").to_string(),
            container_name: container_name.to_string(),
            cpu_name: sample.cpu.model_name.clone(),
            cpu_core_count: sample.cpu.physical_cores,
            cpu_usage_pct: sample.cpu.utilization_pct,
            memory_used_mb: sample.cpu.memory_used_mb,
            gpu_index: None,
            gpu_name: None,
            gpu_count: sample.gpus.len(),
            gpu_usage_pct: None,
            gpu_temperature_c: None,
            gpu_power_pct: None,
            gpu_vram_pct: None,
            timings,
        };

        if sample.gpus.is_empty() {
            return vec![base];
        }

        sample
            .gpus
            .iter()
            .map(|gpu| Self {
                gpu_index: Some(gpu.index),
                gpu_name: Some(gpu.name.clone()),
                gpu_usage_pct: Some(gpu.utilization_pct),
                gpu_temperature_c: Some(gpu.temperature_c),
                gpu_power_pct: Some(gpu.power_pct),
                gpu_vram_pct: Some(gpu.vram_pct),
                ..base.clone()
            })
            .collect()
    }
}

impl CsvRecord for TelemetryRecord {
    const HEADERS: &'static [&'static str] = &[
        "date",
        "timestamp",
        "container name",
        "cpu name",
        "cpu core count",
        "cpu max usage (%)",
        "memory usage (MB)",
        "gpu index",
        "gpu name",
        "gpu count",
        "gpu max usage (%)",
        "gpu temperature (C)",
        "gpu pwr:usage/cap (%)",
        "gpu vram usage (%)",
        "startup time (s)",
        "task time (s)",
        "shutdown time (s)",
        "total time (s)",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.timestamp.clone(),
            self.container_name.clone(),
            self.cpu_name.clone(),
            self.cpu_core_count.to_string(),
            format!("{:.2}", self.cpu_usage_pct),
            format!("{:.2}", self.memory_used_mb),
            field_or_na(self.gpu_index),
            self.gpu_name.clone().unwrap_or_else(|| NA.to_string()),
            self.gpu_count.to_string(),
            field_or_na(self.gpu_usage_pct),
            field_or_na(self.gpu_temperature_c),
            field_or_na(self.gpu_power_pct),
            field_or_na(self.gpu_vram_pct),
            secs_or_na(self.timings.map(|t| t.startup_secs)),
            secs_or_na(self.timings.map(|t| t.task_secs)),
            secs_or_na(self.timings.map(|t| t.shutdown_secs)),
            secs_or_na(self.timings.map(|t| t.total_secs())),
        ]
    }
}

/// One host/GPU maxima snapshot, as appended by the gpu-log daemon.
#[derive(Debug, Clone)]
pub struct HostSnapshotRecord {
    pub date: String,
    pub timestamp: String,
    pub pod_name: String,
    pub processor_name: String,
    pub unit_count: usize,
    pub max_usage_pct: f64,
    pub max_gpu_temperature_c: Option<f64>,
    pub max_power_pct: Option<f64>,
    pub max_vram_pct: Option<f64>,
}

impl HostSnapshotRecord {
    /// Reduce one sample to a single row. With GPUs present the row
    /// carries per-GPU maxima; otherwise it falls back to the CPU
    /// figures and sentinels the GPU columns.
    pub fn from_sample(pod_name: &str, sample: &TelemetrySample) -> Self {
        let date = sample.taken_at.format("%Y-%m-%d").to_string();
        let timestamp = sample.taken_at.format("%H%M%S").to_string();

        if sample.gpus.is_empty() {
            return Self {
                date,
                timestamp,
                pod_name: pod_name.to_string(),
                processor_name: sample.cpu.model_name.clone(),
                unit_count: sample.cpu.physical_cores,
                max_usage_pct: sample.cpu.utilization_pct,
                max_gpu_temperature_c: None,
                max_power_pct: None,
                max_vram_pct: None,
            };
        }

        let max_of = |f: fn(&crate::telemetry::GpuSample) -> f64| {
            sample
                .gpus
                .iter()
                .map(f)
                .fold(f64::MIN, f64::max)
        };

        Self {
            date,
            timestamp,
            pod_name: pod_name.to_string(),
            processor_name: sample.gpus[0].name.clone(),
            unit_count: sample.gpus.len(),
            max_usage_pct: max_of(|g| g.utilization_pct),
            max_gpu_temperature_c: Some(max_of(|g| g.temperature_c)),
            max_power_pct: Some(max_of(|g| g.power_pct)),
            max_vram_pct: Some(max_of(|g| g.vram_pct)),
        }
    }
}

impl CsvRecord for HostSnapshotRecord {
    const HEADERS: &'static [&'static str] = &[
        "date",
        "timestamp",
        "pod name",
        "processor/gpu name",
        "core/gpu count",
        "max usage (%)",
        "max gpu temperature (C)",
        "max pwr:usage/cap (%)",
        "max vram usage (%)",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.date.clone(),
            self.timestamp.clone(),
            self.pod_name.clone(),
            self.processor_name.clone(),
            self.unit_count.to_string(),
            format!("{:.2}", self.max_usage_pct),
            field_or_na(self.max_gpu_temperature_c),
            field_or_na(self.max_power_pct),
            field_or_na(self.max_vram_pct),
        ]
    }
}

/// One transcript comparison, as appended by the compare command.
#[derive(Debug, Clone)]
pub struct ComparisonRecord {
    pub hypothesis_file: String,
    pub metrics: AccuracyMetrics,
}

impl CsvRecord for ComparisonRecord {
    const HEADERS: &'static [&'static str] =
        &["Hypothesis File", "WER", "MER", "WIL", "WIP", "CER"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.hypothesis_file.clone(),
            self.metrics.wer.to_string(),
            self.metrics.mer.to_string(),
            self.metrics.wil.to_string(),
            self.metrics.wip.to_string(),
            self.metrics.cer.to_string(),
        ]
    }
}

fn unix_seconds(at: &DateTime<Local>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{CpuSample, GpuSample};
    use chrono::TimeZone;

    fn sample_with_gpus(gpus: Vec<GpuSample>) -> TelemetrySample {
        TelemetrySample {
            taken_at: Local.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap(),
            cpu: CpuSample {
                model_name: "Test CPU".to_string(),
                logical_cores: 8,
                physical_cores: 4,
                utilization_pct: 12.5,
                memory_used_mb: 2048.0,
            },
            gpus,
        }
    }

    fn gpu(index: u32, util: f64, temp: f64) -> GpuSample {
        GpuSample {
            index,
            name: format!("GPU-{index}"),
            utilization_pct: util,
            temperature_c: temp,
            power_pct: 50.0,
            vram_pct: 25.0,
        }
    }

    #[test]
    fn one_telemetry_row_per_gpu() {
        let sample = sample_with_gpus(vec![gpu(0, 80.0, 60.0), gpu(1, 40.0, 55.0)]);
        let rows = TelemetryRecord::from_sample("whisper-base", &sample, None);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].gpu_index, Some(0));
        assert_eq!(rows[1].gpu_index, Some(1));
        assert_eq!(rows[0].gpu_count, 2);
        // CPU figures repeat on every row.
        assert_eq!(rows[1].cpu_name, "Test CPU");
        for row in &rows {
            assert_eq!(row.fields().len(), TelemetryRecord::HEADERS.len());
        }
    }

    #[test]
    fn gpuless_sample_still_produces_one_row() {
        let sample = sample_with_gpus(Vec::new());
        let rows = TelemetryRecord::from_sample("whisper-base", &sample, None);
        assert_eq!(rows.len(), 1);
        let fields = rows[0].fields();
        // gpu index and gpu name columns carry the sentinel
        assert_eq!(fields[7], NA);
        assert_eq!(fields[8], NA);
        // timing columns too, since none were supplied
        assert_eq!(fields[14], NA);
    }

    #[test]
    fn snapshot_takes_maxima_across_gpus() {
        let sample = sample_with_gpus(vec![gpu(0, 80.0, 60.0), gpu(1, 40.0, 71.0)]);
        let snapshot = HostSnapshotRecord::from_sample("whisper-tiny", &sample);
        assert_eq!(snapshot.unit_count, 2);
        assert_eq!(snapshot.max_usage_pct, 80.0);
        assert_eq!(snapshot.max_gpu_temperature_c, Some(71.0));
    }

    #[test]
    fn snapshot_falls_back_to_cpu_without_gpus() {
        let sample = sample_with_gpus(Vec::new());
        let snapshot = HostSnapshotRecord::from_sample("No Pod", &sample);
        assert_eq!(snapshot.processor_name, "Test CPU");
        assert_eq!(snapshot.unit_count, 4);
        assert_eq!(snapshot.max_gpu_temperature_c, None);
        assert_eq!(snapshot.fields().len(), HostSnapshotRecord::HEADERS.len());
    }

    #[test]
    fn evaluation_fields_match_header_width() {
        let timing = TimingRecord {
            started_at: Local.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap(),
            ended_at: Local.with_ymd_and_hms(2025, 3, 14, 15, 10, 26).unwrap(),
            duration_secs: 60.0,
            processor_time_secs: Some(42.0),
        };
        let record = EvaluationRecord::new(
            "whisper",
            "tiny.en",
            "/tmp",
            "input-samples/harvard.wav",
            "/tmp",
            &timing,
            None,
            "FP32",
            "whisper-bench evaluate",
        );
        let fields = record.fields();
        assert_eq!(fields.len(), EvaluationRecord::HEADERS.len());
        assert_eq!(record.date, "2025-03-14");
        assert_eq!(record.timestamp, "150926");
        // skipped metrics are sentinels, not blanks
        assert_eq!(fields[10], NA);
        assert_eq!(fields[14], NA);
    }
}
