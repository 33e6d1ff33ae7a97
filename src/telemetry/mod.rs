//! # Telemetry
//!
//! Host, GPU, and container resource sampling. The sampler is pull-based:
//! every call to [`TelemetrySampler::sample`] produces one point-in-time
//! [`TelemetrySample`]; [`TelemetrySampler::watch`] turns that into a
//! fixed-interval stream tied to a container's lifetime.
//!
//! All collaborators here are optional equipment. A machine without
//! nvidia-smi, or without a container runtime, yields samples with empty
//! GPU lists and "not running" container answers, never errors.

pub mod container;
pub mod cpu;
pub mod gpu;
pub mod monitor;
pub mod sampler;

pub use container::ContainerRuntime;
pub use gpu::GpuSample;
pub use sampler::TelemetrySampler;

use chrono::{DateTime, Local};

/// Host CPU and memory figures for one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuSample {
    /// CPU model string ("AMD EPYC 7763 64-Core Processor")
    pub model_name: String,
    /// Logical processor count
    pub logical_cores: usize,
    /// Physical core count
    pub physical_cores: usize,
    /// Whole-machine CPU utilization over the sample window, 0-100
    pub utilization_pct: f64,
    /// Resident memory in use, MB
    pub memory_used_mb: f64,
}

/// One point-in-time snapshot of host and GPU state.
#[derive(Debug, Clone)]
pub struct TelemetrySample {
    /// When the sample was taken
    pub taken_at: DateTime<Local>,
    pub cpu: CpuSample,
    /// One entry per physical GPU; empty when no GPU or no query tool
    pub gpus: Vec<GpuSample>,
}

impl TelemetrySample {
    /// Highest GPU utilization across all GPUs, if any.
    pub fn max_gpu_utilization(&self) -> Option<f64> {
        self.gpus
            .iter()
            .map(|g| g.utilization_pct)
            .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }
}
