//! # Telemetry Sampler
//!
//! Combines the CPU, memory, and GPU probes into point-in-time samples
//! and exposes a container-gated polling stream.
//!
//! ## Concurrency shape
//! `watch` spawns one tokio task that polls on a fixed interval and
//! sends samples through a bounded channel; the caller consumes them as
//! a `Stream`. The task stops, without emitting further samples, as
//! soon as either the watched container is no longer running or the
//! shutdown signal flips. Dropping the stream also stops the task on
//! its next send.

use std::time::Duration;

use chrono::Local;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::config::TelemetryConfig;
use crate::telemetry::{container::ContainerRuntime, cpu, gpu, TelemetrySample};

/// Window over which each sample measures CPU utilization.
const CPU_SAMPLE_WINDOW: Duration = Duration::from_millis(100);

/// Pull-based host/GPU sampler.
#[derive(Debug, Clone)]
pub struct TelemetrySampler {
    config: TelemetryConfig,
}

impl TelemetrySampler {
    pub fn new(config: TelemetryConfig) -> Self {
        Self { config }
    }

    /// Take one sample. Never fails: every probe degrades to
    /// placeholder values on its own.
    pub async fn sample(&self) -> TelemetrySample {
        let cpu = cpu::sample_cpu(CPU_SAMPLE_WINDOW).await;
        let gpus = gpu::query_gpus(&self.config.gpu_tool).await;

        TelemetrySample {
            taken_at: Local::now(),
            cpu,
            gpus,
        }
    }

    /// Poll every `interval` for as long as `container_name` is running.
    ///
    /// The stream ends when the container disappears from the runtime or
    /// when `shutdown` is flipped to `true`. A dropped shutdown sender
    /// also ends the stream; cancellation is observed
    /// before the next sample is taken, so nothing is emitted after it.
    /// A new watch can be started for the same or another container at
    /// any time.
    pub fn watch(
        &self,
        container_name: impl Into<String>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> ReceiverStream<TelemetrySample> {
        let (tx, rx) = mpsc::channel(16);
        let sampler = self.clone();
        let container = container_name.into();

        tokio::spawn(async move {
            let runtime = ContainerRuntime::new(&sampler.config.runtime);
            let mut shutdown = shutdown;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        // A closed channel means the sender is gone for
                        // good; waiting on it again would resolve
                        // immediately and bypass the interval.
                        if changed.is_err() {
                            debug!(container, "shutdown channel closed, telemetry watch ends");
                            break;
                        }
                    }
                    _ = ticker.tick() => {}
                }
                if shutdown.has_changed().is_err() || *shutdown.borrow() {
                    debug!(container, "telemetry watch cancelled");
                    break;
                }
                if !runtime.is_running(&container).await {
                    info!(container, "container no longer running, telemetry watch ends");
                    break;
                }
                let sample = sampler.sample().await;
                if tx.send(sample).await.is_err() {
                    // Consumer went away.
                    break;
                }
            }
        });

        ReceiverStream::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn test_config() -> TelemetryConfig {
        TelemetryConfig {
            runtime: "definitely-not-a-container-runtime".to_string(),
            container_prefix: "whisper-".to_string(),
            gpu_tool: "definitely-not-a-gpu-tool".to_string(),
            sample_interval_secs: 0.05,
            scan_interval_secs: 0.05,
            output_dir: std::path::PathBuf::from("/tmp"),
            instance: "test".to_string(),
            flavor: "test".to_string(),
        }
    }

    /// A host with neither GPU tool nor container runtime still samples:
    /// CPU fields populated, GPU list empty, no error.
    #[tokio::test]
    async fn sample_degrades_without_gpu_tool() {
        let sampler = TelemetrySampler::new(test_config());
        let sample = sampler.sample().await;
        assert!(sample.gpus.is_empty());
        assert!(sample.max_gpu_utilization().is_none());
        assert!(!sample.cpu.model_name.is_empty());
    }

    /// With the runtime reporting nothing running, the watch stream ends
    /// without emitting a sample.
    #[tokio::test]
    async fn watch_ends_when_container_is_not_running() {
        let sampler = TelemetrySampler::new(test_config());
        let (_tx, rx) = watch::channel(false);
        let mut stream = sampler.watch("whisper-tiny", Duration::from_millis(10), rx);
        assert!(stream.next().await.is_none());
    }

    /// A dropped shutdown sender ends the watch instead of turning
    /// `changed()` into an always-ready future that starves the ticker
    /// and samples without pause.
    #[tokio::test]
    async fn watch_ends_when_shutdown_sender_is_dropped() {
        // `echo` prints its arguments back, so this "runtime" reports
        // one permanently running container named after the ps query.
        let mut config = test_config();
        config.runtime = "echo".to_string();
        let sampler = TelemetrySampler::new(config);

        let (tx, rx) = watch::channel(false);
        drop(tx);
        let mut stream = sampler.watch("ps --format {{.Names}}", Duration::from_secs(10), rx);
        assert!(stream.next().await.is_none());
    }

    /// A shutdown observed before the first tick suppresses all samples.
    #[tokio::test]
    async fn watch_emits_nothing_after_cancellation() {
        let sampler = TelemetrySampler::new(test_config());
        let (tx, rx) = watch::channel(false);
        tx.send(true).expect("receiver alive");
        let mut stream = sampler.watch("whisper-tiny", Duration::from_millis(10), rx);
        assert!(stream.next().await.is_none());
    }
}
