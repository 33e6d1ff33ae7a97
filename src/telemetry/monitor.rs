//! Standalone monitoring daemons.
//!
//! Two long-running variants of the sampler:
//!
//! - [`run_container_monitor`]: polls the container runtime for names
//!   matching the configured prefix, follows each new container with a
//!   telemetry watch until it exits, and appends one row per GPU per
//!   tick plus a closing row carrying the lifecycle timings.
//! - [`run_gpu_logger`]: appends one host/GPU maxima snapshot row per
//!   tick, forever.
//!
//! Both run until the shutdown signal flips (Ctrl+C in `main`). Each
//! polling tick is independent; a failed probe degrades to placeholder
//! values and the next tick starts fresh.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::BenchResult;
use crate::record::schema::{HostSnapshotRecord, LifecycleTimings, TelemetryRecord};
use crate::record::{append_record, append_records};
use crate::telemetry::{ContainerRuntime, TelemetrySampler};

/// Delay between detecting a container and the first sample, giving the
/// container process a moment to start its workload.
const STARTUP_BUFFER: Duration = Duration::from_millis(200);

/// Watch the runtime for containers matching `telemetry.container_prefix`
/// and record telemetry for each until it exits.
pub async fn run_container_monitor(
    config: &AppConfig,
    mut shutdown: watch::Receiver<bool>,
) -> BenchResult<()> {
    let sampler = TelemetrySampler::new(config.telemetry.clone());
    let runtime = ContainerRuntime::new(&config.telemetry.runtime);
    let log_path = config
        .telemetry_log_dir()
        .join("system_non_functional_metrics.csv");
    let prefix = &config.telemetry.container_prefix;
    let sample_interval = Duration::from_secs_f64(config.telemetry.sample_interval_secs);
    let scan_interval = Duration::from_secs_f64(config.telemetry.scan_interval_secs);

    info!(
        prefix,
        log = %log_path.display(),
        "polling running containers every {:?}",
        scan_interval
    );

    let mut seen: HashSet<String> = HashSet::new();
    let mut ticker = tokio::time::interval(scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                // Closed channel: the sender is gone, so re-polling it
                // would complete instantly and starve the ticker.
                if changed.is_err() {
                    info!("shutdown channel closed, container monitor stopping");
                    return Ok(());
                }
            }
            _ = ticker.tick() => {}
        }
        if shutdown.has_changed().is_err() || *shutdown.borrow() {
            info!("container monitor shutting down");
            return Ok(());
        }

        for container in runtime.running_with_prefix(prefix).await {
            if !seen.insert(container.clone()) {
                continue;
            }
            info!(container, "detected running container");
            track_container(
                &sampler,
                &container,
                &log_path,
                sample_interval,
                shutdown.clone(),
            )
            .await?;
        }
    }
}

/// Follow one container from detection to exit, appending telemetry rows.
async fn track_container(
    sampler: &TelemetrySampler,
    container: &str,
    log_path: &std::path::Path,
    sample_interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> BenchResult<()> {
    let detected = Instant::now();
    tokio::time::sleep(STARTUP_BUFFER).await;
    let startup_secs = detected.elapsed().as_secs_f64();

    let task_start = Instant::now();
    let mut stream = sampler.watch(container, sample_interval, shutdown.clone());
    let mut ticks = 0usize;
    while let Some(sample) = stream.next().await {
        let rows = TelemetryRecord::from_sample(container, &sample, None);
        append_records(log_path, &rows)?;
        ticks += 1;
    }
    let task_secs = task_start.elapsed().as_secs_f64();

    if *shutdown.borrow() {
        warn!(container, "monitor cancelled mid-watch, no closing row");
        return Ok(());
    }

    // Closing row: one last sample stamped with the lifecycle timings.
    let closing_start = Instant::now();
    let sample = sampler.sample().await;
    let timings = LifecycleTimings {
        startup_secs,
        task_secs,
        shutdown_secs: closing_start.elapsed().as_secs_f64(),
    };
    let rows = TelemetryRecord::from_sample(container, &sample, Some(timings));
    append_records(log_path, &rows)?;

    info!(
        container,
        ticks,
        task_secs = format!("{task_secs:.3}"),
        "container exited, telemetry recorded"
    );
    Ok(())
}

/// Append one host/GPU maxima snapshot per `interval`, until shutdown.
pub async fn run_gpu_logger(
    config: &AppConfig,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> BenchResult<()> {
    let sampler = TelemetrySampler::new(config.telemetry.clone());
    let runtime = ContainerRuntime::new(&config.telemetry.runtime);
    let log_path = config.telemetry_log_dir().join("pod_host_usage.csv");

    info!(log = %log_path.display(), "logging host/GPU snapshots every {:?}", interval);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    info!("shutdown channel closed, gpu logger stopping");
                    return Ok(());
                }
            }
            _ = ticker.tick() => {}
        }
        if shutdown.has_changed().is_err() || *shutdown.borrow() {
            info!("gpu logger shutting down");
            return Ok(());
        }

        let pod_name = runtime
            .running_containers()
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| "No Pod".to_string());
        let sample = sampler.sample().await;
        let snapshot = HostSnapshotRecord::from_sample(&pod_name, &sample);
        append_record(&log_path, &snapshot)?;
    }
}
