//! # whisper-bench - Main Entry Point
//!
//! Benchmarking and evaluation harness for an external speech-to-text
//! command. Startup follows one fixed sequence:
//!
//! 1. **Load environment** (.env file, if present)
//! 2. **Set up logging** (tracing, RUST_LOG aware)
//! 3. **Parse the command line** (usage errors exit with code 1)
//! 4. **Load and validate configuration** (defaults, TOML file, WB_ env
//!    vars, then command-line overrides)
//! 5. **Dispatch** to the selected command
//!
//! ## Application Architecture:
//! - **config**: one configuration object threaded through everything
//! - **error**: the error taxonomy and propagation policy
//! - **command**: typed external-command invocation
//! - **metrics**: WER/MER/WIL/WIP/CER from one alignment
//! - **transcription**: the external model behind a trait seam
//! - **telemetry**: CPU/GPU/container sampling and the monitor daemons
//! - **record**: append-only CSV logs with fixed schemas
//! - **evaluation**: the run-score-record pipeline

mod cli;
mod command;
mod config;
mod error;
mod evaluation;
mod metrics;
mod record;
mod telemetry;
mod transcription;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use config::AppConfig;
use error::{BenchError, BenchResult};
use evaluation::{run_evaluation, EvaluateRequest};
use metrics::{compute_metrics, AccuracyMetrics, MetricsOptions};
use record::schema::ComparisonRecord;
use telemetry::monitor::{run_container_monitor, run_gpu_logger};
use transcription::CommandTranscriber;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    // clap exits 2 by default; the harness contract is exit code 1 for
    // usage errors.
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(1);
    });

    let config = AppConfig::load()?;
    info!("whisper-bench v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli, config).await {
        error!("{e}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli, mut config: AppConfig) -> BenchResult<()> {
    match cli.command {
        Command::Evaluate(args) => {
            args.apply(&mut config);
            config.validate()?;

            let transcriber = CommandTranscriber::new(&config.model, &config.telemetry.gpu_tool);
            let request = EvaluateRequest {
                input: args.input.clone(),
                reference_file: args.reference_file.clone(),
                hypothesis_file: args.hypothesis_file.clone(),
                telemetry: !args.no_telemetry,
            };

            let report = run_evaluation(&config, &transcriber, &request).await?;
            match report.metrics {
                Some(metrics) => print_metrics(&metrics),
                None => println!("Accuracy metrics skipped (transcript missing); run recorded."),
            }
            println!("Results appended to {}", report.log_path.display());
            Ok(())
        }

        Command::Compare(args) => {
            config.validate()?;
            let options = MetricsOptions {
                normalize: args.normalize || config.metrics.normalize,
            };
            let reference = read_required(&args.reference)?;
            let hypothesis = read_required(&args.hypothesis)?;
            let metrics = compute_metrics(&reference, &hypothesis, &options)?;

            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&metrics)
                        .map_err(|e| BenchError::invalid_input(e.to_string()))?
                );
            } else {
                print_metrics(&metrics);
            }

            if let Some(output_dir) = &args.output_dir {
                let record = ComparisonRecord {
                    hypothesis_file: args
                        .hypothesis
                        .file_name()
                        .map_or_else(String::new, |n| n.to_string_lossy().into_owned()),
                    metrics,
                };
                let path = output_dir.join("wer_results.csv");
                record::append_record(&path, &record)?;
                println!("Results appended to {}", path.display());
            }
            Ok(())
        }

        Command::Monitor(args) => {
            args.apply(&mut config);
            config.validate()?;
            let shutdown = spawn_shutdown_listener();
            run_container_monitor(&config, shutdown).await
        }

        Command::GpuLog(args) => {
            config.validate()?;
            let shutdown = spawn_shutdown_listener();
            run_gpu_logger(&config, Duration::from_secs_f64(args.interval), shutdown).await
        }
    }
}

/// Initialize tracing: RUST_LOG wins, otherwise a crate-scoped default.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper_bench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Flip a watch channel on Ctrl+C / SIGTERM so the daemons can stop
/// cleanly between ticks.
fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("installing SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received shutdown signal");
        }

        let _ = tx.send(true);
    });

    rx
}

fn read_required(path: &std::path::Path) -> BenchResult<String> {
    if !path.exists() {
        return Err(BenchError::missing_file(path));
    }
    std::fs::read_to_string(path).map_err(|e| BenchError::io("reading transcript", e))
}

fn print_metrics(metrics: &AccuracyMetrics) {
    println!("Word Error Rate (WER): {:.2}%", metrics.wer * 100.0);
    println!("Match Error Rate (MER): {:.2}%", metrics.mer * 100.0);
    println!("Word Information Lost (WIL): {:.2}%", metrics.wil * 100.0);
    println!(
        "Word Information Preserved (WIP): {:.2}%",
        metrics.wip * 100.0
    );
    println!("Character Error Rate (CER): {:.2}%", metrics.cer * 100.0);
}
