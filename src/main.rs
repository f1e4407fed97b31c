use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod config;
mod error;
mod latch;
mod orchestrator;
mod phase;
mod sink;
mod stats;
mod worker;

#[cfg(test)]
mod testing;

use config::Cli;
use orchestrator::{report_progress, Orchestrator};
use phase::Phase;
use sink::HttpSink;
use stats::RunStats;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(
        cli.run_config()
            .context("Failed to build run configuration")?,
    );

    // Print banner
    info!("════════════════════════════════════════════════════════════");
    info!("              PHASED LOAD GENERATOR");
    info!("════════════════════════════════════════════════════════════");
    info!("Client starting: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
    info!("Max Concurrency: {}", config.max_concurrency);
    info!("Iterations per Worker: {}", config.iterations);
    info!("GET:  {}", config.get_url);
    info!("POST: {}", config.post_url);
    match config.request_timeout {
        Some(timeout) => info!("Request Timeout: {}ms", timeout.as_millis()),
        None => info!("Request Timeout: none"),
    }
    for phase in Phase::ALL {
        info!(
            "  {:<9} {:>3}% -> {} workers",
            phase.name(),
            phase.percent(),
            phase.worker_count(config.max_concurrency)
        );
    }
    info!("════════════════════════════════════════════════════════════");

    let sink = Arc::new(
        HttpSink::new(config.request_timeout).context("Failed to initialize HTTP sink")?,
    );
    let stats = Arc::new(RunStats::new());

    // Run phases
    let orchestrator = Orchestrator::new(Arc::clone(&config), sink, Arc::clone(&stats));
    let progress = tokio::spawn(report_progress(
        orchestrator.state_rx(),
        stats,
        Duration::from_secs(5),
    ));
    let outcome = orchestrator.run().await;
    progress.abort();
    let report = outcome.context("Load test aborted")?;

    // Print summary
    report.render();
    if cli.json {
        println!("{}", report.to_json().context("Failed to serialize report")?);
    }

    info!("════════════════════════════════════════════════════════════");
    info!("                 LOAD TEST COMPLETE");
    info!("════════════════════════════════════════════════════════════");

    Ok(())
}
