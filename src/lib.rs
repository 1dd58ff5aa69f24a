// Module declarations for the application's core components
pub mod config;    // Configuration management
pub mod error;     // Transport and protocol error types
pub mod options;   // Command line options parsing
pub mod prelude;   // Common imports and types
pub mod scheduler; // Periodic polling of configured inverters
pub mod steca;     // StecaGrid protocol client
pub mod utils;     // Value codecs and helpers

use crate::options::Options;
use crate::prelude::*;
use crate::scheduler::{PollStats, Reading, Scheduler};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Polls every enabled inverter until a shutdown signal arrives.
///
/// One `Scheduler` task per inverter; each owns its client so requests to
/// a device stay sequential.
pub async fn app(shutdown_tx: broadcast::Sender<()>, config: Config) -> Result<()> {
    let stats = Arc::new(Mutex::new(PollStats::default()));
    let mut shutdown_rx = shutdown_tx.subscribe();

    info!("Starting schedulers...");
    let mut handles = Vec::new();
    for inverter in config.enabled_inverters() {
        let alias = inverter.alias();
        let scheduler = Scheduler::new(inverter, stats.clone());
        let shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            if let Err(e) = scheduler.start(shutdown_rx).await {
                error!("{}: scheduler task failed: {}", alias, e);
            }
        });
        handles.push(handle);
    }
    info!("  {} schedulers started", handles.len());

    // Wait for shutdown signal
    let _ = shutdown_rx.recv().await;
    info!("Shutdown signal received, stopping schedulers...");

    for handle in handles {
        if let Err(e) = handle.await {
            error!("Error waiting for scheduler task: {}", e);
        }
    }

    if let Ok(stats) = stats.lock() {
        stats.print_summary();
    }

    info!("Application shutdown complete");
    Ok(())
}

/// Queries every configured request of every enabled inverter once.
pub async fn poll_once(config: &Config) -> Vec<Reading> {
    let stats = Arc::new(Mutex::new(PollStats::default()));
    let mut readings = Vec::new();

    for inverter in config.enabled_inverters() {
        let mut client = Inverter::from_config(&inverter);
        let scheduler = Scheduler::new(inverter, stats.clone());
        readings.extend(scheduler.poll_once(&mut client).await);
    }

    readings
}

/// Application entry point
pub async fn run(config: Config, options: Options) -> Result<()> {
    if options.once {
        for reading in poll_once(&config).await {
            println!("{}", serde_json::to_string(&reading)?);
        }
        return Ok(());
    }

    let (shutdown_tx, _) = broadcast::channel(1);

    // Set up signal handlers for graceful shutdown
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
        }
        let _ = shutdown_tx_clone.send(());
    });

    if let Some(runtime) = options.runtime {
        let shutdown_tx_clone = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(runtime)).await;
            info!("Runtime limit of {}s reached", runtime);
            let _ = shutdown_tx_clone.send(());
        });
    }

    app(shutdown_tx, config).await
}
