// =============================================================================
// Candle Signal Engine — Main Entry Point
// =============================================================================

mod aggregator;
mod bar_store;
mod config;
mod dedup;
mod dispatch;
mod engine;
mod exchange;
mod logsink;
mod signal;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::aggregator::finalizer::SequenceCounter;
use crate::aggregator::AggregatorHub;
use crate::config::Config;
use crate::dispatch::ChangeDispatcher;
use crate::engine::{require_nonempty_symbols, Driver};
use crate::exchange::{partition_symbols, run_connection_group, StaticSymbolDiscovery, SymbolDiscovery};
use crate::logsink::{CandleRow, LogEvent, LogPaths};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("candle signal engine starting up");

    let mut config = Config::load("engine_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        Config::default()
    });
    config.apply_env_overrides();

    let discovery = StaticSymbolDiscovery::new(config.symbols.clone());
    let discovered = discovery.discover().await?;
    if !discovered.is_empty() {
        config.symbols = discovered;
    }

    require_nonempty_symbols(&config)?;

    info!(symbols = ?config.symbols, "engine configured");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let (log_tx, log_rx) = crate::logsink::channel();
    let log_paths = LogPaths {
        system_events: PathBuf::from("system_events.ndjson"),
        signal_changes: PathBuf::from("signal_changes.ndjson"),
        finalized_bars: PathBuf::from("finalized_bars.ndjson"),
    };
    let log_writer_handle = tokio::spawn(crate::logsink::run(log_rx, log_paths));

    let sequence = Arc::new(SequenceCounter::new());
    let now_ms = crate::aggregator::finalizer::wall_clock_ms();
    let hub = Arc::new(AggregatorHub::new(
        &config.symbols,
        config.bar_ms,
        config.window_max,
        config.dedup_soft_cap,
        config.dedup_ttl_ms,
        now_ms,
    ));

    let bar_log_tx = log_tx.clone();
    let bar_sequence = sequence.clone();
    let on_bar: Arc<crate::aggregator::finalizer::BarSink> = Arc::new(move |symbol: &str, bar: crate::types::Bar| {
        let event = LogEvent::BarFinalized {
            sequence: bar_sequence.next(),
            timestamp: bar.timestamp_ms,
            coin: symbol.to_string(),
            candle_data: CandleRow::from(bar),
        };
        if bar_log_tx.try_send(event).is_err() {
            warn!(symbol, "log queue full, dropping bar-finalized event");
        }
    });

    let finalizer_hub = hub.clone();
    let finalizer_sequence = sequence.clone();
    let finalizer_shutdown = shutdown_rx.clone();
    let finalizer_handle = tokio::spawn(crate::aggregator::finalizer::run(finalizer_hub, finalizer_sequence, on_bar, finalizer_shutdown));

    let groups = partition_symbols(&config.symbols, config.symbol_cap);
    info!(groups = groups.len(), "partitioned symbols into connection groups");
    let mut connection_handles = Vec::new();
    for group in groups {
        let group_hub = hub.clone();
        let group_shutdown = shutdown_rx.clone();
        let host = config.host.clone();
        connection_handles.push(tokio::spawn(async move {
            run_connection_group(&host, group, group_hub, group_shutdown).await;
        }));
    }

    let dispatcher = Arc::new(ChangeDispatcher::new(
        config.strategy_names.clone(),
        config.endpoints.clone(),
        sequence.clone(),
        log_tx.clone(),
    ));

    let driver = Arc::new(Driver::new(hub.clone(), dispatcher, config.exclusion_timeout_secs, log_tx.clone(), sequence.clone()));
    let driver_shutdown = shutdown_rx.clone();
    let driver_interval_ms = config.driver_interval_ms;
    let driver_handle = tokio::spawn(async move {
        driver.run(driver_interval_ms, driver_shutdown).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, draining tasks");
    let _ = shutdown_tx.send(true);
    drop(log_tx);

    let _ = finalizer_handle.await;
    let _ = driver_handle.await;
    for handle in connection_handles {
        let _ = handle.await;
    }
    if let Err(e) = log_writer_handle.await {
        error!(error = %e, "log writer task panicked");
    }

    info!("candle signal engine shut down cleanly");
    Ok(())
}
