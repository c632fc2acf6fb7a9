// =============================================================================
// Engine — wires config, aggregator, signal evaluator, and dispatcher
// together behind the 300ms-cadence driver loop
// =============================================================================
//
// Grounded on the teacher's `main.rs` task layout (one `tokio::spawn` per
// subsystem, a fixed-cadence strategy loop) generalized from a 5s strategy
// loop driving order placement to a 300ms loop driving signal evaluation and
// dispatch.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

use crate::aggregator::finalizer::wall_clock_ms;
use crate::aggregator::AggregatorHub;
use crate::config::Config;
use crate::dispatch::ChangeDispatcher;
use crate::logsink::LogEvent;
use crate::signal::evaluate;

/// Driver loop state: tracks which symbols have been moved to the excluded
/// set (zero bars for more than `exclusion_timeout_secs` since first seen).
pub struct Driver {
    hub: Arc<AggregatorHub>,
    dispatcher: Arc<ChangeDispatcher>,
    excluded: Mutex<HashSet<String>>,
    exclusion_timeout_ms: i64,
    log_tx: tokio::sync::mpsc::Sender<LogEvent>,
    sequence: Arc<crate::aggregator::finalizer::SequenceCounter>,
}

impl Driver {
    pub fn new(
        hub: Arc<AggregatorHub>,
        dispatcher: Arc<ChangeDispatcher>,
        exclusion_timeout_secs: u64,
        log_tx: tokio::sync::mpsc::Sender<LogEvent>,
        sequence: Arc<crate::aggregator::finalizer::SequenceCounter>,
    ) -> Self {
        Self {
            hub,
            dispatcher,
            excluded: Mutex::new(HashSet::new()),
            exclusion_timeout_ms: exclusion_timeout_secs as i64 * 1000,
            log_tx,
            sequence,
        }
    }

    /// Run the driver loop forever at `interval_ms` cadence until shutdown
    /// is signaled.
    pub async fn run(&self, interval_ms: u64, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_millis(interval_ms));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("driver observed shutdown signal, exiting");
                        return;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        let now_ms = wall_clock_ms();

        for symbol in self.hub.symbols() {
            if self.excluded.lock().contains(symbol) {
                continue;
            }

            let Some(state) = self.hub.state(symbol) else { continue };

            let (bars, first_seen_ms) = {
                let inner = state.inner.lock();
                (inner.bars.snapshot(), state.first_seen_ms)
            };

            if bars.is_empty() {
                if now_ms - first_seen_ms > self.exclusion_timeout_ms {
                    self.excluded.lock().insert(symbol.to_string());
                    warn!(symbol, "excluding symbol: no bars produced within timeout");
                    let event = LogEvent::SystemEvent {
                        sequence: self.sequence.next(),
                        message: format!("excluding {symbol}: no bars within {}s", self.exclusion_timeout_ms / 1000),
                    };
                    let _ = self.log_tx.send(event).await;
                }
                continue;
            }

            let (signal, diagnostics) = evaluate(&bars);
            self.dispatcher.dispatch(symbol, signal, diagnostics).await;
        }
    }
}

/// Fatal startup check: an empty symbol set after discovery is a
/// configuration error, distinct from a missing config file (which falls
/// back to defaults).
pub fn require_nonempty_symbols(config: &Config) -> anyhow::Result<()> {
    if config.symbols.is_empty() {
        anyhow::bail!("no symbols to watch: discovery and config both returned an empty set");
    }
    Ok(())
}
