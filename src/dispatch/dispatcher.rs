// =============================================================================
// Change Dispatcher — per-symbol last-state memo, fires on signal transition
// =============================================================================
//
// The HTTP mechanics are grounded on the teacher's `binance/client.rs`
// (`reqwest::Client` built once, `Context`-wrapped errors) via
// `dispatch::endpoint::EndpointClient`; the retry loop is new code grounded
// in the teacher's reconnect-loop *shape* (`for attempt in 0..N { ... sleep
// ... }`), applied to HTTP instead of the websocket, since the teacher
// itself never retries an HTTP call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::aggregator::finalizer::SequenceCounter;
use crate::dispatch::endpoint::EndpointClient;
use crate::logsink::{DiagnosticsRow, LogEvent};
use crate::signal::Diagnostics;

const POST_PAUSE: Duration = Duration::from_millis(100);
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_PAUSE: Duration = Duration::from_secs(2);

pub struct ChangeDispatcher {
    client: EndpointClient,
    strategy_names: Vec<String>,
    endpoints: Vec<String>,
    last_signal: Mutex<HashMap<String, Option<bool>>>,
    sequence: Arc<SequenceCounter>,
    log_tx: Sender<LogEvent>,
}

impl ChangeDispatcher {
    pub fn new(strategy_names: Vec<String>, endpoints: Vec<String>, sequence: Arc<SequenceCounter>, log_tx: Sender<LogEvent>) -> Self {
        Self {
            client: EndpointClient::new(),
            strategy_names,
            endpoints,
            last_signal: Mutex::new(HashMap::new()),
            sequence,
            log_tx,
        }
    }

    /// Feed one symbol's evaluation result. Fires HTTP posts and log writes
    /// only on a state transition, per `spec.md` §4.6.
    pub async fn dispatch(&self, symbol: &str, signal: bool, diagnostics: Diagnostics) {
        let changed = {
            let mut last = self.last_signal.lock();
            let entry = last.entry(symbol.to_string()).or_insert(None);
            let changed = entry.is_none() || *entry != Some(signal);
            *entry = Some(signal);
            changed
        };

        if !changed {
            return;
        }

        if diagnostics.validation_error.is_none() {
            let event = LogEvent::SignalChange {
                sequence: self.sequence.next(),
                symbol: symbol.to_string(),
                signal,
                diagnostics: DiagnosticsRow::from(&diagnostics),
            };
            if self.log_tx.send(event).await.is_err() {
                warn!(symbol, "log queue closed, dropping signal-change event");
            }
        }

        if signal {
            self.post_to_all_endpoints(symbol).await;
        }
    }

    async fn post_to_all_endpoints(&self, symbol: &str) {
        for strategy_name in &self.strategy_names {
            for host in &self.endpoints {
                self.post_with_retry(host, strategy_name, symbol).await;
                sleep(POST_PAUSE).await;
            }
        }
    }

    async fn post_with_retry(&self, host: &str, strategy_name: &str, symbol: &str) {
        for attempt in 0..RETRY_ATTEMPTS {
            match self.client.post_update_settings(host, strategy_name, symbol, true).await {
                Ok(()) => return,
                Err(err) => {
                    warn!(host, strategy_name, symbol, attempt, error = %err, "update_settings POST failed");
                    if attempt + 1 < RETRY_ATTEMPTS {
                        sleep(RETRY_PAUSE).await;
                    }
                }
            }
        }
        debug!(host, strategy_name, symbol, "abandoning update_settings POST after final failure");
    }
}
