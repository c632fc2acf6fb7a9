// =============================================================================
// Tick Source — multi-connection tick fan-in and demultiplexer
// =============================================================================
//
// Generalizes the teacher's `market_data/trade_stream.rs` (single-symbol
// aggTrade stream, `connect_async` + `futures_util::StreamExt` read loop,
// `parse_agg_trade`'s `serde_json::Value` indexing) and
// `market_data/candle_buffer.rs`'s combined-stream URL builder into a
// connection-group model: up to `K` symbols per connection, `ceil(|S|/K)`
// connections total, one combined `@trade` stream per group instead of one
// `@kline_*` stream per (symbol, interval) pair.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::aggregator::AggregatorHub;
use crate::aggregator::IngestOutcome;
use crate::types::{normalize_symbol, Side, Tick};

pub const DEFAULT_SYMBOL_CAP: usize = 200;
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Connection lifecycle state, observed by reconnect-backoff bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Subscribed,
    Receiving,
}

/// Partition `symbols` into disjoint groups of at most `cap` symbols each,
/// preserving input order within and across groups.
pub fn partition_symbols(symbols: &[String], cap: usize) -> Vec<Vec<String>> {
    symbols.chunks(cap.max(1)).map(|c| c.to_vec()).collect()
}

/// Step-wise backoff by consecutive failure count, per the reconnect policy:
/// 1 -> 5s, 2-3 -> 10s, 4-5 -> 30s, >=6 -> 60s.
pub fn backoff_for(consecutive_failures: u32) -> Duration {
    let secs = match consecutive_failures {
        0 => 0,
        1 => 5,
        2 | 3 => 10,
        4 | 5 => 30,
        _ => 60,
    };
    Duration::from_secs(secs)
}

fn build_trade_stream_url(host: &str, group: &[String]) -> String {
    let streams: Vec<String> = group.iter().map(|s| format!("{}@trade", s.to_lowercase())).collect();
    format!("wss://{host}/stream?streams={}", streams.join("/"))
}

/// Drive one connection group forever, reconnecting with step-wise backoff on
/// any transport error, parse failure, or read timeout. Never returns except
/// on shutdown.
pub async fn run_connection_group(host: &str, group: Vec<String>, hub: Arc<AggregatorHub>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let mut consecutive_failures: u32 = 0;

    loop {
        if *shutdown.borrow() {
            return;
        }

        match run_once(host, &group, &hub, &mut shutdown).await {
            Ok(()) => {
                // Clean shutdown-triggered exit.
                return;
            }
            Err(err) => {
                consecutive_failures += 1;
                let backoff = backoff_for(consecutive_failures);
                error!(group = ?group, error = %err, consecutive_failures, backoff_secs = backoff.as_secs(), "connection group failed, reconnecting");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

async fn run_once(host: &str, group: &[String], hub: &Arc<AggregatorHub>, shutdown: &mut tokio::sync::watch::Receiver<bool>) -> Result<()> {
    let url = build_trade_stream_url(host, group);
    let mut state = ConnectionState::Connecting;
    debug!(url = %url, "connecting to trade stream");

    let (ws_stream, _response) = connect_async(&url).await.context("failed to connect to trade stream")?;
    state = ConnectionState::Subscribed;
    info!(?state, group = ?group, "trade stream subscribed");

    let (_write, mut read) = ws_stream.split();
    state = ConnectionState::Receiving;

    loop {
        tokio::select! {
            frame = tokio::time::timeout(READ_TIMEOUT, read.next()) => {
                let frame = frame.context("read timed out, no inbound message within window")?;
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_message(&text, hub);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("trade stream read error"),
                    None => {
                        warn!(group = ?group, "trade stream ended");
                        return Ok(());
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!(?state, "connection group observed shutdown");
                    return Ok(());
                }
            }
        }
    }
}

fn handle_message(text: &str, hub: &Arc<AggregatorHub>) {
    match parse_trade_message(text) {
        Ok((symbol, tick)) => {
            if !tick.is_valid() {
                debug!(symbol, "dropping invalid tick");
                return;
            }
            let now_ms = crate::aggregator::finalizer::wall_clock_ms();
            match hub.ingest(&symbol, tick, now_ms) {
                IngestOutcome::Accepted => {}
                IngestOutcome::Duplicate => debug!(symbol, "dropped duplicate tick"),
                IngestOutcome::LateDrop => debug!(symbol, "dropped late tick"),
                IngestOutcome::UnknownSymbol => warn!(symbol, "tick for unregistered symbol"),
            }
        }
        Err(e) => {
            debug!(error = %e, "failed to parse trade message");
        }
    }
}

/// Parse a combined-stream trade message:
/// `{ "stream": "<sym>@trade", "data": { "T": <ms>, "p": "<price>", "q": "<qty>", "m": <bool> } }`.
fn parse_trade_message(text: &str) -> Result<(String, Tick)> {
    let root: serde_json::Value = serde_json::from_str(text).context("failed to parse trade JSON")?;
    let data = &root["data"];

    let stream = root["stream"].as_str().context("missing field stream")?;
    let symbol = normalize_symbol(stream.split('@').next().unwrap_or(stream));

    let mut timestamp_ms = data["T"].as_i64().context("missing field T")?;
    if timestamp_ms > 1_000_000_000_000_000 {
        timestamp_ms /= 1000;
    }

    let price = parse_numeric(&data["p"], "p")?;
    let size = parse_numeric(&data["q"], "q")?;
    let is_buyer_maker = data["m"].as_bool().context("missing field m")?;
    let side = if is_buyer_maker { Side::Sell } else { Side::Buy };

    Ok((
        symbol,
        Tick {
            timestamp_ms,
            price,
            size,
            side,
        },
    ))
}

fn parse_numeric(val: &serde_json::Value, name: &str) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => s.parse::<f64>().with_context(|| format!("failed to parse {name} as f64: {s}")),
        serde_json::Value::Number(n) => n.as_f64().with_context(|| format!("field {name} is not a valid f64")),
        _ => anyhow::bail!("field {name} has unexpected JSON type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_splits_into_groups_of_cap() {
        let symbols: Vec<String> = (0..450).map(|i| format!("SYM{i}")).collect();
        let groups = partition_symbols(&symbols, 200);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].len(), 200);
        assert_eq!(groups[1].len(), 200);
        assert_eq!(groups[2].len(), 50);
    }

    #[test]
    fn backoff_schedule_matches_spec() {
        assert_eq!(backoff_for(1), Duration::from_secs(5));
        assert_eq!(backoff_for(2), Duration::from_secs(10));
        assert_eq!(backoff_for(3), Duration::from_secs(10));
        assert_eq!(backoff_for(4), Duration::from_secs(30));
        assert_eq!(backoff_for(5), Duration::from_secs(30));
        assert_eq!(backoff_for(6), Duration::from_secs(60));
        assert_eq!(backoff_for(100), Duration::from_secs(60));
    }

    #[test]
    fn build_url_contains_all_streams() {
        let group = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
        let url = build_trade_stream_url("stream.binance.com:9443", &group);
        assert!(url.contains("btcusdt@trade"));
        assert!(url.contains("ethusdt@trade"));
        assert!(url.starts_with("wss://stream.binance.com:9443/stream?streams="));
    }

    #[test]
    fn parse_trade_message_ok() {
        let text = r#"{"stream":"btcusdt@trade","data":{"T":1700000000000,"p":"100.5","q":"1.25","m":false}}"#;
        let (symbol, tick) = parse_trade_message(text).unwrap();
        assert_eq!(symbol, "BTCUSDT");
        assert_eq!(tick.price, 100.5);
        assert_eq!(tick.size, 1.25);
        assert_eq!(tick.side, Side::Buy);
    }

    #[test]
    fn parse_trade_message_maker_buyer_is_sell_side() {
        let text = r#"{"stream":"btcusdt@trade","data":{"T":1700000000000,"p":"100.5","q":"1.25","m":true}}"#;
        let (_, tick) = parse_trade_message(text).unwrap();
        assert_eq!(tick.side, Side::Sell);
    }

    #[test]
    fn parse_trade_message_wide_timestamp_is_rescaled() {
        let text = r#"{"stream":"btcusdt@trade","data":{"T":1700000000000000,"p":"100.5","q":"1.25","m":false}}"#;
        let (_, tick) = parse_trade_message(text).unwrap();
        assert_eq!(tick.timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn parse_trade_message_rejects_missing_field() {
        let text = r#"{"stream":"btcusdt@trade","data":{"p":"100.5","q":"1.25","m":false}}"#;
        assert!(parse_trade_message(text).is_err());
    }
}
