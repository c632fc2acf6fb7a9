// =============================================================================
// Finalization Timer — single clock-driven task advancing every symbol
// in lock-step to the same boundary
// =============================================================================
//
// Generalizes the teacher's `CandleBuffer::update`, which reacts to each
// inbound kline message and replaces the in-progress candle in place, into a
// timer-driven, boundary-aligned model: Binance hands the teacher
// pre-aggregated candles, so it never has to build one from raw trades or
// gap-fill an inactive window itself. This task is the part of the system
// with no direct teacher precedent; it is grounded in the aggregator's
// ingestion-side `BoundaryState` defined alongside it in `mod.rs`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::{sleep, Duration};
use tracing::{debug, error, warn};

use crate::aggregator::AggregatorHub;
use crate::types::Bar;

/// Process-wide monotonic bar sequence, assigned only by the finalizer.
#[derive(Default)]
pub struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Allocate the next sequence number. Shared across bar finalization,
    /// signal-change log events, and system-event log events so that the
    /// log writer's output is totally ordered, not just ordered within one
    /// event kind.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

pub fn wall_clock_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

/// Callback invoked for every bar as it is finalized, used to feed the log
/// writer's bar-finalized NDJSON sink. Kept as a plain closure rather than a
/// trait object registry: the spec's only observation hooks are the log
/// sinks, so one callback per run is enough.
pub type BarSink = dyn Fn(&str, Bar) + Send + Sync;

/// Run the finalizer loop forever. Aligns to the next wall-clock multiple of
/// `hub.bar_ms`, then repeatedly drains each symbol's pending buckets into
/// bars (real or forward-filled) up to the current boundary.
pub async fn run(hub: Arc<AggregatorHub>, sequence: Arc<SequenceCounter>, on_bar: Arc<BarSink>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    align_to_next_boundary(hub.bar_ms).await;

    loop {
        if *shutdown.borrow() {
            debug!("finalizer observed shutdown signal, exiting");
            return;
        }

        let now_b = floor(wall_clock_ms(), hub.bar_ms);

        for symbol in hub.symbols() {
            if let Err(err) = finalize_symbol(&hub, symbol, now_b, &sequence, &*on_bar) {
                error!(symbol, error = %err, "finalizer pass failed for symbol, continuing");
            }
        }

        let wall = wall_clock_ms();
        let next = now_b + hub.bar_ms;
        let sleep_ms = (next - wall).max(0) as u64;

        tokio::select! {
            _ = sleep(Duration::from_millis(sleep_ms)) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!("finalizer observed shutdown signal during sleep, exiting");
                    return;
                }
            }
        }
    }
}

fn floor(ms: i64, bar_ms: i64) -> i64 {
    ms.div_euclid(bar_ms) * bar_ms
}

/// Drain one symbol's pending buckets from its last-known position up to
/// `now_b`, emitting a real or forward-fill bar per boundary crossed.
fn finalize_symbol(hub: &AggregatorHub, symbol: &str, now_b: i64, sequence: &SequenceCounter, on_bar: &BarSink) -> anyhow::Result<()> {
    let Some(state) = hub.state(symbol) else {
        anyhow::bail!("unknown symbol in finalizer pass: {symbol}");
    };

    let mut inner = state.inner.lock();
    inner.boundary.finalization_started = true;

    let last = inner.boundary.last_finalized_boundary;
    if last == 0 && inner.boundary.open_boundary.is_none() {
        // No real tick has ever arrived for this symbol; nothing to emit.
        return Ok(());
    }

    let mut b = if last == 0 {
        inner.boundary.open_boundary.unwrap()
    } else {
        last
    };

    while b < now_b {
        let bucket = inner.boundary.pending_ticks_by_boundary.remove(&b);

        let bar = match bucket {
            Some(ticks) if !ticks.is_empty() => {
                let open = ticks.first().unwrap().price;
                let close = ticks.last().unwrap().price;
                let high = ticks.iter().map(|t| t.price).fold(f64::MIN, f64::max);
                let low = ticks.iter().map(|t| t.price).fold(f64::MAX, f64::min);
                let volume: f64 = ticks.iter().map(|t| t.size).sum();
                inner.boundary.last_close_price = Some(close);
                Some(Bar {
                    timestamp_ms: b,
                    open,
                    high,
                    low,
                    close,
                    volume,
                    sequence: 0,
                })
            }
            _ => match inner.boundary.last_close_price {
                Some(p) => Some(Bar {
                    timestamp_ms: b,
                    open: p,
                    high: p,
                    low: p,
                    close: p,
                    volume: 0.0,
                    sequence: 0,
                }),
                None => None,
            },
        };

        match bar {
            Some(mut bar) => {
                bar.sequence = sequence.next();
                inner.bars.push(bar);
                on_bar(symbol, bar);
            }
            None => {
                warn!(symbol, boundary = b, "skipping boundary before first real tick");
            }
        }

        b += hub.bar_ms;
    }

    inner.boundary.last_finalized_boundary = now_b;
    if let Some(ob) = inner.boundary.open_boundary {
        if ob < now_b {
            inner.boundary.open_boundary = None;
        }
    }

    Ok(())
}

async fn align_to_next_boundary(bar_ms: i64) {
    let now = wall_clock_ms();
    let next = floor(now, bar_ms) + bar_ms;
    let wait = (next - now).max(0) as u64;
    sleep(Duration::from_millis(wait)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use parking_lot::Mutex as StdMutex;
    use std::sync::Arc as StdArc;

    fn tick(ts: i64, price: f64, size: f64) -> crate::types::Tick {
        crate::types::Tick { timestamp_ms: ts, price, size, side: Side::Buy }
    }

    fn hub(symbols: &[&str]) -> AggregatorHub {
        let syms: Vec<String> = symbols.iter().map(|s| s.to_string()).collect();
        AggregatorHub::new(&syms, 10_000, 100, 1000, 60_000, 0)
    }

    /// S1: three ticks in one boundary, finalizer crossing b=10000 emits a
    /// single bar with open=100, high=102, low=100, close=101, volume=6.
    #[test]
    fn single_bar_three_ticks() {
        let hub = hub(&["BTCUSDT"]);
        hub.ingest("BTCUSDT", tick(1000, 100.0, 1.0), 1000);
        hub.ingest("BTCUSDT", tick(5000, 102.0, 2.0), 5000);
        hub.ingest("BTCUSDT", tick(9999, 101.0, 3.0), 9999);

        let sequence = SequenceCounter::new();
        let seen: StdArc<StdMutex<Vec<Bar>>> = StdArc::new(StdMutex::new(Vec::new()));
        let seen2 = seen.clone();
        let sink: StdArc<BarSink> = StdArc::new(move |_sym: &str, bar: Bar| seen2.lock().push(bar));

        finalize_symbol(&hub, "BTCUSDT", 10_000, &sequence, &*sink).unwrap();

        let bars = seen.lock();
        assert_eq!(bars.len(), 1);
        let bar = bars[0];
        assert_eq!(bar.timestamp_ms, 0);
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.high, 102.0);
        assert_eq!(bar.low, 100.0);
        assert_eq!(bar.close, 101.0);
        assert_eq!(bar.volume, 6.0);
    }

    /// S2: forward-fill continuing from S1 when no ticks arrive in
    /// [10000, 20000).
    #[test]
    fn forward_fill_after_inactive_window() {
        let hub = hub(&["BTCUSDT"]);
        hub.ingest("BTCUSDT", tick(1000, 100.0, 1.0), 1000);
        hub.ingest("BTCUSDT", tick(5000, 102.0, 2.0), 5000);
        hub.ingest("BTCUSDT", tick(9999, 101.0, 3.0), 9999);

        let sequence = SequenceCounter::new();
        let seen: StdArc<StdMutex<Vec<Bar>>> = StdArc::new(StdMutex::new(Vec::new()));
        let seen2 = seen.clone();
        let sink: StdArc<BarSink> = StdArc::new(move |_sym: &str, bar: Bar| seen2.lock().push(bar));

        finalize_symbol(&hub, "BTCUSDT", 10_000, &sequence, &*sink).unwrap();
        finalize_symbol(&hub, "BTCUSDT", 20_000, &sequence, &*sink).unwrap();

        let bars = seen.lock();
        assert_eq!(bars.len(), 2);
        let ff = bars[1];
        assert_eq!(ff.timestamp_ms, 10_000);
        assert!(ff.is_forward_fill());
        assert_eq!(ff.open, 101.0);
        assert_eq!(ff.high, 101.0);
        assert_eq!(ff.low, 101.0);
        assert_eq!(ff.close, 101.0);
    }

    /// A symbol with no ticks ever produces no bars; the finalizer skips it.
    #[test]
    fn silent_symbol_produces_no_bars() {
        let hub = hub(&["BTCUSDT"]);
        let sequence = SequenceCounter::new();
        let seen: StdArc<StdMutex<Vec<Bar>>> = StdArc::new(StdMutex::new(Vec::new()));
        let seen2 = seen.clone();
        let sink: StdArc<BarSink> = StdArc::new(move |_sym: &str, bar: Bar| seen2.lock().push(bar));

        finalize_symbol(&hub, "BTCUSDT", 50_000, &sequence, &*sink).unwrap();
        assert!(seen.lock().is_empty());
    }

    /// Sequence numbers are strictly increasing across symbols.
    #[test]
    fn sequence_strictly_increases_across_symbols() {
        let hub = hub(&["BTCUSDT", "ETHUSDT"]);
        hub.ingest("BTCUSDT", tick(1000, 100.0, 1.0), 1000);
        hub.ingest("ETHUSDT", tick(1000, 50.0, 1.0), 1000);

        let sequence = SequenceCounter::new();
        let seen: StdArc<StdMutex<Vec<u64>>> = StdArc::new(StdMutex::new(Vec::new()));
        let seen2 = seen.clone();
        let sink: StdArc<BarSink> = StdArc::new(move |_sym: &str, bar: Bar| seen2.lock().push(bar.sequence));

        finalize_symbol(&hub, "BTCUSDT", 10_000, &sequence, &*sink).unwrap();
        finalize_symbol(&hub, "ETHUSDT", 10_000, &sequence, &*sink).unwrap();

        let seqs = seen.lock();
        assert_eq!(seqs.len(), 2);
        assert!(seqs[0] < seqs[1]);
    }

    /// Late ticks after finalization has begun are silently dropped and do
    /// not retroactively mutate an already-emitted bar.
    #[test]
    fn late_tick_after_finalization_is_dropped() {
        let hub = hub(&["BTCUSDT"]);
        hub.ingest("BTCUSDT", tick(1000, 100.0, 1.0), 1000);

        let sequence = SequenceCounter::new();
        let seen: StdArc<StdMutex<Vec<Bar>>> = StdArc::new(StdMutex::new(Vec::new()));
        let seen2 = seen.clone();
        let sink: StdArc<BarSink> = StdArc::new(move |_sym: &str, bar: Bar| seen2.lock().push(bar));

        finalize_symbol(&hub, "BTCUSDT", 10_000, &sequence, &*sink).unwrap();

        let outcome = hub.ingest("BTCUSDT", tick(500, 999.0, 1.0), 10_001);
        assert_eq!(outcome, crate::aggregator::IngestOutcome::LateDrop);
        assert_eq!(seen.lock().len(), 1);
    }
}
