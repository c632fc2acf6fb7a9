// =============================================================================
// Bar Aggregator — per-symbol boundary bucketing of ticks into OHLCV bars
// =============================================================================
//
// This is the hardest subsystem in the engine: it converts two asynchronous
// inputs (ticks and wall-clock time) into a gap-free, boundary-aligned bar
// stream. Tick ingestion (this module) and bar finalization (`finalizer.rs`)
// share the same per-symbol state behind a single lock, so that a tick never
// mutates a boundary the finalizer has already emitted and the finalizer
// never observes a half-written bucket.
// =============================================================================

pub mod finalizer;

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::bar_store::BarWindow;
use crate::dedup::DedupSet;
use crate::types::Tick;

/// Per-symbol pending-bucket state. Mutated by tick ingestion (append to a
/// bucket) and by the finalizer (drain buckets into bars).
pub struct BoundaryState {
    pub pending_ticks_by_boundary: HashMap<i64, Vec<Tick>>,
    pub open_boundary: Option<i64>,
    pub last_finalized_boundary: i64,
    pub last_close_price: Option<f64>,
    /// Set by the finalizer after its first pass over this symbol. Before
    /// that, `last_finalized_boundary == 0` is a startup sentinel, not a
    /// real finalized boundary, so the late-arrival drop rule must not fire.
    pub finalization_started: bool,
}

impl BoundaryState {
    fn new() -> Self {
        Self {
            pending_ticks_by_boundary: HashMap::new(),
            open_boundary: None,
            last_finalized_boundary: 0,
            last_close_price: None,
            finalization_started: false,
        }
    }
}

/// All state co-owned by the aggregator, bar store, and dedup set for a
/// single symbol, behind one lock. The finalizer holds this lock across the
/// full emission window for the symbol (bounded by bars-to-emit, usually 1);
/// tick ingestion holds it only across a single bucket insert.
pub struct SymbolState {
    pub symbol: String,
    pub inner: Mutex<SymbolInner>,
    /// Wall-clock ms when this symbol was first registered with the hub.
    /// Used by the driver to decide symbol exclusion (no bars for 600s).
    pub first_seen_ms: i64,
}

pub struct SymbolInner {
    pub boundary: BoundaryState,
    pub dedup: DedupSet,
    pub bars: BarWindow,
}

impl SymbolState {
    fn new(symbol: String, first_seen_ms: i64, window_max: usize, dedup_soft_cap: usize, dedup_ttl_ms: i64) -> Self {
        Self {
            symbol,
            inner: Mutex::new(SymbolInner {
                boundary: BoundaryState::new(),
                dedup: DedupSet::new(dedup_soft_cap, dedup_ttl_ms),
                bars: BarWindow::new(window_max),
            }),
            first_seen_ms,
        }
    }
}

/// Engine-wide map of per-symbol state, fixed at startup and never mutated
/// (symbols are created once, never destroyed).
pub struct AggregatorHub {
    pub bar_ms: i64,
    symbols: HashMap<String, SymbolState>,
}

impl AggregatorHub {
    pub fn new(symbols: &[String], bar_ms: i64, window_max: usize, dedup_soft_cap: usize, dedup_ttl_ms: i64, now_ms: i64) -> Self {
        let map = symbols
            .iter()
            .map(|s| {
                (
                    s.clone(),
                    SymbolState::new(s.clone(), now_ms, window_max, dedup_soft_cap, dedup_ttl_ms),
                )
            })
            .collect();
        Self { bar_ms, symbols: map }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    pub fn state(&self, symbol: &str) -> Option<&SymbolState> {
        self.symbols.get(symbol)
    }

    /// Floor a timestamp to its bar boundary.
    pub fn floor_boundary(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms.div_euclid(self.bar_ms) * self.bar_ms
    }

    /// Ingest a single validated tick for `symbol`. Applies deduplication
    /// first; duplicates never reach a bucket. Late ticks (boundary already
    /// finalized) are silently dropped.
    pub fn ingest(&self, symbol: &str, tick: Tick, now_ms: i64) -> IngestOutcome {
        let Some(state) = self.symbols.get(symbol) else {
            return IngestOutcome::UnknownSymbol;
        };

        let b = self.floor_boundary(tick.timestamp_ms);
        let mut inner = state.inner.lock();

        if inner.dedup.check(&tick, now_ms) == crate::dedup::DedupOutcome::Duplicate {
            return IngestOutcome::Duplicate;
        }

        if inner.boundary.finalization_started && b < inner.boundary.last_finalized_boundary {
            return IngestOutcome::LateDrop;
        }

        inner.boundary.pending_ticks_by_boundary.entry(b).or_default().push(tick);

        if inner.boundary.open_boundary.is_none() || b > inner.boundary.open_boundary.unwrap() {
            inner.boundary.open_boundary = Some(b);
        }

        IngestOutcome::Accepted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted,
    Duplicate,
    LateDrop,
    UnknownSymbol,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn tick(ts: i64, price: f64, size: f64) -> Tick {
        Tick { timestamp_ms: ts, price, size, side: Side::Buy }
    }

    fn hub() -> AggregatorHub {
        AggregatorHub::new(&["BTCUSDT".to_string()], 10_000, 100, 1000, 60_000, 0)
    }

    #[test]
    fn floor_boundary_rule() {
        let h = hub();
        assert_eq!(h.floor_boundary(0), 0);
        assert_eq!(h.floor_boundary(9999), 0);
        assert_eq!(h.floor_boundary(10000), 10000);
        assert_eq!(h.floor_boundary(19999), 10000);
    }

    #[test]
    fn ingest_unknown_symbol() {
        let h = hub();
        assert_eq!(h.ingest("ETHUSDT", tick(0, 1.0, 1.0), 0), IngestOutcome::UnknownSymbol);
    }

    #[test]
    fn ingest_accepts_and_dedups() {
        let h = hub();
        let t = tick(1000, 100.0, 1.0);
        assert_eq!(h.ingest("BTCUSDT", t, 1000), IngestOutcome::Accepted);
        assert_eq!(h.ingest("BTCUSDT", t, 1000), IngestOutcome::Duplicate);

        let state = h.state("BTCUSDT").unwrap();
        let inner = state.inner.lock();
        assert_eq!(inner.boundary.pending_ticks_by_boundary.get(&0).unwrap().len(), 1);
    }

    #[test]
    fn open_boundary_tracks_latest_bucket() {
        let h = hub();
        h.ingest("BTCUSDT", tick(1000, 100.0, 1.0), 1000);
        h.ingest("BTCUSDT", tick(15000, 101.0, 1.0), 15000);
        let state = h.state("BTCUSDT").unwrap();
        let inner = state.inner.lock();
        assert_eq!(inner.boundary.open_boundary, Some(10_000));
    }
}
