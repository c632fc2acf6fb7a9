// =============================================================================
// Shared types used across the candle aggregation and signal engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Normalize a raw symbol string to the engine's canonical form: upper-case,
/// trimmed. Applied at every ingestion boundary (tick parsing, config
/// loading, CLI symbol overrides) so the rest of the engine never has to
/// worry about case mismatches.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Taker side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// A single validated trade event from the exchange stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp_ms: i64,
    pub price: f64,
    pub size: f64,
    pub side: Side,
}

impl Tick {
    /// Fingerprint used by the deduplicator: `"{timestamp_ms}_{price}_{size}"`.
    /// Side is deliberately excluded.
    pub fn fingerprint(&self) -> String {
        format!("{}_{}_{}", self.timestamp_ms, self.price, self.size)
    }

    /// A tick is valid for ingestion only if price, size, and timestamp all
    /// parsed and `price > 0`. `size == 0` is allowed.
    pub fn is_valid(&self) -> bool {
        self.price > 0.0 && self.price.is_finite() && self.size.is_finite() && self.size >= 0.0
    }
}

/// A finalized OHLCV bar. `timestamp_ms` is the bar's opening boundary (an
/// exact multiple of `BAR_MS`). `sequence` is assigned by the finalizer at
/// emission time and is strictly increasing across all symbols.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub sequence: u64,
}

impl Bar {
    /// True for a forward-filled bar (no trades occurred in this window).
    pub fn is_forward_fill(&self) -> bool {
        self.volume == 0.0
    }
}
