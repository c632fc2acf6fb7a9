// =============================================================================
// Symbol Discovery — pluggable startup symbol universe
// =============================================================================
//
// No direct teacher precedent (the teacher hard-codes its symbol list from
// config/env, see `main.rs`'s `AURORA_SYMBOLS` override); this is new code
// in the teacher's idiom — a small trait plus one concrete struct, not a
// generic plugin framework.

use async_trait::async_trait;

use crate::types::normalize_symbol;

/// Returns the engine's startup symbol universe. Implementations may hit an
/// exchange REST endpoint, read a static list, or combine both; the engine
/// calls `discover` exactly once, at startup.
#[async_trait]
pub trait SymbolDiscovery: Send + Sync {
    async fn discover(&self) -> anyhow::Result<Vec<String>>;
}

/// A fixed symbol list, normalized at construction time. Matches the
/// teacher's env-var-or-default fallback in `main.rs`, without the 24h
/// volume ranking `spec.md` explicitly keeps out of scope.
pub struct StaticSymbolDiscovery {
    symbols: Vec<String>,
}

impl StaticSymbolDiscovery {
    pub fn new(symbols: Vec<String>) -> Self {
        Self {
            symbols: symbols.iter().map(|s| normalize_symbol(s)).collect(),
        }
    }
}

#[async_trait]
impl SymbolDiscovery for StaticSymbolDiscovery {
    async fn discover(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.symbols.clone())
    }
}

/// Pluggable predicate applied by the caller after discovery: given a symbol
/// and its 24h quote volume, decide whether it stays in the universe. The
/// engine itself does not compute volume; this type only encodes the rule
/// (`min_daily_volume` threshold, blacklist, `USDT`-suffix restriction).
pub struct VolumeFilter {
    min_daily_volume: f64,
    blacklist: Vec<String>,
}

impl VolumeFilter {
    pub fn new(min_daily_volume: f64, blacklist: Vec<String>) -> Self {
        Self {
            min_daily_volume,
            blacklist: blacklist.iter().map(|s| normalize_symbol(s)).collect(),
        }
    }

    /// Apply the rule: symbol must end in `USDT`, must not be blacklisted,
    /// and must meet the minimum 24h quote volume.
    pub fn keep(&self, symbol: &str, quote_volume_24h: f64) -> bool {
        let symbol = normalize_symbol(symbol);
        symbol.ends_with("USDT") && !self.blacklist.contains(&symbol) && quote_volume_24h >= self.min_daily_volume
    }
}
