// =============================================================================
// Engine Configuration — typed config with atomic save and serde defaults
// =============================================================================
//
// Grounded directly on the teacher's `runtime_config.rs`: every tunable is a
// field with `#[serde(default = "default_...")]` so older config files keep
// loading, `Config::load`/`Config::save` use the same atomic tmp-then-rename
// persistence pattern, and `main.rs` falls back to `Config::default()` with a
// `warn!` on load failure exactly as the teacher does for `RuntimeConfig`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string(), "BNBUSDT".to_string()]
}

fn default_strategy_names() -> Vec<String> {
    vec!["momentum".to_string()]
}

fn default_endpoints() -> Vec<String> {
    Vec::new()
}

fn default_min_daily_volume() -> f64 {
    1_000_000.0
}

fn default_blacklist() -> Vec<String> {
    Vec::new()
}

fn default_bar_ms() -> i64 {
    10_000
}

fn default_warmup() -> usize {
    20
}

fn default_driver_interval_ms() -> u64 {
    300
}

fn default_dedup_soft_cap() -> usize {
    1000
}

fn default_dedup_ttl_ms() -> i64 {
    60_000
}

fn default_symbol_cap() -> usize {
    200
}

fn default_window_max() -> usize {
    100
}

fn default_exclusion_timeout_secs() -> u64 {
    600
}

fn default_host() -> String {
    "stream.binance.com:9443".to_string()
}

/// Top-level engine configuration. Every field carries a serde default so
/// that adding fields never breaks loading an older config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    #[serde(default = "default_strategy_names")]
    pub strategy_names: Vec<String>,

    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    #[serde(default = "default_min_daily_volume")]
    pub min_daily_volume: f64,

    #[serde(default = "default_blacklist")]
    pub blacklist: Vec<String>,

    #[serde(default = "default_bar_ms")]
    pub bar_ms: i64,

    #[serde(default = "default_warmup")]
    pub warmup: usize,

    #[serde(default = "default_driver_interval_ms")]
    pub driver_interval_ms: u64,

    #[serde(default = "default_dedup_soft_cap")]
    pub dedup_soft_cap: usize,

    #[serde(default = "default_dedup_ttl_ms")]
    pub dedup_ttl_ms: i64,

    #[serde(default = "default_symbol_cap")]
    pub symbol_cap: usize,

    #[serde(default = "default_window_max")]
    pub window_max: usize,

    #[serde(default = "default_exclusion_timeout_secs")]
    pub exclusion_timeout_secs: u64,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            strategy_names: default_strategy_names(),
            endpoints: default_endpoints(),
            min_daily_volume: default_min_daily_volume(),
            blacklist: default_blacklist(),
            bar_ms: default_bar_ms(),
            warmup: default_warmup(),
            driver_interval_ms: default_driver_interval_ms(),
            dedup_soft_cap: default_dedup_soft_cap(),
            dedup_ttl_ms: default_dedup_ttl_ms(),
            symbol_cap: default_symbol_cap(),
            window_max: default_window_max(),
            exclusion_timeout_secs: default_exclusion_timeout_secs(),
            host: default_host(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file at `path`. Returns an error if
    /// the file is missing or malformed so the caller can fall back to
    /// defaults with a warning, as the teacher's `main.rs` does for
    /// `RuntimeConfig`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content).with_context(|| format!("failed to parse config from {}", path.display()))?;
        info!(path = %path.display(), symbols = ?config.symbols, "config loaded");
        Ok(config)
    }

    /// Persist the configuration using an atomic write (tmp file, then
    /// rename) to avoid corruption on crash mid-write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).context("failed to serialize config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content).with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path).with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "config saved (atomic)");
        Ok(())
    }

    /// Override `symbols` from a comma-separated environment variable,
    /// mirroring the teacher's `AURORA_SYMBOLS` override in `main.rs`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(syms) = std::env::var("ENGINE_SYMBOLS") {
            let parsed: Vec<String> = syms
                .split(',')
                .map(|s| crate::types::normalize_symbol(s))
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                self.symbols = parsed;
            }
        }
    }
}
