// =============================================================================
// Deduplicator — rejects repeated ticks per symbol
// =============================================================================
//
// Exchanges occasionally re-deliver identical trade events across
// reconnects or multiplex boundaries. Duplicates inflate volume by a
// repeatable fraction. The fingerprint is coarse by design: legitimate
// distinct trades at identical ms/price/size are negligible compared to the
// duplicate rate.
// =============================================================================

use std::collections::HashMap;

use crate::types::Tick;

/// Outcome of a deduplication check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    Accepted,
    Duplicate,
}

/// Per-symbol bounded set of recent tick fingerprints.
///
/// Stores fingerprint -> insertion timestamp (ms) so that eviction can drop
/// entries older than the TTL without needing a second index.
pub struct DedupSet {
    seen: HashMap<String, i64>,
    soft_cap: usize,
    ttl_ms: i64,
}

impl DedupSet {
    pub fn new(soft_cap: usize, ttl_ms: i64) -> Self {
        Self {
            seen: HashMap::new(),
            soft_cap,
            ttl_ms,
        }
    }

    /// Check a tick against the set. Inserts the fingerprint on acceptance.
    /// `now_ms` is the current wall-clock time, used for TTL eviction.
    pub fn check(&mut self, tick: &Tick, now_ms: i64) -> DedupOutcome {
        let fp = tick.fingerprint();
        if self.seen.contains_key(&fp) {
            return DedupOutcome::Duplicate;
        }

        self.seen.insert(fp, tick.timestamp_ms);

        if self.seen.len() > self.soft_cap {
            self.evict_stale(now_ms);
        }

        DedupOutcome::Accepted
    }

    /// Remove every fingerprint whose embedded timestamp is older than
    /// `now_ms - ttl_ms`.
    fn evict_stale(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.ttl_ms;
        self.seen.retain(|_, &mut ts| ts >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
