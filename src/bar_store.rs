// =============================================================================
// Bar Store — per-symbol append-only rolling window of finalized bars
// =============================================================================

use std::collections::VecDeque;

use crate::types::Bar;

/// Append-only, capacity-capped rolling window of bars for a single symbol.
///
/// Readers obtain owned snapshots (`Vec<Bar>`) rather than a reference into
/// the ring, so the store never exposes interior mutability to callers —
/// matching the teacher's `CandleBuffer::get_closed` convention of cloning
/// out rather than lending a reference.
pub struct BarWindow {
    bars: VecDeque<Bar>,
    capacity: usize,
}

impl BarWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            bars: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a newly finalized bar, discarding the oldest bar on overflow.
    pub fn push(&mut self, bar: Bar) {
        self.bars.push_back(bar);
        while self.bars.len() > self.capacity {
            self.bars.pop_front();
        }
    }

    /// Return the last `n` bars, oldest-first.
    pub fn last_n(&self, n: usize) -> Vec<Bar> {
        let start = self.bars.len().saturating_sub(n);
        self.bars.iter().skip(start).copied().collect()
    }

    /// Return every bar currently retained, oldest-first.
    pub fn snapshot(&self) -> Vec<Bar> {
        self.bars.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<Bar> {
        self.bars.back().copied()
    }
}
