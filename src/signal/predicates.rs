// =============================================================================
// Signal predicates — low_vol, narrow_rng, high_mma, growth_filter
// =============================================================================
//
// Grounded on the teacher's `indicators/atr.rs` (Wilder smoothing recurrence,
// `Option`-free pure functions operating on a borrowed slice) and on
// `examples/original_source/src/signal_processor.py`'s condition functions,
// which are the ground truth for parameter names and defaults. The
// growth-filter sign convention (no `abs()` on the denominator) deliberately
// departs from the Python original per the documented backtester variant.

use crate::types::Bar;

use super::percentile::rolling_percentile;

/// Per-predicate diagnostic payload, rounded for log consumers only; the
/// rounding never affects the boolean outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredicateResult {
    pub current: f64,
    pub threshold: f64,
    pub passed: bool,
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

pub const VOL_PERIOD: usize = 20;
pub const VOL_PCTL: f64 = 5.0;

/// Low Volume: the last bar's volume sits at or below the 5th percentile of
/// the trailing 20-bar volume window.
pub fn low_vol(bars: &[Bar]) -> PredicateResult {
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let last = volumes.len() - 1;
    let threshold = rolling_percentile(&volumes, last, VOL_PERIOD, VOL_PCTL);
    let current = volumes[last];
    PredicateResult {
        current: round_to(current, 2),
        threshold: round_to(threshold, 2),
        passed: current <= threshold,
    }
}

pub const RANGE_PERIOD: usize = 30;
pub const RNG_PCTL: f64 = 5.0;

/// Narrow Range: the last bar's high-low range sits at or below the 5th
/// percentile of the trailing 30-bar range window.
pub fn narrow_rng(bars: &[Bar]) -> PredicateResult {
    let ranges: Vec<f64> = bars.iter().map(|b| b.high - b.low).collect();
    let last = ranges.len() - 1;
    let threshold = rolling_percentile(&ranges, last, RANGE_PERIOD, RNG_PCTL);
    let current = ranges[last];
    PredicateResult {
        current: round_to(current, 6),
        threshold: round_to(threshold, 6),
        passed: current <= threshold,
    }
}

pub const MMA_PERIOD: f64 = 20.0;
pub const MMA_MIN: f64 = 0.6;

/// High Normalized True Range: Wilder-smoothed true range, normalized by
/// typical price, exceeds `min` at the last bar.
pub fn high_mma(bars: &[Bar]) -> PredicateResult {
    let n = bars.len();
    let mut tr = vec![0.0; n];
    for i in 1..n {
        let high_low = bars[i].high - bars[i].low;
        let high_close = (bars[i].high - bars[i - 1].close).abs();
        let low_close = (bars[i].low - bars[i - 1].close).abs();
        tr[i] = high_low.max(high_close).max(low_close);
    }

    let mut mma = vec![0.0; n];
    mma[0] = tr[0];
    for i in 1..n {
        mma[i] = mma[i - 1] + (tr[i] - mma[i - 1]) / MMA_PERIOD;
    }

    let last = n - 1;
    let bar = &bars[last];
    let tp = (bar.high + bar.low + bar.close) / 3.0;
    let n_last = if tp == 0.0 { 0.0 } else { (mma[last] / tp) * 100.0 };

    PredicateResult {
        current: round_to(n_last, 3),
        threshold: round_to(MMA_MIN, 3),
        passed: n_last > MMA_MIN,
    }
}

pub const GROWTH_LOOKBACK: usize = 50;
pub const GROWTH_MIN_PCT: f64 = -0.1;

/// Growth Filter: the percentage change from `lookback` bars ago to the last
/// bar must not have fallen below `min_growth_pct`. Insufficient history
/// passes by default (no growth signal possible yet).
pub fn growth_filter(bars: &[Bar]) -> PredicateResult {
    let n = bars.len();
    if n < GROWTH_LOOKBACK + 1 {
        return PredicateResult {
            current: 0.0,
            threshold: round_to(GROWTH_MIN_PCT, 2),
            passed: true,
        };
    }

    let last = n - 1;
    let close_last = bars[last].close;
    let close_base = bars[last - GROWTH_LOOKBACK].close;
    // Deliberately not `close_base.abs()`: the spec codifies the no-abs
    // variant matching the documented backtester.
    let g = (close_last - close_base) / close_base * 100.0;

    PredicateResult {
        current: round_to(g, 2),
        threshold: round_to(GROWTH_MIN_PCT, 2),
        passed: g >= GROWTH_MIN_PCT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(ts: i64, o: f64, h: f64, l: f64, c: f64, v: f64, seq: u64) -> Bar {
        Bar { timestamp_ms: ts, open: o, high: h, low: l, close: c, volume: v, sequence: seq }
    }

    fn flat_bars(n: usize, price: f64, volume: f64) -> Vec<Bar> {
        (0..n)
            .map(|i| bar(i as i64 * 10_000, price, price, price, price, volume, i as u64))
            .collect()
    }

    #[test]
    fn low_vol_passes_when_last_volume_at_bottom() {
        let mut bars = flat_bars(20, 100.0, 10.0);
        bars[19].volume = 0.5;
        let r = low_vol(&bars);
        assert!(r.passed);
    }

    #[test]
    fn low_vol_fails_when_last_volume_is_high() {
        let mut bars = flat_bars(20, 100.0, 10.0);
        bars[19].volume = 1000.0;
        let r = low_vol(&bars);
        assert!(!r.passed);
    }

    #[test]
    fn narrow_rng_passes_on_tight_last_range() {
        let mut bars = flat_bars(30, 100.0, 10.0);
        for b in bars.iter_mut() {
            b.high += 1.0;
            b.low -= 1.0;
        }
        bars[29].high = 100.01;
        bars[29].low = 99.99;
        let r = narrow_rng(&bars);
        assert!(r.passed);
    }

    #[test]
    fn high_mma_zero_for_perfectly_flat_series() {
        let bars = flat_bars(25, 100.0, 10.0);
        let r = high_mma(&bars);
        assert_eq!(r.current, 0.0);
        assert!(!r.passed);
    }

    #[test]
    fn high_mma_positive_under_volatility() {
        let mut bars = flat_bars(25, 100.0, 10.0);
        for (i, b) in bars.iter_mut().enumerate() {
            if i > 0 {
                b.high = 100.0 + 10.0;
                b.low = 100.0 - 10.0;
            }
        }
        let r = high_mma(&bars);
        assert!(r.current > 0.0);
    }

    #[test]
    fn growth_filter_insufficient_data_passes() {
        let bars = flat_bars(10, 100.0, 1.0);
        let r = growth_filter(&bars);
        assert!(r.passed);
    }

    #[test]
    fn growth_filter_no_abs_on_negative_base() {
        let mut bars = flat_bars(GROWTH_LOOKBACK + 1, 100.0, 1.0);
        // base price negative, last price positive: without abs, g is negative
        // regardless of direction, since dividing by a negative flips sign.
        bars[0].close = -50.0;
        bars[GROWTH_LOOKBACK].close = 10.0;
        let r = growth_filter(&bars);
        assert!(r.current < 0.0);
        assert!(!r.passed);
    }

    #[test]
    fn growth_filter_fails_below_threshold() {
        let mut bars = flat_bars(GROWTH_LOOKBACK + 1, 100.0, 1.0);
        bars[0].close = 100.0;
        bars[GROWTH_LOOKBACK].close = 50.0;
        let r = growth_filter(&bars);
        assert_eq!(r.current, -50.0);
        assert!(!r.passed);
    }
}
