// =============================================================================
// Signal Evaluator — pure function from a bar window to (signal, diagnostics)
// =============================================================================
//
// Grounded on the teacher's `indicators/mod.rs` "pure, side-effect-free
// functions" philosophy, generalized here to a `(bool, Diagnostics)` return:
// the evaluator itself is never "no data", only "no signal", represented
// in-band via `Diagnostics::validation_error` rather than `Option`.

pub mod percentile;
pub mod predicates;

use crate::types::Bar;
use predicates::PredicateResult;

pub const WARMUP: usize = 20;

/// Diagnostics for one evaluation: per-predicate current/threshold/passed,
/// plus an optional validation error describing why no signal could be
/// produced (warm-up, forward-fill, or a defensive OHLC sanity failure).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Diagnostics {
    pub low_vol: Option<PredicateResult>,
    pub narrow_rng: Option<PredicateResult>,
    pub high_mma: Option<PredicateResult>,
    pub growth_filter: Option<PredicateResult>,
    pub validation_error: Option<String>,
}

impl Diagnostics {
    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            validation_error: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// Evaluate the four predicates over `bars`, enforcing warm-up and validity
/// gates first. `bars` must be ordered oldest-first, as returned by
/// `BarWindow::snapshot`/`last_n`.
pub fn evaluate(bars: &[Bar]) -> (bool, Diagnostics) {
    if bars.len() < WARMUP {
        return (false, Diagnostics::rejected(format!("Warmup: {}/{}", bars.len(), WARMUP)));
    }

    let last = bars.last().unwrap();
    if last.is_forward_fill() {
        return (false, Diagnostics::rejected("No trades in last candle (forward-fill)"));
    }

    for (i, bar) in bars.iter().enumerate() {
        let ohlc_ok = bar.low <= bar.open
            && bar.open <= bar.high
            && bar.low <= bar.close
            && bar.close <= bar.high
            && bar.high >= bar.low;
        if !ohlc_ok {
            return (
                false,
                Diagnostics::rejected(format!(
                    "Invalid candle {i}: open={} high={} low={} close={}",
                    bar.open, bar.high, bar.low, bar.close
                )),
            );
        }
    }

    let low_vol = predicates::low_vol(bars);
    let narrow_rng = predicates::narrow_rng(bars);
    let high_mma = predicates::high_mma(bars);
    let growth_filter = predicates::growth_filter(bars);

    let signal = low_vol.passed && narrow_rng.passed && high_mma.passed && growth_filter.passed;

    (
        signal,
        Diagnostics {
            low_vol: Some(low_vol),
            narrow_rng: Some(narrow_rng),
            high_mma: Some(high_mma),
            growth_filter: Some(growth_filter),
            validation_error: None,
        },
    )
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

    /// S4: with 19 valid bars, Evaluator returns warmup validation error.
    #[test]
    fn warmup_suppression_s4() {
        let bars = flat_bars(19, 100.0, 10.0);
        let (signal, diag) = evaluate(&bars);
        assert!(!signal);
        assert_eq!(diag.validation_error.as_deref(), Some("Warmup: 19/20"));
    }

    /// S5: 50 valid bars, last bar volume=0 (forward-fill), suppressed.
    #[test]
    fn forward_fill_suppression_s5() {
        let mut bars = flat_bars(50, 100.0, 10.0);
        bars[49].volume = 0.0;
        let (signal, diag) = evaluate(&bars);
        assert!(!signal);
        assert_eq!(diag.validation_error.as_deref(), Some("No trades in last candle (forward-fill)"));
    }

    #[test]
    fn invalid_candle_is_rejected() {
        let mut bars = flat_bars(25, 100.0, 10.0);
        bars[10].high = 50.0; // high below low/open/close
        let (signal, diag) = evaluate(&bars);
        assert!(!signal);
        assert!(diag.validation_error.unwrap().starts_with("Invalid candle 10"));
    }

    #[test]
    fn pure_function_is_deterministic() {
        let bars = flat_bars(25, 100.0, 10.0);
        let (s1, d1) = evaluate(&bars);
        let (s2, d2) = evaluate(&bars);
        assert_eq!(s1, s2);
        assert_eq!(d1, d2);
    }

    #[test]
    fn all_four_predicates_true_yields_signal() {
        // A run of bars with a steady 2-point range builds up enough Wilder
        // TR average to clear high_mma, while the very last bar goes quiet
        // (tight range, thin volume) to clear low_vol and narrow_rng. Flat
        // closes throughout keep growth_filter at zero.
        let n = predicates::GROWTH_LOOKBACK + 2;
        let mut bars: Vec<Bar> = (0..n)
            .map(|i| bar(i as i64 * 10_000, 100.0, 101.0, 99.0, 100.0, 50.0, i as u64))
            .collect();
        let last = bars.len() - 1;
        bars[last] = bar(last as i64 * 10_000, 100.0, 100.0, 100.0, 100.0, 0.01, last as u64);

        let (signal, diag) = evaluate(&bars);
        assert!(diag.validation_error.is_none());
        assert!(signal);
    }
}
