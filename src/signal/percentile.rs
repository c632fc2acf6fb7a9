// =============================================================================
// Rolling percentile — linear interpolation over a trailing window
// =============================================================================
//
// Grounded on `examples/original_source/src/signal_processor.py`'s
// `calculate_percentile`, which mirrors `numpy.percentile`'s default
// ("linear") interpolation method. Applied here as a plain pure function
// rather than a numpy call, in the teacher's `indicators/atr.rs` style of a
// free function returning a computed value over a borrowed slice.

/// Percentile of `values` at `pct` (0..=100) using linear interpolation on
/// the sorted ascending sequence, matching numpy's default `"linear"` method.
///
/// Returns `0.0` for an empty slice; callers only invoke this over non-empty
/// windows in practice (the evaluator's warm-up gate guarantees `bars.len()
/// >= WARMUP > 0`).
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    if values.len() == 1 {
        return values[0];
    }

    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;

    if lo == hi {
        return sorted[lo];
    }

    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Rolling percentile at index `i`: the percentile of `series[max(0,
/// i-period+1)..=i]`. Matches the spec's window definition for `low_vol` and
/// `narrow_rng`.
pub fn rolling_percentile(series: &[f64], i: usize, period: usize, pct: f64) -> f64 {
    let start = i.saturating_sub(period.saturating_sub(1));
    percentile(&series[start..=i], pct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_of_single_value() {
        assert_eq!(percentile(&[5.0], 50.0), 5.0);
    }

    #[test]
    fn percentile_median_of_odd_count() {
        assert_eq!(percentile(&[1.0, 2.0, 3.0], 50.0), 2.0);
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        // sorted [1,2,3,4]; 50th percentile rank = 0.5*3 = 1.5 -> between
        // index 1 (2.0) and index 2 (3.0), interpolated = 2.5
        assert_eq!(percentile(&[4.0, 1.0, 3.0, 2.0], 50.0), 2.5);
    }

    #[test]
    fn percentile_zero_and_hundred_are_extremes() {
        let values = [3.0, 1.0, 2.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 100.0), 3.0);
    }

    #[test]
    fn rolling_percentile_window_saturates_at_series_start() {
        let series = [10.0, 20.0, 30.0];
        // period=20 but only 3 values available; window is the whole slice.
        let whole = rolling_percentile(&series, 2, 20, 50.0);
        let direct = percentile(&series, 50.0);
        assert_eq!(whole, direct);
    }
}
