//! Small numerical helpers shared across modules.

/// Small epsilon for numerical comparisons (e.g., avoiding division by zero).
pub const NUMERICAL_EPS: f64 = 1e-10;

/// Default convergence tolerance for iterative algorithms.
pub const DEFAULT_CONVERGENCE_TOL: f64 = 1e-6;

/// Find maximal runs of `true` in a boolean condition.
///
/// # Arguments
/// * `condition` - Boolean sequence
///
/// # Returns
/// `(start, end)` index pairs, `end` exclusive, in ascending order
pub fn contiguous_regions(condition: &[bool]) -> Vec<(usize, usize)> {
    let mut regions = Vec::new();
    let mut run_start = None;

    for (i, &c) in condition.iter().enumerate() {
        match (c, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(s)) => {
                regions.push((s, i));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = run_start {
        regions.push((s, condition.len()));
    }

    regions
}

/// Evenly spaced values in the half-open range `[start, stop)`.
///
/// The number of values is `ceil((stop - start) / step)`, so `stop` itself is
/// never included. Values are computed as `start + i * step` to avoid
/// accumulating rounding error.
pub fn arange(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if !(step > 0.0) || !(stop > start) || !start.is_finite() || !stop.is_finite() {
        return Vec::new();
    }
    let n = ((stop - start) / step).ceil() as usize;
    (0..n)
        .map(|i| start + i as f64 * step)
        .filter(|&v| v < stop)
        .collect()
}

/// Index of the element of `values` closest to `target`.
pub fn nearest_index(values: &[f64], target: f64) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .min_by(|(_, a), (_, b)| {
            (*a - target)
                .abs()
                .partial_cmp(&(*b - target).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
}

/// Whether `values` is sorted in non-decreasing order.
#[inline]
pub fn is_non_decreasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] <= w[1])
}

/// Index range `[lo, hi)` of the sorted slice `times` lying in `[start, stop)`.
#[inline]
pub fn window_indices(times: &[f64], start: f64, stop: f64) -> (usize, usize) {
    let lo = times.partition_point(|&t| t < start);
    let hi = times.partition_point(|&t| t < stop);
    (lo, hi.max(lo))
}
