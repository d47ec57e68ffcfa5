//! Gap-free segmentation of good time intervals.

use crate::error::{Result, TimingError};
use crate::gti::IntervalSet;
use crate::helpers::window_indices;

/// Relative slack allowed when a segment ends exactly on a GTI stop.
const END_TOLERANCE: f64 = 1e-9;

/// Start times of the fixed-length segments that fit inside the GTIs.
///
/// Each interval at least `segment_length` long contributes
/// `start, start + L, start + 2L, ...` as long as the segment ends no later
/// than the interval stop. Shorter intervals contribute nothing. Segments
/// never straddle a gap.
///
/// # Arguments
/// * `gtis` - Good time intervals
/// * `segment_length` - Length of each segment (same units as the GTIs)
///
/// # Returns
/// Segment start times, in interval order
pub fn plan_segments(gtis: &IntervalSet, segment_length: f64) -> Result<Vec<f64>> {
    if !(segment_length > 0.0) || !segment_length.is_finite() {
        return Err(TimingError::invalid(format!(
            "segment length must be positive, got {segment_length}"
        )));
    }

    let slack = segment_length * END_TOLERANCE;
    let mut starts = Vec::new();

    for gti in gtis {
        if gti.length() + slack < segment_length {
            continue;
        }
        let mut k = 0usize;
        loop {
            let t0 = gti.start + k as f64 * segment_length;
            if t0 + segment_length > gti.stop + slack {
                break;
            }
            starts.push(t0);
            k += 1;
        }
    }

    Ok(starts)
}

/// Index ranges of the sorted `times` falling in each segment `[t0, t0 + L)`.
pub fn segment_ranges(
    times: &[f64],
    starts: &[f64],
    segment_length: f64,
) -> Vec<(usize, usize)> {
    starts
        .iter()
        .map(|&t0| window_indices(times, t0, t0 + segment_length))
        .collect()
}

/// Largest bin time not exceeding `bin_time` that fits a power-of-two number
/// of bins into `segment_length`.
///
/// # Example
/// A 512 s FFT with a requested 0.1 s bin gives 512 / 8192 = 0.0625 s.
pub fn optimal_bin_time(segment_length: f64, bin_time: f64) -> Result<f64> {
    if !(segment_length > 0.0) || !(bin_time > 0.0) {
        return Err(TimingError::invalid(
            "segment length and bin time must be positive",
        ));
    }
    let n_bins = (segment_length / bin_time).log2().ceil().exp2();
    Ok(segment_length / n_bins)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_single_interval() {
        let gtis = IntervalSet::from_pairs(&[(0.0, 100.0)]).unwrap();
        let starts = plan_segments(&gtis, 30.0).unwrap();
        assert_eq!(starts, vec![0.0, 30.0, 60.0]);
    }

    #[test]
    fn test_plan_exact_fit_included() {
        let gtis = IntervalSet::from_pairs(&[(10.0, 100.0)]).unwrap();
        let starts = plan_segments(&gtis, 30.0).unwrap();
        assert_eq!(starts, vec![10.0, 40.0, 70.0]);
    }

    #[test]
    fn test_plan_skips_short_intervals() {
        let gtis = IntervalSet::from_pairs(&[(0.0, 20.0), (50.0, 120.0), (130.0, 135.0)]).unwrap();
        let starts = plan_segments(&gtis, 30.0).unwrap();
        assert_eq!(starts, vec![50.0, 80.0]);
    }

    #[test]
    fn test_plan_segments_do_not_overlap_gaps() {
        let gtis = IntervalSet::from_pairs(&[(0.0, 64.0), (70.0, 200.0)]).unwrap();
        let length = 16.0;
        let starts = plan_segments(&gtis, length).unwrap();
        for &s in &starts {
            let inside = gtis
                .iter()
                .any(|g| s >= g.start && s + length <= g.stop + 1e-9);
            assert!(inside, "segment at {s} crosses a gap");
        }
        assert_eq!(starts.len(), 4 + 8);
    }

    #[test]
    fn test_plan_rejects_bad_length() {
        let gtis = IntervalSet::from_pairs(&[(0.0, 10.0)]).unwrap();
        assert!(plan_segments(&gtis, 0.0).is_err());
        assert!(plan_segments(&gtis, -1.0).is_err());
        assert!(plan_segments(&gtis, f64::NAN).is_err());
    }

    #[test]
    fn test_plan_empty_gtis() {
        assert!(plan_segments(&IntervalSet::empty(), 1.0).unwrap().is_empty());
    }

    #[test]
    fn test_segment_ranges() {
        let times: Vec<f64> = (0..10).map(|i| i as f64 + 0.5).collect();
        let ranges = segment_ranges(&times, &[0.0, 5.0], 5.0);
        assert_eq!(ranges, vec![(0, 5), (5, 10)]);
    }

    #[test]
    fn test_optimal_bin_time() {
        let dt = optimal_bin_time(512.0, 0.1).unwrap();
        assert!((dt - 0.0625).abs() < 1e-12);
        let dt = optimal_bin_time(512.0, 0.5).unwrap();
        assert!((dt - 0.5).abs() < 1e-12);
    }
}
