//! Good Time Interval (GTI) algebra.
//!
//! A GTI list marks the time ranges during which instrument data are valid.
//! This module provides:
//! - Validated construction of sorted, non-overlapping interval sets
//! - Boolean masks of sample times, with safe margins and minimum lengths
//! - Derivation of intervals from a boolean condition sampled on a time grid
//! - Intersection of the GTIs of several instruments on a common grid
//!
//! All intervals are treated as half-open, `[start, stop)`, when masking.

use crate::error::{Result, TimingError};
use crate::helpers::{arange, contiguous_regions, is_non_decreasing, window_indices};
use serde::{Deserialize, Serialize};

/// A single time interval with `start < stop`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub stop: f64,
}

impl Interval {
    /// Create an interval, rejecting non-finite bounds or `start >= stop`.
    pub fn new(start: f64, stop: f64) -> Result<Self> {
        if !start.is_finite() || !stop.is_finite() {
            return Err(TimingError::invalid(format!(
                "interval bounds must be finite, got [{start}, {stop}]"
            )));
        }
        if start >= stop {
            return Err(TimingError::invalid(format!(
                "interval start must precede stop, got [{start}, {stop}]"
            )));
        }
        Ok(Interval { start, stop })
    }

    /// Length of the interval.
    #[inline]
    pub fn length(&self) -> f64 {
        self.stop - self.start
    }

    /// Half-open membership test.
    #[inline]
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.stop
    }
}

/// Margins removed from both ends of every interval.
///
/// `before` is added to each start, `after` is subtracted from each stop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SafeMargin {
    pub before: f64,
    pub after: f64,
}

impl SafeMargin {
    pub const ZERO: SafeMargin = SafeMargin {
        before: 0.0,
        after: 0.0,
    };

    pub fn new(before: f64, after: f64) -> Self {
        SafeMargin { before, after }
    }

    pub fn symmetric(margin: f64) -> Self {
        SafeMargin {
            before: margin,
            after: margin,
        }
    }
}

/// Ordered list of non-overlapping good time intervals.
///
/// [`IntervalSet::new`] checks ordering and overlap. The masking routines
/// assume the invariant `intervals[i].stop <= intervals[i + 1].start` and do
/// not re-check it: sets built with [`IntervalSet::from_sorted_unchecked`] or
/// deserialized from untrusted artifacts that violate it give undefined masks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    /// Build a validated interval set.
    pub fn new(intervals: Vec<Interval>) -> Result<Self> {
        for (i, gti) in intervals.iter().enumerate() {
            if !(gti.start < gti.stop) {
                return Err(TimingError::invalid(format!(
                    "GTI {i} is empty or inverted: [{}, {}]",
                    gti.start, gti.stop
                )));
            }
        }
        for (i, pair) in intervals.windows(2).enumerate() {
            if pair[0].stop > pair[1].start {
                return Err(TimingError::invalid(format!(
                    "GTIs {} and {} overlap or are out of order",
                    i,
                    i + 1
                )));
            }
        }
        Ok(IntervalSet { intervals })
    }

    /// Build a validated interval set from `(start, stop)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self> {
        let intervals = pairs
            .iter()
            .map(|&(start, stop)| Interval::new(start, stop))
            .collect::<Result<Vec<_>>>()?;
        IntervalSet::new(intervals)
    }

    /// Wrap intervals without checking order or overlap.
    pub fn from_sorted_unchecked(intervals: Vec<Interval>) -> Self {
        IntervalSet { intervals }
    }

    pub fn empty() -> Self {
        IntervalSet::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    #[inline]
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    /// Start of the first interval.
    pub fn first_start(&self) -> Option<f64> {
        self.intervals.first().map(|g| g.start)
    }

    /// Stop of the last interval.
    pub fn last_stop(&self) -> Option<f64> {
        self.intervals.last().map(|g| g.stop)
    }

    /// Total time covered by the intervals.
    pub fn exposure(&self) -> f64 {
        self.intervals.iter().map(Interval::length).sum()
    }

    /// Half-open membership test against every interval.
    pub fn contains(&self, t: f64) -> bool {
        // Intervals are sorted: find the last one starting at or before t.
        let idx = self.intervals.partition_point(|g| g.start <= t);
        idx > 0 && self.intervals[idx - 1].contains(t)
    }

    /// Boolean mask of `times` lying inside the (trimmed) intervals.
    ///
    /// Each interval is shrunk to `[start + margin.before, stop - margin.after)`.
    /// Intervals whose trimmed length is not larger than `min_length` are
    /// dropped. Assumes no overlaps between intervals.
    ///
    /// # Arguments
    /// * `times` - Sample times (any order; sorted input is faster)
    /// * `margin` - Safe margins removed from each interval
    /// * `min_length` - Minimum trimmed length for an interval to be kept
    ///
    /// # Returns
    /// `(mask, trimmed)` where `trimmed` holds the surviving intervals
    pub fn mask(
        &self,
        times: &[f64],
        margin: SafeMargin,
        min_length: f64,
    ) -> (Vec<bool>, IntervalSet) {
        let mut mask = vec![false; times.len()];
        let mut trimmed = Vec::with_capacity(self.intervals.len());
        let sorted = is_non_decreasing(times);

        for gti in &self.intervals {
            let lo = gti.start + margin.before;
            let hi = gti.stop - margin.after;
            if !(hi - lo > min_length) || hi <= lo {
                continue;
            }
            trimmed.push(Interval {
                start: lo,
                stop: hi,
            });

            if sorted {
                let (a, b) = window_indices(times, lo, hi);
                mask[a..b].iter_mut().for_each(|m| *m = true);
            } else {
                for (m, &t) in mask.iter_mut().zip(times) {
                    if t >= lo && t < hi {
                        *m = true;
                    }
                }
            }
        }

        (mask, IntervalSet { intervals: trimmed })
    }

    /// Boolean mask of `times` inside the untrimmed intervals.
    pub fn contains_mask(&self, times: &[f64]) -> Vec<bool> {
        self.mask(times, SafeMargin::ZERO, 0.0).0
    }

    /// Shrink every interval by `margin`, dropping the ones that collapse.
    pub fn with_safe_margin(&self, margin: SafeMargin) -> IntervalSet {
        let intervals = self
            .intervals
            .iter()
            .filter_map(|g| {
                let lo = g.start + margin.before;
                let hi = g.stop - margin.after;
                (hi > lo).then_some(Interval {
                    start: lo,
                    stop: hi,
                })
            })
            .collect();
        IntervalSet { intervals }
    }

    /// Move every interval by `-origin`, e.g. onto a folding epoch.
    pub fn shifted(&self, origin: f64) -> IntervalSet {
        let intervals = self
            .intervals
            .iter()
            .map(|g| Interval {
                start: g.start - origin,
                stop: g.stop - origin,
            })
            .collect();
        IntervalSet { intervals }
    }

    /// Parts of the intervals inside `[start, stop)`.
    pub fn clipped(&self, start: f64, stop: f64) -> IntervalSet {
        let intervals = self
            .intervals
            .iter()
            .filter_map(|g| {
                let lo = g.start.max(start);
                let hi = g.stop.min(stop);
                (lo < hi).then_some(Interval { start: lo, stop: hi })
            })
            .collect();
        IntervalSet { intervals }
    }

    /// Build GTIs from the runs where `condition` holds.
    ///
    /// A run covering samples `i0..i1` becomes the interval
    /// `[times[i0] + margin.before, times[min(i1, n - 1)] - margin.after]`:
    /// the interval ends on the first sample after the run, so that masking
    /// the result with half-open semantics reproduces the run. Runs whose
    /// interval has non-positive length after the margins are discarded.
    ///
    /// # Arguments
    /// * `times` - Sample times, strictly increasing
    /// * `condition` - Validity flag of each sample
    /// * `margin` - Safe margins removed from each interval
    pub fn from_condition(
        times: &[f64],
        condition: &[bool],
        margin: SafeMargin,
    ) -> Result<IntervalSet> {
        if times.len() != condition.len() {
            return Err(TimingError::LengthMismatch {
                what: "times and condition",
                left: times.len(),
                right: condition.len(),
            });
        }
        let n = times.len();
        let mut intervals = Vec::new();

        for (i0, i1) in contiguous_regions(condition) {
            let t0 = times[i0] + margin.before;
            let t1 = times[i1.min(n - 1)] - margin.after;
            if t1 - t0 <= 0.0 {
                continue;
            }
            intervals.push(Interval {
                start: t0,
                stop: t1,
            });
        }

        Ok(IntervalSet { intervals })
    }

    /// Common good time intervals of several interval sets.
    ///
    /// Every set is sampled on a shared grid spanning all inputs with step
    /// `time_resolution`, using the step itself as the trailing safe margin.
    /// The masks are combined with a logical AND and converted back with
    /// [`IntervalSet::from_condition`]. Results are therefore exact only to
    /// within one grid step. A single input is returned unchanged.
    pub fn intersect(sets: &[IntervalSet], time_resolution: f64) -> Result<IntervalSet> {
        match sets.len() {
            0 => return Ok(IntervalSet::empty()),
            1 => return Ok(sets[0].clone()),
            _ => {}
        }
        if !(time_resolution > 0.0) || !time_resolution.is_finite() {
            return Err(TimingError::invalid(format!(
                "time resolution must be positive, got {time_resolution}"
            )));
        }
        if sets.iter().any(IntervalSet::is_empty) {
            return Ok(IntervalSet::empty());
        }

        let start = sets
            .iter()
            .filter_map(IntervalSet::first_start)
            .fold(f64::INFINITY, f64::min);
        let stop = sets
            .iter()
            .filter_map(IntervalSet::last_stop)
            .fold(f64::NEG_INFINITY, f64::max);

        let grid = arange(start, stop, time_resolution);
        let margin = SafeMargin::new(0.0, time_resolution);

        let mut combined = vec![true; grid.len()];
        for set in sets {
            let (mask, _) = set.mask(&grid, margin, 0.0);
            for (c, m) in combined.iter_mut().zip(mask) {
                *c &= m;
            }
        }

        IntervalSet::from_condition(&grid, &combined, SafeMargin::ZERO)
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a Interval;
    type IntoIter = std::slice::Iter<'a, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}
