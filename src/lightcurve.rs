//! Binned light curves.

use crate::error::{Result, TimingError};
use crate::events::{EventList, ObservationInfo};
use crate::gti::{IntervalSet, SafeMargin};
use crate::helpers::is_non_decreasing;
use serde::{Deserialize, Serialize};

/// Evenly binned counts with their good time intervals.
///
/// `time` holds bin centres. Bins need not be contiguous: after
/// [`LightCurve::apply_gtis`] only the bins inside the GTIs remain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightCurve {
    pub time: Vec<f64>,
    pub counts: Vec<f64>,
    pub dt: f64,
    pub gtis: IntervalSet,
    pub info: ObservationInfo,
}

impl LightCurve {
    /// Wrap existing binned data.
    pub fn new(
        time: Vec<f64>,
        counts: Vec<f64>,
        dt: f64,
        gtis: IntervalSet,
        info: ObservationInfo,
    ) -> Result<Self> {
        if time.len() != counts.len() {
            return Err(TimingError::LengthMismatch {
                what: "light curve time and counts",
                left: time.len(),
                right: counts.len(),
            });
        }
        if time.is_empty() {
            return Err(TimingError::invalid("light curve has no bins"));
        }
        if !(dt > 0.0) {
            return Err(TimingError::invalid(format!("bin time must be positive, got {dt}")));
        }
        if !is_non_decreasing(&time) {
            return Err(TimingError::invalid("light curve times must be sorted"));
        }
        Ok(LightCurve {
            time,
            counts,
            dt,
            gtis,
            info,
        })
    }

    /// Bin an event list.
    ///
    /// The GTIs are first shrunk by `margin`; bins of width `bin_time` then
    /// span from the first remaining GTI start to the last stop, and only the
    /// bins whose centre lies inside a GTI are kept.
    pub fn from_events(events: &EventList, bin_time: f64, margin: SafeMargin) -> Result<Self> {
        if !(bin_time > 0.0) || !bin_time.is_finite() {
            return Err(TimingError::invalid(format!(
                "bin time must be positive, got {bin_time}"
            )));
        }
        let gtis = events.gtis.with_safe_margin(margin);
        let (start, stop) = match (gtis.first_start(), gtis.last_stop()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(TimingError::invalid(
                    "no good time intervals left after applying the safe margin",
                ))
            }
        };

        let n_bins = ((stop - start) / bin_time).floor() as usize;
        if n_bins == 0 {
            return Err(TimingError::invalid(format!(
                "observation span {} is shorter than one bin of {bin_time}",
                stop - start
            )));
        }

        let mut counts = vec![0.0; n_bins];
        for &t in &events.times {
            if t < start {
                continue;
            }
            let idx = ((t - start) / bin_time).floor() as usize;
            if idx >= n_bins {
                break;
            }
            counts[idx] += 1.0;
        }
        let time = (0..n_bins)
            .map(|i| start + (i as f64 + 0.5) * bin_time)
            .collect();

        log::debug!(
            "binned {} events into {n_bins} bins of {bin_time} s",
            events.len()
        );

        let lc = LightCurve {
            time,
            counts,
            dt: bin_time,
            gtis,
            info: events.info.clone(),
        };
        Ok(lc.apply_gtis())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Sum of the counts in all bins.
    pub fn total_counts(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Mean count rate over the bins present.
    pub fn mean_rate(&self) -> f64 {
        if self.counts.is_empty() {
            return 0.0;
        }
        self.total_counts() / (self.counts.len() as f64 * self.dt)
    }

    /// Keep only the bins whose centre lies inside the GTIs.
    pub fn apply_gtis(&self) -> LightCurve {
        let mask = self.gtis.contains_mask(&self.time);
        let (time, counts) = self
            .time
            .iter()
            .zip(&self.counts)
            .zip(mask)
            .filter_map(|((&t, &c), keep)| keep.then_some((t, c)))
            .unzip();
        LightCurve {
            time,
            counts,
            dt: self.dt,
            gtis: self.gtis.clone(),
            info: self.info.clone(),
        }
    }

    /// Restrict to the given intervals (e.g. GTIs crossed with another instrument).
    pub fn restrict(&self, gtis: &IntervalSet) -> LightCurve {
        LightCurve {
            gtis: gtis.clone(),
            ..self.clone()
        }
        .apply_gtis()
    }
}
