//! Photon event lists and the loader interface.
//!
//! Reading FITS files is left to an external collaborator implementing
//! [`EventSource`]; this crate only consumes already-normalized event times,
//! their GTIs and a small metadata record.

use crate::error::{Result, TimingError};
use crate::gti::{Interval, IntervalSet};
use crate::helpers::{is_non_decreasing, window_indices};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Observation metadata carried alongside events and derived products.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationInfo {
    /// Instrument name (e.g. `FPMA`)
    pub instrument: String,
    /// Reference epoch of the time axis, in MJD
    pub mjd_ref: f64,
    /// Nominal observation start, in mission time
    pub t_start: f64,
    /// Nominal observation stop, in mission time
    pub t_stop: f64,
    /// Instrument-specific extras
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Photon arrival times with their good time intervals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventList {
    pub times: Vec<f64>,
    pub gtis: IntervalSet,
    pub info: ObservationInfo,
}

impl EventList {
    /// Create an event list, checking that times are sorted.
    ///
    /// When `gtis` is empty the whole `[t_start, t_stop)` range is assumed good.
    pub fn new(times: Vec<f64>, gtis: IntervalSet, info: ObservationInfo) -> Result<Self> {
        if !is_non_decreasing(&times) {
            return Err(TimingError::invalid("event times must be sorted"));
        }
        let gtis = if gtis.is_empty() && info.t_stop > info.t_start {
            IntervalSet::new(vec![Interval::new(info.t_start, info.t_stop)?])?
        } else {
            gtis
        };
        Ok(EventList { times, gtis, info })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Time origin used for folding: start of the first GTI, or the first event.
    pub fn reference_time(&self) -> Option<f64> {
        self.gtis.first_start().or_else(|| self.times.first().copied())
    }

    /// Keep only the events that fall inside the GTIs.
    pub fn apply_gtis(&self) -> EventList {
        let mask = self.gtis.contains_mask(&self.times);
        let times = self
            .times
            .iter()
            .zip(mask)
            .filter_map(|(&t, keep)| keep.then_some(t))
            .collect();
        EventList {
            times,
            gtis: self.gtis.clone(),
            info: self.info.clone(),
        }
    }

    /// Split into one event list per GTI.
    ///
    /// GTIs shorter than `min_length` and GTIs containing no events are
    /// skipped. Each piece carries its own GTI and start/stop times.
    pub fn split_by_gti(&self, min_length: f64) -> Vec<EventList> {
        let mut pieces = Vec::new();
        for gti in &self.gtis {
            if gti.length() < min_length {
                log::debug!(
                    "GTI [{}, {}] shorter than {min_length}; skipping",
                    gti.start,
                    gti.stop
                );
                continue;
            }
            let (lo, hi) = window_indices(&self.times, gti.start, gti.stop);
            if lo == hi {
                log::debug!("GTI [{}, {}] has no events; skipping", gti.start, gti.stop);
                continue;
            }
            let mut info = self.info.clone();
            info.t_start = gti.start;
            info.t_stop = gti.stop;
            pieces.push(EventList {
                times: self.times[lo..hi].to_vec(),
                gtis: IntervalSet::from_sorted_unchecked(vec![*gti]),
                info,
            });
        }
        pieces
    }
}

/// Loader for event files.
///
/// Implementations are responsible for format details (FITS extensions,
/// column names, TIMEZERO corrections) and must return sorted times.
pub trait EventSource: Sync {
    fn load(&self, path: &Path) -> Result<EventList>;
}

impl<F> EventSource for F
where
    F: Fn(&Path) -> Result<EventList> + Sync,
{
    fn load(&self, path: &Path) -> Result<EventList> {
        self(path)
    }
}
