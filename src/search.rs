//! Periodicity searches over a grid of trial frequencies.
//!
//! This module provides:
//! - Epoch-folding and Z²ₙ periodograms of event times
//! - Thresholded candidate detection with a trials-corrected chi-squared level
//! - sinc² or Gaussian fits of the candidate peaks
//!
//! Times passed to [`search`] are relative to the folding epoch; use
//! [`search_events`] to fold an [`EventList`] from the start of its first GTI.
//! Long observations can be cut into fixed windows whose statistics are
//! summed; the sum follows χ² with the per-window dof times the number of
//! windows.

use crate::config::SearchConfig;
use crate::error::{Result, TimingError};
use crate::events::{EventList, ObservationInfo};
use crate::fitting::{fit_peak, FitCurve, PeakFit};
use crate::folding::{ef_stat, fold_events, pulse_phase, z_n, z_n_binned};
use crate::gti::IntervalSet;
use crate::helpers::{arange, contiguous_regions, nearest_index};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Periodogram statistic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    /// Chi-square of the folded profile against a flat one
    #[default]
    EpochFolding,
    /// Rayleigh power summed over `n` harmonics
    Z2n,
}

impl SearchKind {
    /// Short label used in artifact names.
    pub fn label(&self) -> &'static str {
        match self {
            SearchKind::EpochFolding => "EF",
            SearchKind::Z2n => "Z2n",
        }
    }
}

/// Outcome of fitting one candidate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitOutcome {
    Fitted(PeakFit),
    Failed { reason: String },
}

/// Fit attached to a candidate frequency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateFit {
    pub frequency: f64,
    pub outcome: FitOutcome,
}

/// Periodogram with its candidates and their fits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FoldingResult {
    pub kind: SearchKind,
    pub nbin: usize,
    pub harmonics: usize,
    pub fdot: f64,
    pub frequencies: Vec<f64>,
    pub stats: Vec<f64>,
    /// Grid step
    pub step: f64,
    pub oversample: f64,
    /// Time from the folding epoch to the last event
    pub obs_length: f64,
    /// Windows whose statistics were summed
    pub n_segments: usize,
    pub exposure_corrected: bool,
    /// Statistic threshold used by the last candidate search
    pub threshold: Option<f64>,
    /// Candidate frequencies, strongest first
    pub peaks: Vec<f64>,
    pub peak_stats: Vec<f64>,
    /// One entry per fitted candidate
    pub fits: Vec<CandidateFit>,
    pub info: ObservationInfo,
}

// ============================================================================
// Periodograms
// ============================================================================

/// Trial frequencies `freq_min, freq_min + step, ...` strictly below `freq_max`.
pub fn frequency_grid(freq_min: f64, freq_max: f64, step: f64) -> Result<Vec<f64>> {
    if !(step > 0.0) || !step.is_finite() {
        return Err(TimingError::invalid(format!(
            "frequency step must be positive, got {step}"
        )));
    }
    let grid = arange(freq_min, freq_max, step);
    if grid.is_empty() {
        return Err(TimingError::invalid(format!(
            "empty frequency grid [{freq_min}, {freq_max}) with step {step}"
        )));
    }
    Ok(grid)
}

/// Epoch-folding statistic at every trial frequency.
///
/// # Arguments
/// * `times` - Event times relative to the folding epoch
/// * `frequencies` - Trial frequencies
/// * `nbin` - Phase bins of the folded profile
/// * `fdot` - Frequency derivative applied at every trial
/// * `gtis` - When given, phase bins are weighted by their exposure
pub fn epoch_folding_search(
    times: &[f64],
    frequencies: &[f64],
    nbin: usize,
    fdot: f64,
    gtis: Option<&IntervalSet>,
) -> Result<Vec<f64>> {
    frequencies
        .iter()
        .map(|&f| fold_events(times, f, fdot, nbin, gtis).map(|p| ef_stat(&p)))
        .collect()
}

/// Z²ₙ statistic at every trial frequency.
///
/// Without exposure information the statistic is computed from the unbinned
/// event phases. With `gtis`, events are folded into `nbin` bins and the
/// exposure-corrected profile is used instead.
pub fn z_n_search(
    times: &[f64],
    frequencies: &[f64],
    harmonics: usize,
    nbin: usize,
    fdot: f64,
    gtis: Option<&IntervalSet>,
) -> Result<Vec<f64>> {
    if harmonics == 0 {
        return Err(TimingError::invalid("Z²ₙ needs at least one harmonic"));
    }
    match gtis {
        Some(_) => frequencies
            .iter()
            .map(|&f| fold_events(times, f, fdot, nbin, gtis).map(|p| z_n_binned(&p, harmonics)))
            .collect(),
        None => {
            let mut phases = vec![0.0; times.len()];
            Ok(frequencies
                .iter()
                .map(|&f| {
                    for (phi, &t) in phases.iter_mut().zip(times) {
                        *phi = pulse_phase(t, f, fdot);
                    }
                    z_n(&phases, harmonics)
                })
                .collect())
        }
    }
}

/// Run the periodogram described by `config` and process its candidates.
///
/// The observation length `T` is the last event time. The default grid
/// step is `1 / (oversample · T)`. Candidates are thresholded and fitted
/// according to the config flags.
pub fn search(
    times: &[f64],
    gtis: Option<&IntervalSet>,
    config: &SearchConfig,
) -> Result<FoldingResult> {
    config.validate()?;
    let obs_length = match times.last() {
        Some(&t) if t > 0.0 => t,
        _ => {
            return Err(TimingError::invalid(
                "events must extend past the folding epoch",
            ))
        }
    };
    let step = config
        .step
        .unwrap_or(1.0 / (config.oversample * obs_length));
    let frequencies = frequency_grid(config.freq_min, config.freq_max, step)?;
    let exposure_gtis = if config.exposure_correction { gtis } else { None };

    let windows = search_windows(times, config.segment_size);
    log::debug!(
        "{} search over {} trial frequencies in [{}, {}), {} segment(s)",
        config.kind.label(),
        frequencies.len(),
        config.freq_min,
        config.freq_max,
        windows.len()
    );

    let mut stats = vec![0.0; frequencies.len()];
    for window in &windows {
        let segment_times = &times[window.events.clone()];
        let segment_gtis = exposure_gtis.map(|g| g.clipped(window.start, window.stop));
        let segment_stats = match config.kind {
            SearchKind::EpochFolding => epoch_folding_search(
                segment_times,
                &frequencies,
                config.nbin,
                config.fdot,
                segment_gtis.as_ref(),
            )?,
            SearchKind::Z2n => z_n_search(
                segment_times,
                &frequencies,
                config.harmonics,
                config.nbin,
                config.fdot,
                segment_gtis.as_ref(),
            )?,
        };
        for (total, s) in stats.iter_mut().zip(segment_stats) {
            *total += s;
        }
    }

    let mut result = FoldingResult {
        kind: config.kind,
        nbin: config.nbin,
        harmonics: config.harmonics,
        fdot: config.fdot,
        frequencies,
        stats,
        step,
        oversample: config.oversample,
        obs_length,
        n_segments: windows.len(),
        exposure_corrected: exposure_gtis.is_some(),
        threshold: None,
        peaks: Vec::new(),
        peak_stats: Vec::new(),
        fits: Vec::new(),
        info: ObservationInfo::default(),
    };

    if config.thresholds_candidates() {
        result.find_candidates(config.confidence_level)?;
    } else if let Some(f) = config.fit_frequency {
        result.set_candidate(f);
    }
    if config.fit_candidates {
        result.fit_candidates(config.curve, None)?;
    }
    Ok(result)
}

/// Time window of a segmented search and the events inside it.
#[derive(Clone, Debug, PartialEq)]
struct SearchWindow {
    start: f64,
    stop: f64,
    events: Range<usize>,
}

/// Non-empty windows `[k·size, (k+1)·size)` of sorted `times`.
///
/// Events before zero join the first window and the last window is open
/// ended. Without `segment_size` the whole observation is one window.
fn search_windows(times: &[f64], segment_size: Option<f64>) -> Vec<SearchWindow> {
    let whole = SearchWindow {
        start: f64::NEG_INFINITY,
        stop: f64::INFINITY,
        events: 0..times.len(),
    };
    let (size, last) = match (segment_size, times.last()) {
        (Some(size), Some(&last)) if size < last => (size, last),
        _ => return vec![whole],
    };

    let n_windows = (last / size).floor() as usize + 1;
    let mut windows = Vec::with_capacity(n_windows);
    let mut lo = 0;
    for k in 0..n_windows {
        let start = if k == 0 { f64::NEG_INFINITY } else { k as f64 * size };
        let (stop, hi) = if k + 1 == n_windows {
            (f64::INFINITY, times.len())
        } else {
            let stop = (k + 1) as f64 * size;
            (stop, times.partition_point(|&t| t < stop))
        };
        if hi > lo {
            windows.push(SearchWindow {
                start,
                stop,
                events: lo..hi,
            });
        }
        lo = hi;
    }
    windows
}

/// Fold an event list from the start of its first GTI.
pub fn search_events(events: &EventList, config: &SearchConfig) -> Result<FoldingResult> {
    let reference = events
        .reference_time()
        .ok_or_else(|| TimingError::invalid("event list is empty"))?;
    let times: Vec<f64> = events.times.iter().map(|t| t - reference).collect();
    let gtis = events.gtis.shifted(reference);

    let mut result = search(&times, Some(&gtis), config)?;
    result.info = events.info.clone();
    Ok(result)
}

// ============================================================================
// Candidates
// ============================================================================

/// Local maxima of `stats` above the trials-corrected detection threshold.
///
/// The threshold is the χ²(`dof`) value whose tail probability is
/// `(1 - confidence_level/100) / n_trials`. Each contiguous run of values
/// above it contributes its maximum.
///
/// # Returns
/// `(frequencies, statistics)` of the candidates, strongest first
pub fn find_peaks(
    frequencies: &[f64],
    stats: &[f64],
    confidence_level: f64,
    dof: f64,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let threshold = peak_threshold(stats.len(), confidence_level, dof)?;
    Ok(peaks_above(frequencies, stats, threshold))
}

fn peak_threshold(n_trials: usize, confidence_level: f64, dof: f64) -> Result<f64> {
    if !(confidence_level > 0.0 && confidence_level < 100.0) {
        return Err(TimingError::invalid(format!(
            "confidence level must lie in (0, 100), got {confidence_level}"
        )));
    }
    if n_trials == 0 {
        return Err(TimingError::invalid("no statistics to threshold"));
    }
    let epsilon = 1.0 - confidence_level / 100.0;
    stats::chi2_isf(epsilon / n_trials as f64, dof)
}

fn peaks_above(frequencies: &[f64], stats: &[f64], threshold: f64) -> (Vec<f64>, Vec<f64>) {
    let above: Vec<bool> = stats.iter().map(|&s| s > threshold).collect();
    let mut peaks: Vec<(f64, f64)> = contiguous_regions(&above)
        .into_iter()
        .filter_map(|(lo, hi)| {
            (lo..hi)
                .max_by(|&a, &b| stats[a].total_cmp(&stats[b]))
                .map(|i| (frequencies[i], stats[i]))
        })
        .collect();
    peaks.sort_by(|a, b| b.1.total_cmp(&a.1));
    peaks.into_iter().unzip()
}

impl FoldingResult {
    /// Degrees of freedom of the summed statistic under the null hypothesis.
    ///
    /// Zero for a record with fewer than two phase bins or no harmonics,
    /// which can only come from a hand-edited artifact.
    pub fn dof(&self) -> usize {
        let per_segment = match self.kind {
            SearchKind::EpochFolding => self.nbin.saturating_sub(1),
            SearchKind::Z2n => 2 * self.harmonics,
        };
        per_segment * self.n_segments.max(1)
    }

    /// Mean of the statistic for pure noise.
    pub fn null_mean(&self) -> f64 {
        self.dof() as f64
    }

    /// Statistic exceeded by chance with probability `epsilon` anywhere on the grid.
    pub fn detection_level(&self, epsilon: f64) -> Result<f64> {
        let n_trials = self.frequencies.len().max(1);
        stats::chi2_detection_level(self.dof(), epsilon, n_trials)
    }

    /// Chance probability of `stat` anywhere on the grid.
    pub fn false_alarm_probability(&self, stat: f64) -> Result<f64> {
        let n_trials = self.frequencies.len().max(1);
        stats::chi2_false_alarm_probability(stat, self.dof(), n_trials)
    }

    /// Threshold the periodogram and store the candidates.
    pub fn find_candidates(&mut self, confidence_level: f64) -> Result<()> {
        let threshold =
            peak_threshold(self.stats.len(), confidence_level, self.dof() as f64)?;
        let (peaks, peak_stats) = peaks_above(&self.frequencies, &self.stats, threshold);
        log::debug!(
            "{} candidates above {threshold:.2} at {confidence_level}% confidence",
            peaks.len()
        );
        self.threshold = Some(threshold);
        self.peaks = peaks;
        self.peak_stats = peak_stats;
        Ok(())
    }

    /// Use a single forced candidate frequency.
    pub fn set_candidate(&mut self, frequency: f64) {
        let stat = nearest_index(&self.frequencies, frequency)
            .map(|i| self.stats[i])
            .unwrap_or(0.0);
        self.threshold = None;
        self.peaks = vec![frequency];
        self.peak_stats = vec![stat];
    }

    /// Fit every candidate peak.
    ///
    /// Each fit uses the grid points within `5 · oversample · step` of the
    /// candidate. `baseline` defaults to the null mean of the statistic. A
    /// failed fit is recorded as [`FitOutcome::Failed`] and does not stop the
    /// remaining candidates.
    pub fn fit_candidates(&mut self, curve: FitCurve, baseline: Option<f64>) -> Result<()> {
        let baseline = baseline.unwrap_or_else(|| self.null_mean());
        let half_width = 5.0 * self.oversample * self.step;
        let obs_length = match curve {
            FitCurve::Sinc => Some(self.obs_length),
            FitCurve::Gaussian => None,
        };

        let mut fits = Vec::with_capacity(self.peaks.len());
        for &center in &self.peaks {
            let (freqs, stats): (Vec<f64>, Vec<f64>) = self
                .frequencies
                .iter()
                .zip(&self.stats)
                .filter(|(&f, _)| (f - center).abs() < half_width)
                .map(|(&f, &s)| (f, s))
                .unzip();

            let outcome = match fit_peak(&freqs, &stats, center, baseline, obs_length) {
                Ok(fit) => FitOutcome::Fitted(fit),
                Err(e @ TimingError::FitConvergence { .. }) => {
                    log::warn!("{e}");
                    FitOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
                Err(e) if e.is_input_error() => {
                    log::warn!("candidate at {center}: {e}");
                    FitOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
                Err(e) => return Err(e),
            };
            fits.push(CandidateFit {
                frequency: center,
                outcome,
            });
        }
        self.fits = fits;
        Ok(())
    }

    /// Strongest candidate, if any.
    pub fn best_candidate(&self) -> Option<(f64, f64)> {
        self.peaks.first().copied().zip(self.peak_stats.first().copied())
    }
}
