//! Pulse folding and the folding statistics.
//!
//! Events are folded at a trial frequency (and optional first derivative)
//! into a phase profile. The epoch-folding statistic compares that profile
//! with a flat one; the Z²ₙ statistic sums the power of the first `n`
//! harmonics of the event phases.
//!
//! When the observation has gaps that are long compared with the trial
//! period, some phase bins are observed for less time than others. The
//! profile then carries a per-bin relative exposure computed from the GTIs,
//! and both statistics can be evaluated against it.

use crate::error::{Result, TimingError};
use crate::gti::IntervalSet;
use nalgebra::DMatrix;
use std::f64::consts::PI;

/// Phase (in cycles, not wrapped) at time `t` for frequency `f` and
/// derivative `fdot`: `f·t + ½·fdot·t²`.
#[inline]
pub fn pulse_phase(t: f64, frequency: f64, fdot: f64) -> f64 {
    frequency * t + 0.5 * fdot * t * t
}

/// Folded pulse profile.
#[derive(Clone, Debug, PartialEq)]
pub struct FoldedProfile {
    /// Raw event counts per phase bin
    pub counts: Vec<f64>,
    /// Relative exposure per phase bin (maximum 1). All ones when the
    /// profile was folded without exposure information.
    pub exposure: Vec<f64>,
}

impl FoldedProfile {
    #[inline]
    pub fn nbin(&self) -> usize {
        self.counts.len()
    }

    /// Number of folded events.
    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Counts divided by exposure; bins never observed are set to zero.
    pub fn corrected_counts(&self) -> Vec<f64> {
        self.counts
            .iter()
            .zip(&self.exposure)
            .map(|(&c, &e)| if e > 0.0 { c / e } else { 0.0 })
            .collect()
    }
}

/// Fold event times into `nbin` phase bins.
///
/// # Arguments
/// * `times` - Event times, relative to the folding epoch
/// * `frequency` - Trial frequency
/// * `fdot` - Trial frequency derivative
/// * `nbin` - Number of phase bins
/// * `gtis` - When given, the per-bin exposure is derived from these
///   intervals (same time origin as `times`)
pub fn fold_events(
    times: &[f64],
    frequency: f64,
    fdot: f64,
    nbin: usize,
    gtis: Option<&IntervalSet>,
) -> Result<FoldedProfile> {
    if nbin == 0 {
        return Err(TimingError::invalid("number of phase bins must be positive"));
    }
    if !frequency.is_finite() || !fdot.is_finite() {
        return Err(TimingError::invalid("trial frequency must be finite"));
    }

    let mut counts = vec![0.0; nbin];
    for &t in times {
        let phase = pulse_phase(t, frequency, fdot);
        let frac = phase - phase.floor();
        let bin = ((frac * nbin as f64) as usize).min(nbin - 1);
        counts[bin] += 1.0;
    }

    let exposure = match gtis {
        Some(gtis) if !gtis.is_empty() => {
            let phase_intervals: Vec<(f64, f64)> = gtis
                .iter()
                .map(|g| {
                    let a = pulse_phase(g.start, frequency, fdot);
                    let b = pulse_phase(g.stop, frequency, fdot);
                    (a.min(b), a.max(b))
                })
                .collect();
            let raw = phase_exposure(&phase_intervals, nbin);
            let max = raw.iter().copied().fold(0.0, f64::max);
            if max > 0.0 {
                raw.into_iter().map(|e| e / max).collect()
            } else {
                vec![1.0; nbin]
            }
        }
        _ => vec![1.0; nbin],
    };

    Ok(FoldedProfile { counts, exposure })
}

/// Exposure, in cycles, of each of `nbin` phase bins over a set of phase
/// intervals `(start_phase, stop_phase)`.
///
/// Intervals may span many cycles; every full cycle adds `1/nbin` to each
/// bin and the partial cycles at both ends are distributed exactly.
pub fn phase_exposure(phase_intervals: &[(f64, f64)], nbin: usize) -> Vec<f64> {
    let width = 1.0 / nbin as f64;
    let cumulative = |x: f64, j: usize| -> f64 {
        let whole = x.floor();
        let frac = x - whole;
        whole * width + (frac - j as f64 * width).clamp(0.0, width)
    };

    let mut exposure = vec![0.0; nbin];
    for &(start, stop) in phase_intervals {
        if !(stop > start) {
            continue;
        }
        for (j, e) in exposure.iter_mut().enumerate() {
            *e += cumulative(stop, j) - cumulative(start, j);
        }
    }
    exposure
}

// ============================================================================
// Statistics
// ============================================================================

/// Epoch-folding chi-square of a profile against a flat (exposure-weighted)
/// model: `Σ (c_j - μ e_j)² / (μ e_j)` with `μ = Σc / Σe`.
///
/// Bins with zero exposure are ignored. Under the null hypothesis the
/// statistic follows χ² with `nbin - 1` degrees of freedom.
pub fn ef_stat(profile: &FoldedProfile) -> f64 {
    let total_exposure: f64 = profile.exposure.iter().sum();
    let total = profile.total();
    if total <= 0.0 || total_exposure <= 0.0 {
        return 0.0;
    }
    let mu = total / total_exposure;
    profile
        .counts
        .iter()
        .zip(&profile.exposure)
        .filter(|(_, &e)| e > 0.0)
        .map(|(&c, &e)| {
            let expected = mu * e;
            (c - expected).powi(2) / expected
        })
        .sum()
}

/// Unbinned Z²ₙ of a set of phases (in cycles).
///
/// `Z²ₙ = 2/N · Σₖ₌₁ⁿ [(Σ cos 2πkφ)² + (Σ sin 2πkφ)²]`, distributed as χ²
/// with `2n` degrees of freedom for uniform phases. Zero for no events.
pub fn z_n(phases: &[f64], harmonics: usize) -> f64 {
    if phases.is_empty() {
        return 0.0;
    }
    let mut total = 0.0;
    for k in 1..=harmonics {
        let (mut c, mut s) = (0.0, 0.0);
        for &phi in phases {
            let arg = 2.0 * PI * k as f64 * phi;
            c += arg.cos();
            s += arg.sin();
        }
        total += c * c + s * s;
    }
    2.0 / phases.len() as f64 * total
}

/// Z²ₙ of a binned profile, using exposure-corrected counts at the bin
/// centres as weights.
pub fn z_n_binned(profile: &FoldedProfile, harmonics: usize) -> f64 {
    let weights = profile.corrected_counts();
    let norm: f64 = weights.iter().sum();
    if norm <= 0.0 {
        return 0.0;
    }
    let nbin = weights.len() as f64;
    let mut total = 0.0;
    for k in 1..=harmonics {
        let (mut c, mut s) = (0.0, 0.0);
        for (j, &w) in weights.iter().enumerate() {
            let arg = 2.0 * PI * k as f64 * (j as f64 + 0.5) / nbin;
            c += w * arg.cos();
            s += w * arg.sin();
        }
        total += c * c + s * s;
    }
    2.0 / norm * total
}

// ============================================================================
// Phaseogram
// ============================================================================

/// Two-dimensional histogram of pulse phase versus time.
#[derive(Clone, Debug, PartialEq)]
pub struct Phaseogram {
    /// `nph + 1` phase bin edges over `[0, 1]`
    pub phase_edges: Vec<f64>,
    /// `nt + 1` time bin edges
    pub time_edges: Vec<f64>,
    /// Counts, one row per time bin and one column per phase bin
    pub counts: DMatrix<f64>,
}

/// Build a phaseogram of events folded at `frequency` and `fdot`.
///
/// A drifting pulse in the phaseogram indicates a frequency (or derivative)
/// slightly off the true value.
pub fn phaseogram(
    times: &[f64],
    frequency: f64,
    fdot: f64,
    nph: usize,
    nt: usize,
) -> Result<Phaseogram> {
    if nph == 0 || nt == 0 {
        return Err(TimingError::invalid("phaseogram needs at least one bin per axis"));
    }
    let (t0, t1) = match (times.first(), times.last()) {
        (Some(&a), Some(&b)) if b > a => (a, b),
        _ => {
            return Err(TimingError::invalid(
                "phaseogram needs events spanning a positive time range",
            ))
        }
    };

    let dt = (t1 - t0) / nt as f64;
    let time_edges = (0..=nt).map(|i| t0 + i as f64 * dt).collect();
    let phase_edges = (0..=nph).map(|i| i as f64 / nph as f64).collect();

    let mut counts = DMatrix::zeros(nt, nph);
    for &t in times {
        let row = (((t - t0) / dt) as usize).min(nt - 1);
        let phase = pulse_phase(t, frequency, fdot);
        let frac = phase - phase.floor();
        let col = ((frac * nph as f64) as usize).min(nph - 1);
        counts[(row, col)] += 1.0;
    }

    Ok(Phaseogram {
        phase_edges,
        time_edges,
        counts,
    })
}
