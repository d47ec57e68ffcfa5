//! Fourier power and cross spectra of evenly binned light curves.
//!
//! This module provides:
//! - Raw discrete Fourier transforms with the standard FFT frequency layout
//! - Leahy-normalized power density spectra (PDS) and cross spectra (CPDS)
//! - Welch averaging over gap-free segments planned from the GTIs
//! - Fractional-rms renormalization, linear rebinning and spectrum combination
//!
//! In the Leahy normalization the power of pure Poisson noise follows a
//! chi-squared distribution with 2 degrees of freedom and has mean 2.

use crate::error::{Result, TimingError};
use crate::events::ObservationInfo;
use crate::gti::IntervalSet;
use crate::helpers::is_non_decreasing;
use crate::segments::{plan_segments, segment_ranges};
use crate::stats;
use num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use std::ops::{AddAssign, Mul};

/// Power normalization convention.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// `2 |F|² / N_counts` (Leahy et al. 1983)
    #[default]
    Leahy,
    /// Fractional rms squared per unit frequency
    Rms,
    /// Raw `|F|²`
    None,
}

/// Averaged power density spectrum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// Non-negative frequencies, starting with the zero-frequency bin
    pub frequencies: Vec<f64>,
    pub power: Vec<f64>,
    pub power_err: Option<Vec<f64>>,
    pub normalization: Normalization,
    /// Number of segments averaged
    pub n_segments: usize,
    /// Number of adjacent frequency bins averaged by rebinning
    pub n_rebin: usize,
    pub segment_length: f64,
    pub dt: f64,
    pub info: ObservationInfo,
}

/// Averaged cross power density spectrum of two simultaneous light curves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossSpectrum {
    pub frequencies: Vec<f64>,
    pub power: Vec<Complex<f64>>,
    pub power_err: Option<Vec<Complex<f64>>>,
    pub normalization: Normalization,
    pub n_segments: usize,
    pub segment_length: f64,
    pub dt: f64,
    pub info: ObservationInfo,
}

/// Result of [`welch_average`]: a power spectrum, or a cross spectrum when a
/// second series was supplied.
#[derive(Clone, Debug, PartialEq)]
pub enum WelchSpectrum {
    Power(Spectrum),
    Cross(CrossSpectrum),
}

// ============================================================================
// Single-segment transforms
// ============================================================================

/// Frequencies of the FFT bins of `n` samples spaced by `dt`.
///
/// Layout: zero, positive frequencies ascending, then negative frequencies
/// from the most negative up (the Nyquist bin of an even length is negative).
pub fn fft_frequencies(n: usize, dt: f64) -> Vec<f64> {
    let scale = 1.0 / (n as f64 * dt);
    let n_pos = n.div_ceil(2);
    (0..n)
        .map(|k| {
            if k < n_pos {
                k as f64 * scale
            } else {
                (k as f64 - n as f64) * scale
            }
        })
        .collect()
}

/// Discrete Fourier transform of evenly spaced samples.
///
/// # Returns
/// `(frequencies, coefficients)` in the standard FFT bin layout
pub fn fourier_transform(samples: &[f64], dt: f64) -> Result<(Vec<f64>, Vec<Complex<f64>>)> {
    check_sampling(samples.len(), dt)?;
    let mut planner = FftPlanner::<f64>::new();
    let coefficients = forward_fft(&mut planner, samples);
    Ok((fft_frequencies(samples.len(), dt), coefficients))
}

/// One-sided power spectrum of a single light-curve segment.
///
/// With Leahy normalization a zero-count segment yields an all-zero spectrum.
/// The RMS normalization divides the Leahy powers by the mean count rate.
///
/// # Returns
/// `(frequencies, power)` restricted to non-negative frequencies
pub fn power_spectrum(
    samples: &[f64],
    dt: f64,
    normalization: Normalization,
) -> Result<(Vec<f64>, Vec<f64>)> {
    check_sampling(samples.len(), dt)?;
    let mut planner = FftPlanner::<f64>::new();
    Ok(segment_power(&mut planner, samples, dt, normalization))
}

/// One-sided cross power spectrum `conj(F_a) F_b · 2 / sqrt(N_a N_b)`.
///
/// The normalization uses the geometric mean of the two total counts. A
/// zero total in either series yields an all-zero cross spectrum.
pub fn cross_power_spectrum(
    samples_a: &[f64],
    samples_b: &[f64],
    dt: f64,
) -> Result<(Vec<f64>, Vec<Complex<f64>>)> {
    if samples_a.len() != samples_b.len() {
        return Err(TimingError::LengthMismatch {
            what: "cross-spectrum light curves",
            left: samples_a.len(),
            right: samples_b.len(),
        });
    }
    check_sampling(samples_a.len(), dt)?;
    let mut planner = FftPlanner::<f64>::new();
    Ok(segment_cross_power(&mut planner, samples_a, samples_b, dt))
}

fn check_sampling(n: usize, dt: f64) -> Result<()> {
    if n == 0 {
        return Err(TimingError::invalid("cannot transform an empty series"));
    }
    if !(dt > 0.0) || !dt.is_finite() {
        return Err(TimingError::invalid(format!(
            "sample spacing must be positive, got {dt}"
        )));
    }
    Ok(())
}

fn forward_fft(planner: &mut FftPlanner<f64>, samples: &[f64]) -> Vec<Complex<f64>> {
    let fft = planner.plan_fft_forward(samples.len());
    let mut buffer: Vec<Complex<f64>> = samples.iter().map(|&x| Complex::new(x, 0.0)).collect();
    fft.process(&mut buffer);
    buffer
}

fn segment_power(
    planner: &mut FftPlanner<f64>,
    samples: &[f64],
    dt: f64,
    normalization: Normalization,
) -> (Vec<f64>, Vec<f64>) {
    let n = samples.len();
    let n_pos = n.div_ceil(2);
    let total: f64 = samples.iter().sum();
    let freqs = fft_frequencies(n, dt)[..n_pos].to_vec();

    let scale = match normalization {
        Normalization::None => 1.0,
        _ if total == 0.0 => return (freqs, vec![0.0; n_pos]),
        Normalization::Leahy => 2.0 / total,
        Normalization::Rms => {
            let rate = total / (n as f64 * dt);
            2.0 / total / rate
        }
    };

    let ft = forward_fft(planner, samples);
    let power = ft[..n_pos].iter().map(|c| c.norm_sqr() * scale).collect();
    (freqs, power)
}

fn segment_cross_power(
    planner: &mut FftPlanner<f64>,
    samples_a: &[f64],
    samples_b: &[f64],
    dt: f64,
) -> (Vec<f64>, Vec<Complex<f64>>) {
    let n = samples_a.len();
    let n_pos = n.div_ceil(2);
    let freqs = fft_frequencies(n, dt)[..n_pos].to_vec();

    let total_a: f64 = samples_a.iter().sum();
    let total_b: f64 = samples_b.iter().sum();
    let effective = (total_a * total_b).sqrt();
    if !(effective > 0.0) {
        return (freqs, vec![Complex::new(0.0, 0.0); n_pos]);
    }

    let ft_a = forward_fft(planner, samples_a);
    let ft_b = forward_fft(planner, samples_b);
    let scale = 2.0 / effective;
    let power = ft_a[..n_pos]
        .iter()
        .zip(&ft_b[..n_pos])
        .map(|(a, b)| a.conj() * b * scale)
        .collect();
    (freqs, power)
}

// ============================================================================
// Welch averaging
// ============================================================================

/// Segment-averaged power, generic over real and complex spectra.
struct WelchAccumulator<T> {
    frequencies: Vec<f64>,
    sum: Vec<T>,
    n_segments: usize,
}

/// Run `per_segment` on every usable segment and average the results.
///
/// Segments come from [`plan_segments`]; each covers exactly
/// `round(segment_length / dt)` samples starting at the first sample at or
/// after the segment start. Segments with no samples are skipped silently;
/// segments only partially covered by data are skipped with a warning.
fn welch_accumulate<T, F>(
    time: &[f64],
    dt: f64,
    segment_length: f64,
    gtis: &IntervalSet,
    mut per_segment: F,
) -> Result<WelchAccumulator<T>>
where
    T: Copy + AddAssign + Mul<f64, Output = T>,
    F: FnMut(usize, usize) -> (Vec<f64>, Vec<T>),
{
    check_sampling(time.len(), dt)?;
    if !is_non_decreasing(time) {
        return Err(TimingError::invalid("light curve times must be sorted"));
    }
    if segment_length < dt {
        return Err(TimingError::invalid(format!(
            "segment length {segment_length} is shorter than the bin time {dt}"
        )));
    }

    let n_bins = (segment_length / dt).round() as usize;
    let starts = plan_segments(gtis, segment_length)?;
    let ranges = segment_ranges(time, &starts, segment_length);

    let mut acc: Option<WelchAccumulator<T>> = None;
    for (&t0, (lo, hi)) in starts.iter().zip(ranges) {
        if hi == lo {
            continue;
        }
        if hi - lo < n_bins {
            log::warn!(
                "segment starting at {t0} holds {} of {n_bins} bins; skipping",
                hi - lo
            );
            continue;
        }
        let (freqs, power) = per_segment(lo, lo + n_bins);
        match acc.as_mut() {
            None => {
                acc = Some(WelchAccumulator {
                    frequencies: freqs,
                    sum: power,
                    n_segments: 1,
                })
            }
            Some(a) => {
                for (s, p) in a.sum.iter_mut().zip(power) {
                    *s += p;
                }
                a.n_segments += 1;
            }
        }
    }

    let mut acc = acc.ok_or(TimingError::NoSegments { segment_length })?;
    let inv = 1.0 / acc.n_segments as f64;
    for s in acc.sum.iter_mut() {
        *s = *s * inv;
    }
    log::debug!(
        "averaged {} segments of {n_bins} bins ({} planned)",
        acc.n_segments,
        starts.len()
    );
    Ok(acc)
}

/// Welch-averaged Leahy power density spectrum of a light curve.
///
/// # Arguments
/// * `time` - Bin times (sorted)
/// * `counts` - Counts per bin
/// * `dt` - Bin time
/// * `segment_length` - Length of each FFT segment
/// * `gtis` - Good time intervals used to plan gap-free segments
///
/// # Returns
/// Spectrum with per-bin error `mean / sqrt(n_segments)`
pub fn welch_pds(
    time: &[f64],
    counts: &[f64],
    dt: f64,
    segment_length: f64,
    gtis: &IntervalSet,
) -> Result<Spectrum> {
    if time.len() != counts.len() {
        return Err(TimingError::LengthMismatch {
            what: "light curve time and counts",
            left: time.len(),
            right: counts.len(),
        });
    }
    let mut planner = FftPlanner::<f64>::new();
    let acc = welch_accumulate(time, dt, segment_length, gtis, |lo, hi| {
        segment_power(&mut planner, &counts[lo..hi], dt, Normalization::Leahy)
    })?;

    let norm = (acc.n_segments as f64).sqrt();
    let power_err = acc.sum.iter().map(|p| p / norm).collect();
    Ok(Spectrum {
        frequencies: acc.frequencies,
        power: acc.sum,
        power_err: Some(power_err),
        normalization: Normalization::Leahy,
        n_segments: acc.n_segments,
        n_rebin: 1,
        segment_length,
        dt,
        info: ObservationInfo::default(),
    })
}

/// Welch-averaged cross spectrum of two simultaneous light curves.
pub fn welch_cpds(
    time: &[f64],
    counts_a: &[f64],
    counts_b: &[f64],
    dt: f64,
    segment_length: f64,
    gtis: &IntervalSet,
) -> Result<CrossSpectrum> {
    if counts_a.len() != counts_b.len() {
        return Err(TimingError::LengthMismatch {
            what: "cross-spectrum light curves",
            left: counts_a.len(),
            right: counts_b.len(),
        });
    }
    if time.len() != counts_a.len() {
        return Err(TimingError::LengthMismatch {
            what: "light curve time and counts",
            left: time.len(),
            right: counts_a.len(),
        });
    }
    let mut planner = FftPlanner::<f64>::new();
    let acc = welch_accumulate(time, dt, segment_length, gtis, |lo, hi| {
        segment_cross_power(&mut planner, &counts_a[lo..hi], &counts_b[lo..hi], dt)
    })?;

    let norm = (acc.n_segments as f64).sqrt();
    let power_err = acc.sum.iter().map(|&p| p / norm).collect();
    Ok(CrossSpectrum {
        frequencies: acc.frequencies,
        power: acc.sum,
        power_err: Some(power_err),
        normalization: Normalization::Leahy,
        n_segments: acc.n_segments,
        segment_length,
        dt,
        info: ObservationInfo::default(),
    })
}

/// Welch average of a power spectrum, or of a cross spectrum when `cross`
/// provides a second light curve sampled at the same times.
pub fn welch_average(
    time: &[f64],
    values: &[f64],
    dt: f64,
    segment_length: f64,
    gtis: &IntervalSet,
    cross: Option<&[f64]>,
) -> Result<WelchSpectrum> {
    match cross {
        None => welch_pds(time, values, dt, segment_length, gtis).map(WelchSpectrum::Power),
        Some(other) => {
            welch_cpds(time, values, other, dt, segment_length, gtis).map(WelchSpectrum::Cross)
        }
    }
}

// ============================================================================
// Normalization, rebinning, combination
// ============================================================================

/// Convert Leahy powers to fractional-rms normalization.
///
/// Both power and error are multiplied by `(S + B) / S²`, with `S` the source
/// and `B` the background count rate (default 0).
pub fn rms_normalize(
    power: &[f64],
    power_err: &[f64],
    source_rate: f64,
    background_rate: Option<f64>,
) -> Result<(Vec<f64>, Vec<f64>)> {
    if source_rate == 0.0 {
        return Err(TimingError::ZeroSourceRate);
    }
    let background_rate = background_rate.unwrap_or_else(|| {
        log::debug!("assuming zero background rate");
        0.0
    });
    let factor = (source_rate + background_rate) / (source_rate * source_rate);
    Ok((
        power.iter().map(|p| p * factor).collect(),
        power_err.iter().map(|e| e * factor).collect(),
    ))
}

impl Spectrum {
    #[inline]
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Frequency resolution.
    pub fn df(&self) -> f64 {
        match self.frequencies.as_slice() {
            [a, b, ..] => b - a,
            _ => 1.0 / self.segment_length,
        }
    }

    /// Fractional-rms version of a Leahy spectrum.
    pub fn to_rms(&self, source_rate: f64, background_rate: Option<f64>) -> Result<Spectrum> {
        if self.normalization != Normalization::Leahy {
            return Err(TimingError::invalid(
                "RMS normalization applies to Leahy-normalized spectra only",
            ));
        }
        let err = self
            .power_err
            .clone()
            .unwrap_or_else(|| vec![0.0; self.power.len()]);
        let (power, power_err) = rms_normalize(&self.power, &err, source_rate, background_rate)?;
        Ok(Spectrum {
            power,
            power_err: self.power_err.as_ref().map(|_| power_err),
            normalization: Normalization::Rms,
            ..self.clone()
        })
    }

    /// Average groups of `factor` adjacent bins; the zero-frequency bin is kept apart.
    ///
    /// Trailing bins that do not fill a complete group are dropped.
    pub fn rebin(&self, factor: usize) -> Result<Spectrum> {
        if factor == 0 {
            return Err(TimingError::invalid("rebin factor must be at least 1"));
        }
        if factor == 1 || self.len() < 2 {
            return Ok(self.clone());
        }

        let n_groups = (self.len() - 1) / factor;
        let mut frequencies = Vec::with_capacity(n_groups + 1);
        let mut power = Vec::with_capacity(n_groups + 1);
        let mut power_err = self.power_err.as_ref().map(|_| Vec::with_capacity(n_groups + 1));

        frequencies.push(self.frequencies[0]);
        power.push(self.power[0]);
        if let (Some(out), Some(err)) = (power_err.as_mut(), self.power_err.as_ref()) {
            out.push(err[0]);
        }

        let f = factor as f64;
        for g in 0..n_groups {
            let range = (1 + g * factor)..(1 + (g + 1) * factor);
            frequencies.push(self.frequencies[range.clone()].iter().sum::<f64>() / f);
            power.push(self.power[range.clone()].iter().sum::<f64>() / f);
            if let (Some(out), Some(err)) = (power_err.as_mut(), self.power_err.as_ref()) {
                out.push(err[range].iter().map(|e| e * e).sum::<f64>().sqrt() / f);
            }
        }

        Ok(Spectrum {
            frequencies,
            power,
            power_err,
            n_rebin: self.n_rebin * factor,
            ..self.clone()
        })
    }

    /// Segment-weighted average of spectra computed on the same frequency grid.
    pub fn combine(spectra: &[Spectrum]) -> Result<Spectrum> {
        let first = spectra
            .first()
            .ok_or_else(|| TimingError::invalid("no spectra to combine"))?;
        for s in &spectra[1..] {
            if s.len() != first.len() {
                return Err(TimingError::LengthMismatch {
                    what: "combined spectra",
                    left: first.len(),
                    right: s.len(),
                });
            }
            if s.normalization != first.normalization || s.n_rebin != first.n_rebin {
                return Err(TimingError::invalid(
                    "spectra differ in normalization or rebinning",
                ));
            }
            if (s.segment_length - first.segment_length).abs() > 1e-9 * first.segment_length {
                return Err(TimingError::invalid("spectra differ in segment length"));
            }
        }

        let total: usize = spectra.iter().map(|s| s.n_segments).sum();
        if total == 0 {
            return Err(TimingError::invalid("spectra carry no segments"));
        }
        let mut power = vec![0.0; first.len()];
        for s in spectra {
            let w = s.n_segments as f64 / total as f64;
            for (acc, p) in power.iter_mut().zip(&s.power) {
                *acc += w * p;
            }
        }
        let norm = (total as f64).sqrt();
        let power_err = power.iter().map(|p| p / norm).collect();

        Ok(Spectrum {
            power,
            power_err: Some(power_err),
            n_segments: total,
            ..first.clone()
        })
    }

    /// Leahy power above which a bin is significant at `1 - epsilon`,
    /// accounting for every non-zero frequency as an independent trial.
    pub fn detection_level(&self, epsilon: f64) -> Result<f64> {
        if self.normalization != Normalization::Leahy {
            return Err(TimingError::invalid(
                "detection levels are defined for Leahy-normalized spectra",
            ));
        }
        stats::detection_level(
            self.len().saturating_sub(1).max(1),
            epsilon,
            self.n_segments.max(1),
            self.n_rebin.max(1),
        )
    }
}

impl CrossSpectrum {
    #[inline]
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Real part of the cross spectrum.
    pub fn cospectrum(&self) -> Vec<f64> {
        self.power.iter().map(|c| c.re).collect()
    }

    /// Phase lag of the second series with respect to the first, in radians.
    pub fn phase_lags(&self) -> Vec<f64> {
        self.power.iter().map(|c| c.arg()).collect()
    }

    /// Time lags `phase / (2π f)`; zero at the zero-frequency bin.
    pub fn time_lags(&self) -> Vec<f64> {
        self.frequencies
            .iter()
            .zip(&self.power)
            .map(|(&f, c)| {
                if f > 0.0 {
                    c.arg() / (2.0 * std::f64::consts::PI * f)
                } else {
                    0.0
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_distr::Poisson;
    use std::f64::consts::PI;

    fn poisson_counts(n: usize, rate: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let dist = Poisson::new(rate).unwrap();
        (0..n).map(|_| dist.sample(&mut rng)).collect()
    }

    #[test]
    fn test_fft_frequencies_layout() {
        let f = fft_frequencies(4, 0.5);
        assert_eq!(f, vec![0.0, 0.5, -1.0, -0.5]);
        let f = fft_frequencies(5, 1.0);
        assert_eq!(f, vec![0.0, 0.2, 0.4, -0.4, -0.2]);
    }

    #[test]
    fn test_fourier_transform_dc() {
        let (freqs, ft) = fourier_transform(&[1.0, 1.0, 1.0, 1.0], 1.0).unwrap();
        assert_eq!(freqs.len(), 4);
        assert!((ft[0].re - 4.0).abs() < 1e-12);
        assert!(ft[1..].iter().all(|c| c.norm() < 1e-12));
    }

    #[test]
    fn test_constant_light_curve_has_no_power() {
        let counts = vec![10.0; 1024];
        let (freqs, power) = power_spectrum(&counts, 1.0, Normalization::Leahy).unwrap();
        assert_eq!(freqs.len(), 512);
        assert_eq!(power.len(), 512);
        assert!((power[0] - 2.0 * 10240.0).abs() < 1e-6);
        for &p in &power[1..] {
            assert!(p.abs() < 1e-9, "non-zero power {p}");
        }
        assert!(freqs.iter().all(|&f| f >= 0.0));
    }

    #[test]
    fn test_zero_counts_give_zero_spectrum() {
        let (freqs, power) = power_spectrum(&[0.0; 64], 0.1, Normalization::Leahy).unwrap();
        assert_eq!(freqs.len(), 32);
        assert!(power.iter().all(|&p| p == 0.0));

        let (freqs, cross) = cross_power_spectrum(&[0.0; 7], &[1.0; 7], 1.0).unwrap();
        assert_eq!(freqs.len(), 4);
        assert!(cross.iter().all(|c| c.norm() == 0.0));
    }

    #[test]
    fn test_power_spectrum_empty_input() {
        assert!(power_spectrum(&[], 1.0, Normalization::Leahy).is_err());
        assert!(power_spectrum(&[1.0, 2.0], 0.0, Normalization::Leahy).is_err());
    }

    #[test]
    fn test_leahy_noise_level() {
        let counts = poisson_counts(4096, 20.0, 42);
        let (_, power) = power_spectrum(&counts, 1.0, Normalization::Leahy).unwrap();
        let mean: f64 = power[1..].iter().sum::<f64>() / (power.len() - 1) as f64;
        assert!((mean - 2.0).abs() < 0.15, "Leahy noise mean {mean}");
    }

    #[test]
    fn test_sinusoid_peak_frequency() {
        let n = 256;
        let dt = 0.1;
        let f0 = 1.25; // 32 cycles over 25.6 s: bin 32
        let counts: Vec<f64> = (0..n)
            .map(|i| 100.0 + 30.0 * (2.0 * PI * f0 * i as f64 * dt).sin())
            .collect();
        let (freqs, power) = power_spectrum(&counts, dt, Normalization::Leahy).unwrap();
        let (imax, _) = power
            .iter()
            .enumerate()
            .skip(1)
            .fold((0, f64::MIN), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });
        assert!((freqs[imax] - f0).abs() < 1e-9);
    }

    #[test]
    fn test_cross_spectrum_length_mismatch() {
        let err = cross_power_spectrum(&[1.0, 2.0, 3.0], &[1.0, 2.0], 1.0);
        assert!(matches!(err, Err(TimingError::LengthMismatch { .. })));
    }

    #[test]
    fn test_cross_spectrum_of_identical_series_is_pds() {
        let counts = poisson_counts(128, 5.0, 7);
        let (_, pds) = power_spectrum(&counts, 1.0, Normalization::Leahy).unwrap();
        let (_, cpds) = cross_power_spectrum(&counts, &counts, 1.0).unwrap();
        for (p, c) in pds.iter().zip(&cpds) {
            assert!((p - c.re).abs() < 1e-9 * p.abs().max(1.0));
            assert!(c.im.abs() < 1e-9 * p.abs().max(1.0));
        }
    }

    #[test]
    fn test_rms_normalization_factor() {
        let (p, e) = rms_normalize(&[2.0, 4.0], &[1.0, 1.0], 10.0, Some(5.0)).unwrap();
        // factor = 15 / 100
        assert!((p[0] - 0.3).abs() < 1e-12);
        assert!((p[1] - 0.6).abs() < 1e-12);
        assert!((e[0] - 0.15).abs() < 1e-12);
        assert!(matches!(
            rms_normalize(&[1.0], &[1.0], 0.0, None),
            Err(TimingError::ZeroSourceRate)
        ));
    }

    #[test]
    fn test_rms_matches_leahy_over_rate() {
        let counts = poisson_counts(256, 8.0, 3);
        let dt = 0.5;
        let (_, leahy) = power_spectrum(&counts, dt, Normalization::Leahy).unwrap();
        let (_, rms) = power_spectrum(&counts, dt, Normalization::Rms).unwrap();
        let rate = counts.iter().sum::<f64>() / (counts.len() as f64 * dt);
        for (l, r) in leahy.iter().zip(&rms) {
            assert!((l / rate - r).abs() < 1e-9 * l.abs().max(1.0));
        }
    }

    #[test]
    fn test_welch_pds_segments_and_errors() {
        let dt = 1.0;
        let n = 400;
        let time: Vec<f64> = (0..n).map(|i| i as f64 * dt + 0.5).collect();
        let counts = poisson_counts(n, 10.0, 11);
        let gtis = IntervalSet::from_pairs(&[(0.0, 150.0), (200.0, 400.0)]).unwrap();

        let pds = welch_pds(&time, &counts, dt, 32.0, &gtis).unwrap();
        // 4 segments in the first GTI, 6 in the second
        assert_eq!(pds.n_segments, 10);
        assert_eq!(pds.len(), 16);
        let err = pds.power_err.as_ref().unwrap();
        for (p, e) in pds.power.iter().zip(err) {
            assert!((p / 10f64.sqrt() - e).abs() < 1e-12);
        }
        let mean: f64 = pds.power[1..].iter().sum::<f64>() / (pds.len() - 1) as f64;
        assert!((mean - 2.0).abs() < 0.6, "mean Leahy power {mean}");
    }

    #[test]
    fn test_welch_average_matches_single_segment() {
        let dt = 0.5;
        let time: Vec<f64> = (0..64).map(|i| i as f64 * dt).collect();
        let counts = poisson_counts(64, 4.0, 5);
        let gtis = IntervalSet::from_pairs(&[(0.0, 32.0)]).unwrap();
        let WelchSpectrum::Power(pds) =
            welch_average(&time, &counts, dt, 32.0, &gtis, None).unwrap()
        else {
            panic!("expected a power spectrum");
        };
        let (_, single) = power_spectrum(&counts, dt, Normalization::Leahy).unwrap();
        assert_eq!(pds.n_segments, 1);
        for (a, b) in pds.power.iter().zip(&single) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_welch_skips_empty_segments() {
        let dt = 1.0;
        // Data only cover the first GTI
        let time: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let counts = vec![3.0; 100];
        let gtis = IntervalSet::from_pairs(&[(0.0, 100.0), (500.0, 600.0)]).unwrap();
        let pds = welch_pds(&time, &counts, dt, 25.0, &gtis).unwrap();
        assert_eq!(pds.n_segments, 4);
    }

    #[test]
    fn test_welch_no_segments() {
        let time: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let gtis = IntervalSet::from_pairs(&[(0.0, 10.0)]).unwrap();
        let err = welch_pds(&time, &[1.0; 10], 1.0, 20.0, &gtis);
        assert!(matches!(err, Err(TimingError::NoSegments { .. })));
    }

    #[test]
    fn test_welch_cpds() {
        let dt = 1.0;
        let time: Vec<f64> = (0..128).map(|i| i as f64).collect();
        let a = poisson_counts(128, 10.0, 1);
        let b = poisson_counts(128, 10.0, 2);
        let gtis = IntervalSet::from_pairs(&[(0.0, 128.0)]).unwrap();
        let WelchSpectrum::Cross(cs) =
            welch_average(&time, &a, dt, 32.0, &gtis, Some(&b)).unwrap()
        else {
            panic!("expected a cross spectrum");
        };
        assert_eq!(cs.n_segments, 4);
        assert_eq!(cs.cospectrum().len(), 16);
        assert_eq!(cs.time_lags()[0], 0.0);
        assert!(welch_cpds(&time, &a, &b[..100], dt, 32.0, &gtis).is_err());
    }

    #[test]
    fn test_rebin() {
        let pds = Spectrum {
            frequencies: (0..9).map(|i| i as f64).collect(),
            power: vec![100.0, 1.0, 3.0, 2.0, 4.0, 5.0, 7.0, 0.0, 0.0],
            power_err: Some(vec![1.0; 9]),
            normalization: Normalization::Leahy,
            n_segments: 1,
            n_rebin: 1,
            segment_length: 1.0,
            dt: 0.1,
            info: ObservationInfo::default(),
        };
        let r = pds.rebin(3).unwrap();
        assert_eq!(r.frequencies, vec![0.0, 2.0, 5.0]);
        assert_eq!(r.power, vec![100.0, 2.0, 16.0 / 3.0]);
        assert_eq!(r.n_rebin, 3);
        let e = r.power_err.unwrap();
        assert!((e[1] - 3f64.sqrt() / 3.0).abs() < 1e-12);
        assert!(pds.rebin(0).is_err());
    }

    #[test]
    fn test_combine_weights_by_segments() {
        let base = Spectrum {
            frequencies: vec![0.0, 1.0],
            power: vec![0.0, 2.0],
            power_err: None,
            normalization: Normalization::Leahy,
            n_segments: 1,
            n_rebin: 1,
            segment_length: 16.0,
            dt: 1.0,
            info: ObservationInfo::default(),
        };
        let other = Spectrum {
            power: vec![0.0, 6.0],
            n_segments: 3,
            ..base.clone()
        };
        let c = Spectrum::combine(&[base.clone(), other]).unwrap();
        assert_eq!(c.n_segments, 4);
        assert!((c.power[1] - 5.0).abs() < 1e-12);

        let short = Spectrum {
            frequencies: vec![0.0],
            power: vec![0.0],
            ..base.clone()
        };
        assert!(Spectrum::combine(&[base, short]).is_err());
    }

    #[test]
    fn test_to_rms_requires_leahy() {
        let pds = Spectrum {
            frequencies: vec![0.0, 1.0],
            power: vec![4.0, 2.0],
            power_err: Some(vec![1.0, 1.0]),
            normalization: Normalization::Leahy,
            n_segments: 1,
            n_rebin: 1,
            segment_length: 1.0,
            dt: 0.5,
            info: ObservationInfo::default(),
        };
        let rms = pds.to_rms(2.0, None).unwrap();
        assert_eq!(rms.normalization, Normalization::Rms);
        assert!((rms.power[1] - 1.0).abs() < 1e-12);
        assert!(rms.to_rms(2.0, None).is_err());
    }
}
