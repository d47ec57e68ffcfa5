//! Detection levels and false-alarm probabilities of periodogram statistics.
//!
//! Leahy powers of pure noise, epoch-folding chi-squares and Z²ₙ values all
//! follow chi-squared distributions under the null hypothesis. The
//! distribution comes from `statrs` when the `statistics` feature is enabled;
//! otherwise every function here returns
//! [`TimingError::DependencyUnavailable`].

use crate::error::{Result, TimingError};

/// Survival function `P(X > x)` of a chi-squared variable with `dof` degrees
/// of freedom.
pub fn chi2_sf(x: f64, dof: f64) -> Result<f64> {
    check_dof(dof)?;
    if x.is_nan() {
        return Err(TimingError::invalid("chi-squared statistic is NaN"));
    }
    backend::sf(x, dof)
}

/// Inverse survival function: the `x` with `P(X > x) = p`.
///
/// Solved by bisection on the survival function rather than inverting the
/// CDF, which keeps precision for the tiny tail probabilities produced by
/// large trial counts.
pub fn chi2_isf(p: f64, dof: f64) -> Result<f64> {
    check_dof(dof)?;
    if !(p > 0.0 && p < 1.0) {
        return Err(TimingError::invalid(format!(
            "tail probability must lie in (0, 1), got {p}"
        )));
    }

    let mut lo = 0.0;
    let mut hi = dof.max(1.0);
    while backend::sf(hi, dof)? > p {
        lo = hi;
        hi *= 2.0;
        if !hi.is_finite() {
            return Err(TimingError::invalid(format!(
                "no finite chi-squared quantile for p = {p}"
            )));
        }
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if backend::sf(mid, dof)? > p {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-12 * hi.max(1.0) {
            break;
        }
    }
    Ok(0.5 * (lo + hi))
}

fn check_dof(dof: f64) -> Result<()> {
    if !(dof > 0.0) || !dof.is_finite() {
        return Err(TimingError::invalid(format!(
            "degrees of freedom must be positive, got {dof}"
        )));
    }
    Ok(())
}

fn check_epsilon(epsilon: f64) -> Result<()> {
    if !(epsilon > 0.0 && epsilon < 1.0) {
        return Err(TimingError::invalid(format!(
            "epsilon must lie in (0, 1), got {epsilon}"
        )));
    }
    Ok(())
}

fn check_count(value: usize, what: &str) -> Result<()> {
    if value == 0 {
        return Err(TimingError::invalid(format!("{what} must be at least 1")));
    }
    Ok(())
}

// ============================================================================
// Leahy power spectra
// ============================================================================

/// Leahy power exceeded by chance with probability `epsilon` among `n_bins`
/// independent frequencies.
///
/// The power of an average of `n_averaged` spectra rebinned by `n_rebin`
/// follows `χ²(2·n_averaged·n_rebin) / (n_averaged·n_rebin)`.
///
/// # Arguments
/// * `n_bins` - Number of frequencies searched (trials)
/// * `epsilon` - False-alarm probability
/// * `n_averaged` - Number of spectra averaged
/// * `n_rebin` - Number of adjacent bins averaged
pub fn detection_level(
    n_bins: usize,
    epsilon: f64,
    n_averaged: usize,
    n_rebin: usize,
) -> Result<f64> {
    check_count(n_bins, "number of bins")?;
    check_count(n_averaged, "number of averaged spectra")?;
    check_count(n_rebin, "rebin factor")?;
    check_epsilon(epsilon)?;

    let m = (n_averaged * n_rebin) as f64;
    Ok(chi2_isf(epsilon / n_bins as f64, 2.0 * m)? / m)
}

/// Probability that a Leahy power of `level` arises by chance in any of
/// `n_bins` frequencies, capped at 1.
pub fn probability_of_power(
    level: f64,
    n_bins: usize,
    n_averaged: usize,
    n_rebin: usize,
) -> Result<f64> {
    check_count(n_bins, "number of bins")?;
    check_count(n_averaged, "number of averaged spectra")?;
    check_count(n_rebin, "rebin factor")?;

    let m = (n_averaged * n_rebin) as f64;
    let single = chi2_sf(level * m, 2.0 * m)?;
    Ok((n_bins as f64 * single).min(1.0))
}

/// Confidence `1 - probability_of_power` that a Leahy power is not noise.
pub fn detection_confidence(
    level: f64,
    n_bins: usize,
    n_averaged: usize,
    n_rebin: usize,
) -> Result<f64> {
    Ok(1.0 - probability_of_power(level, n_bins, n_averaged, n_rebin)?)
}

// ============================================================================
// Folding statistics
// ============================================================================

/// χ² statistic with `dof` degrees of freedom exceeded by chance with
/// probability `epsilon` over `n_trials` frequencies.
pub fn chi2_detection_level(dof: usize, epsilon: f64, n_trials: usize) -> Result<f64> {
    check_count(dof, "degrees of freedom")?;
    check_count(n_trials, "number of trials")?;
    check_epsilon(epsilon)?;
    chi2_isf(epsilon / n_trials as f64, dof as f64)
}

/// Chance probability of a χ² statistic with `dof` degrees of freedom over
/// `n_trials` frequencies, capped at 1.
pub fn chi2_false_alarm_probability(stat: f64, dof: usize, n_trials: usize) -> Result<f64> {
    check_count(dof, "degrees of freedom")?;
    check_count(n_trials, "number of trials")?;
    Ok((n_trials as f64 * chi2_sf(stat, dof as f64)?).min(1.0))
}

/// Epoch-folding statistic exceeded by chance with probability `epsilon`
/// over `n_trials` frequencies (χ² with `nbin - 1` dof).
pub fn fold_detection_level(nbin: usize, epsilon: f64, n_trials: usize) -> Result<f64> {
    if nbin < 2 {
        return Err(TimingError::invalid("folding needs at least 2 phase bins"));
    }
    chi2_detection_level(nbin - 1, epsilon, n_trials)
}

/// Chance probability of an epoch-folding statistic over `n_trials` frequencies.
pub fn fold_false_alarm_probability(stat: f64, nbin: usize, n_trials: usize) -> Result<f64> {
    if nbin < 2 {
        return Err(TimingError::invalid("folding needs at least 2 phase bins"));
    }
    chi2_false_alarm_probability(stat, nbin - 1, n_trials)
}

/// Z²ₙ value exceeded by chance with probability `epsilon` over `n_trials`
/// frequencies (χ² with `2n` dof).
pub fn z2n_detection_level(harmonics: usize, epsilon: f64, n_trials: usize) -> Result<f64> {
    check_count(harmonics, "number of harmonics")?;
    chi2_detection_level(2 * harmonics, epsilon, n_trials)
}

/// Chance probability of a Z²ₙ value over `n_trials` frequencies.
pub fn z2n_false_alarm_probability(z2: f64, harmonics: usize, n_trials: usize) -> Result<f64> {
    check_count(harmonics, "number of harmonics")?;
    chi2_false_alarm_probability(z2, 2 * harmonics, n_trials)
}

#[cfg(feature = "statistics")]
mod backend {
    use crate::error::{Result, TimingError};
    use statrs::distribution::{ChiSquared, ContinuousCDF};

    pub(super) fn sf(x: f64, dof: f64) -> Result<f64> {
        if x <= 0.0 {
            return Ok(1.0);
        }
        let dist = ChiSquared::new(dof).map_err(|e| TimingError::invalid(e.to_string()))?;
        Ok(dist.sf(x))
    }
}

#[cfg(not(feature = "statistics"))]
mod backend {
    use crate::error::{Result, TimingError};

    pub(super) fn sf(_x: f64, _dof: f64) -> Result<f64> {
        Err(TimingError::DependencyUnavailable("statistics"))
    }
}

#[cfg(all(test, feature = "statistics"))]
mod tests {
    use super::*;

    #[test]
    fn test_chi2_two_dof_closed_form() {
        // sf(x; 2) = exp(-x/2)
        for &x in &[0.5, 2.0, 10.0, 30.0] {
            let sf = chi2_sf(x, 2.0).unwrap();
            assert!((sf - (-x / 2.0f64).exp()).abs() < 1e-10);
        }
        let x = chi2_isf(1e-4, 2.0).unwrap();
        assert!((x - (-2.0 * 1e-4f64.ln())).abs() < 1e-6, "isf = {x}");
    }

    #[test]
    fn test_chi2_isf_inverts_sf() {
        for &dof in &[1.0, 4.0, 31.0, 127.0] {
            for &p in &[0.5, 1e-3, 1e-9] {
                let x = chi2_isf(p, dof).unwrap();
                let back = chi2_sf(x, dof).unwrap();
                assert!((back - p).abs() < 1e-5 * p, "dof {dof} p {p}: {back}");
            }
        }
    }

    #[test]
    fn test_detection_level_single_spectrum() {
        let level = detection_level(100, 0.01, 1, 1).unwrap();
        assert!(level.is_finite());
        assert!(level > 2.0);
        // 2 dof: isf(1e-4) = -2 ln(1e-4)
        assert!((level - 18.420680743952367).abs() < 1e-6);
    }

    #[test]
    fn test_detection_level_decreases_with_averaging() {
        let one = detection_level(1000, 0.01, 1, 1).unwrap();
        let many = detection_level(1000, 0.01, 64, 1).unwrap();
        assert!(many < one);
        assert!(many > 2.0);
    }

    #[test]
    fn test_probability_of_power_round_trip() {
        for &(n, m, r) in &[(100usize, 1usize, 1usize), (512, 10, 4)] {
            let level = detection_level(n, 0.01, m, r).unwrap();
            let p = probability_of_power(level, n, m, r).unwrap();
            assert!((p - 0.01).abs() < 1e-6, "p = {p}");
            let c = detection_confidence(level, n, m, r).unwrap();
            assert!((c - 0.99).abs() < 1e-6);
        }
    }

    #[test]
    fn test_probability_of_power_capped() {
        assert_eq!(probability_of_power(0.0, 1000, 1, 1).unwrap(), 1.0);
    }

    #[test]
    fn test_fold_and_z2n_levels() {
        let ef = fold_detection_level(16, 0.01, 1000).unwrap();
        let p = fold_false_alarm_probability(ef, 16, 1000).unwrap();
        assert!((p - 0.01).abs() < 1e-6);

        let z = z2n_detection_level(1, 0.01, 1).unwrap();
        assert!((z - (-2.0 * 0.01f64.ln())).abs() < 1e-6);
        let p = z2n_false_alarm_probability(z, 1, 1).unwrap();
        assert!((p - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_chi2_level_matches_named_statistics() {
        let generic = chi2_detection_level(15, 0.01, 1000).unwrap();
        let ef = fold_detection_level(16, 0.01, 1000).unwrap();
        assert!((generic - ef).abs() < 1e-9);

        // Summing two segments doubles the dof and raises the level
        let summed = chi2_detection_level(30, 0.01, 1000).unwrap();
        assert!(summed > ef);
        let p = chi2_false_alarm_probability(summed, 30, 1000).unwrap();
        assert!((p - 0.01).abs() < 1e-6);
        assert!(chi2_detection_level(0, 0.01, 10).is_err());
        assert!(chi2_false_alarm_probability(5.0, 0, 10).is_err());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(detection_level(0, 0.01, 1, 1).is_err());
        assert!(detection_level(10, 0.0, 1, 1).is_err());
        assert!(detection_level(10, 1.0, 1, 1).is_err());
        assert!(chi2_isf(0.5, 0.0).is_err());
        assert!(fold_detection_level(1, 0.01, 10).is_err());
        assert!(z2n_detection_level(0, 0.01, 10).is_err());
    }
}

#[cfg(all(test, not(feature = "statistics")))]
mod tests {
    use super::*;

    #[test]
    fn test_backend_missing() {
        assert!(matches!(
            detection_level(100, 0.01, 1, 1),
            Err(TimingError::DependencyUnavailable(_))
        ));
    }
}
