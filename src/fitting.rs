//! Candidate peak fitting in folding periodograms.
//!
//! A coherent signal of frequency `f₀` observed for a time `T` produces a
//! peak in the periodogram shaped like `sinc²(π (f - f₀) T)`. When `T` is
//! not known a Gaussian is fitted instead. Both models are fitted with
//! Levenberg–Marquardt on the `nalgebra` normal equations, and parameter
//! errors come from the covariance `(JᵀJ)⁻¹ · SSR / (m - p)`.

use crate::error::{Result, TimingError};
use crate::helpers::{nearest_index, DEFAULT_CONVERGENCE_TOL};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Peak model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitCurve {
    /// `A · sinc²(π (f - μ) T)`, main-lobe width `1/T`
    #[default]
    Sinc,
    /// `A · exp(-(f - μ)² / 2σ²)`
    Gaussian,
}

/// Fitted peak parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakFit {
    pub curve: FitCurve,
    /// Level subtracted from the statistic before fitting
    pub baseline: f64,
    pub amplitude: f64,
    /// Best-fit peak frequency
    pub mean: f64,
    /// Gaussian σ, or the sinc² main-lobe width `1/T` (held fixed)
    pub width: f64,
    pub amplitude_err: f64,
    pub mean_err: f64,
    /// `None` when the width was not a free parameter
    pub width_err: Option<f64>,
    pub iterations: usize,
}

/// Levenberg–Marquardt settings.
#[derive(Clone, Debug)]
pub struct FitSettings {
    pub max_iterations: usize,
    /// Relative parameter change below which the fit has converged
    pub tolerance: f64,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: DEFAULT_CONVERGENCE_TOL,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

// ============================================================================
// Public fits
// ============================================================================

/// Fit a peak in a periodogram around `center`.
///
/// The initial amplitude is the statistic at the grid point nearest
/// `center`. `baseline` is subtracted from the statistics before fitting.
///
/// # Arguments
/// * `frequencies` - Frequencies of the fitted window
/// * `stats` - Statistic values at those frequencies
/// * `center` - Candidate frequency
/// * `baseline` - Level of the null statistic
/// * `obs_length` - Observation length; selects the sinc² model when given,
///   a Gaussian of initial width `2·df` otherwise
pub fn fit_peak(
    frequencies: &[f64],
    stats: &[f64],
    center: f64,
    baseline: f64,
    obs_length: Option<f64>,
) -> Result<PeakFit> {
    if frequencies.len() != stats.len() {
        return Err(TimingError::LengthMismatch {
            what: "fit frequencies and statistics",
            left: frequencies.len(),
            right: stats.len(),
        });
    }
    let idx = nearest_index(frequencies, center)
        .ok_or_else(|| TimingError::invalid("no frequencies to fit"))?;
    let amplitude = stats[idx];
    let values: Vec<f64> = stats.iter().map(|s| s - baseline).collect();

    let fit = match obs_length {
        Some(length) => fit_sinc(frequencies, &values, amplitude, center, length)?,
        None => {
            let df = match frequencies {
                [a, b, ..] => (b - a).abs(),
                _ => return Err(fit_error(center, "need at least two frequencies")),
            };
            fit_gaussian(frequencies, &values, amplitude, center, 2.0 * df)?
        }
    };
    Ok(PeakFit { baseline, ..fit })
}

/// Fit `A · sinc²(π (f - μ) T)` with `T = obs_length` held fixed.
pub fn fit_sinc(
    frequencies: &[f64],
    values: &[f64],
    amplitude: f64,
    mean: f64,
    obs_length: f64,
) -> Result<PeakFit> {
    if !(obs_length > 0.0) {
        return Err(TimingError::invalid(format!(
            "observation length must be positive, got {obs_length}"
        )));
    }
    let model = |f: f64, p: &DVector<f64>| sinc2_model(f, p[0], p[1], obs_length);
    let solution = levenberg_marquardt(
        frequencies,
        values,
        DVector::from_vec(vec![amplitude, mean]),
        &FitSettings::default(),
        model,
    )
    .map_err(|reason| fit_error(mean, reason))?;

    let fit = PeakFit {
        curve: FitCurve::Sinc,
        baseline: 0.0,
        amplitude: solution.params[0],
        mean: solution.params[1],
        width: 1.0 / obs_length,
        amplitude_err: solution.errors[0],
        mean_err: solution.errors[1],
        width_err: None,
        iterations: solution.iterations,
    };
    check_mean_in_window(frequencies, &fit, mean)?;
    Ok(fit)
}

/// Fit `A · exp(-(f - μ)² / 2σ²)` with all three parameters free.
pub fn fit_gaussian(
    frequencies: &[f64],
    values: &[f64],
    amplitude: f64,
    mean: f64,
    width: f64,
) -> Result<PeakFit> {
    if !(width > 0.0) {
        return Err(TimingError::invalid(format!(
            "initial width must be positive, got {width}"
        )));
    }
    let solution = levenberg_marquardt(
        frequencies,
        values,
        DVector::from_vec(vec![amplitude, mean, width]),
        &FitSettings::default(),
        |f, p| gaussian_model(f, p[0], p[1], p[2]),
    )
    .map_err(|reason| fit_error(mean, reason))?;

    let fit = PeakFit {
        curve: FitCurve::Gaussian,
        baseline: 0.0,
        amplitude: solution.params[0],
        mean: solution.params[1],
        width: solution.params[2].abs(),
        amplitude_err: solution.errors[0],
        mean_err: solution.errors[1],
        width_err: Some(solution.errors[2]),
        iterations: solution.iterations,
    };
    check_mean_in_window(frequencies, &fit, mean)?;
    Ok(fit)
}

fn fit_error(center_freq: f64, reason: impl Into<String>) -> TimingError {
    TimingError::FitConvergence {
        center_freq,
        reason: reason.into(),
    }
}

fn check_mean_in_window(frequencies: &[f64], fit: &PeakFit, center: f64) -> Result<()> {
    let lo = frequencies.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = frequencies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(fit.mean >= lo && fit.mean <= hi) {
        return Err(fit_error(
            center,
            format!("fitted mean {} left the window [{lo}, {hi}]", fit.mean),
        ));
    }
    Ok(())
}

// ============================================================================
// Models
// ============================================================================

/// Value and gradient (w.r.t. amplitude and mean) of the sinc² peak.
fn sinc2_model(f: f64, amplitude: f64, mean: f64, obs_length: f64) -> (f64, DVector<f64>) {
    let x = PI * (f - mean) * obs_length;
    let (s, ds) = if x.abs() < 1e-8 {
        (1.0, -x / 3.0)
    } else {
        let (sin, cos) = x.sin_cos();
        (sin / x, (x * cos - sin) / (x * x))
    };
    let value = amplitude * s * s;
    let d_amp = s * s;
    let d_mean = amplitude * 2.0 * s * ds * (-PI * obs_length);
    (value, DVector::from_vec(vec![d_amp, d_mean]))
}

/// Value and gradient (w.r.t. amplitude, mean, sigma) of the Gaussian peak.
fn gaussian_model(f: f64, amplitude: f64, mean: f64, sigma: f64) -> (f64, DVector<f64>) {
    let d = f - mean;
    let s2 = sigma * sigma;
    let e = (-d * d / (2.0 * s2)).exp();
    let value = amplitude * e;
    (
        value,
        DVector::from_vec(vec![e, value * d / s2, value * d * d / (s2 * sigma)]),
    )
}

// ============================================================================
// Levenberg–Marquardt
// ============================================================================

struct LmSolution {
    params: DVector<f64>,
    errors: DVector<f64>,
    iterations: usize,
}

/// Residuals `y - model` and the model Jacobian.
fn evaluate<F>(x: &[f64], y: &[f64], params: &DVector<f64>, model: &F) -> (DMatrix<f64>, DVector<f64>)
where
    F: Fn(f64, &DVector<f64>) -> (f64, DVector<f64>),
{
    let m = x.len();
    let mut jacobian = DMatrix::zeros(m, params.len());
    let mut residuals = DVector::zeros(m);
    for (i, (&xi, &yi)) in x.iter().zip(y).enumerate() {
        let (value, grad) = model(xi, params);
        residuals[i] = yi - value;
        jacobian.set_row(i, &grad.transpose());
    }
    (jacobian, residuals)
}

fn levenberg_marquardt<F>(
    x: &[f64],
    y: &[f64],
    initial: DVector<f64>,
    settings: &FitSettings,
    model: F,
) -> std::result::Result<LmSolution, String>
where
    F: Fn(f64, &DVector<f64>) -> (f64, DVector<f64>),
{
    let m = x.len();
    let p = initial.len();
    if y.len() != m {
        return Err(format!("{m} abscissae for {} values", y.len()));
    }
    if m <= p {
        return Err(format!("{m} points cannot constrain {p} parameters"));
    }

    let mut params = initial;
    let (mut jacobian, mut residuals) = evaluate(x, y, &params, &model);
    let mut chi2 = residuals.norm_squared();
    if !chi2.is_finite() {
        return Err("non-finite residuals at the initial guess".to_string());
    }
    let mut lambda = settings.initial_lambda;

    for iter in 0..settings.max_iterations {
        let jt = jacobian.transpose();
        let jtj = &jt * &jacobian;
        let gradient = &jt * &residuals;

        let mut damped = jtj.clone();
        for i in 0..p {
            damped[(i, i)] *= 1.0 + lambda;
        }
        let delta = damped
            .lu()
            .solve(&gradient)
            .ok_or_else(|| "singular normal equations".to_string())?;

        let small_step = delta
            .iter()
            .zip(params.iter())
            .all(|(d, v)| d.abs() <= settings.tolerance * (v.abs() + settings.tolerance));

        let trial = &params + &delta;
        let (trial_jacobian, trial_residuals) = evaluate(x, y, &trial, &model);
        let trial_chi2 = trial_residuals.norm_squared();

        if trial_chi2.is_finite() && trial_chi2 <= chi2 {
            params = trial;
            jacobian = trial_jacobian;
            residuals = trial_residuals;
            chi2 = trial_chi2;
            lambda *= settings.lambda_down;
            if small_step || chi2 == 0.0 {
                return finish(params, &jacobian, chi2, m, iter + 1);
            }
        } else {
            if small_step {
                return finish(params, &jacobian, chi2, m, iter + 1);
            }
            lambda *= settings.lambda_up;
            if lambda > 1e10 {
                return Err("damping grew without reducing the residuals".to_string());
            }
        }
    }

    Err(format!(
        "no convergence after {} iterations",
        settings.max_iterations
    ))
}

fn finish(
    params: DVector<f64>,
    jacobian: &DMatrix<f64>,
    chi2: f64,
    m: usize,
    iterations: usize,
) -> std::result::Result<LmSolution, String> {
    if params.iter().any(|v| !v.is_finite()) {
        return Err("non-finite parameters".to_string());
    }
    let p = params.len();
    let covariance = (jacobian.transpose() * jacobian)
        .try_inverse()
        .ok_or_else(|| "singular covariance matrix".to_string())?;
    let scale = chi2 / (m - p) as f64;
    let errors = DVector::from_fn(p, |i, _| (covariance[(i, i)] * scale).max(0.0).sqrt());
    Ok(LmSolution {
        params,
        errors,
        iterations,
    })
}
