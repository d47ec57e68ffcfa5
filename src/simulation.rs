//! Synthetic event lists and light curves.
//!
//! Events are drawn from an inhomogeneous Poisson process whose rate is
//! either constant or sinusoidally modulated at a pulse frequency:
//! ```text
//! r(t) = R · (1 + a · sin 2π(f·t + ½·ḟ·t²))
//! ```
//! where `a` is the pulsed fraction. Modulated events are generated by
//! thinning a homogeneous process of rate `R · (1 + a)`.

use crate::error::{Result, TimingError};
use crate::events::{EventList, ObservationInfo};
use crate::folding::pulse_phase;
use crate::gti::IntervalSet;
use crate::lightcurve::LightCurve;
use rand::prelude::*;
use rand_distr::{Exp, Poisson};
use std::f64::consts::PI;

/// Count-rate model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RateModel {
    Constant {
        rate: f64,
    },
    Sinusoidal {
        rate: f64,
        pulsed_fraction: f64,
        frequency: f64,
        fdot: f64,
    },
}

impl RateModel {
    /// Instantaneous count rate at `t`.
    pub fn rate_at(&self, t: f64) -> f64 {
        match *self {
            RateModel::Constant { rate } => rate,
            RateModel::Sinusoidal {
                rate,
                pulsed_fraction,
                frequency,
                fdot,
            } => {
                let phase = pulse_phase(t, frequency, fdot);
                rate * (1.0 + pulsed_fraction * (2.0 * PI * phase).sin())
            }
        }
    }

    fn max_rate(&self) -> f64 {
        match *self {
            RateModel::Constant { rate } => rate,
            RateModel::Sinusoidal {
                rate,
                pulsed_fraction,
                ..
            } => rate * (1.0 + pulsed_fraction),
        }
    }

    fn validate(&self) -> Result<()> {
        let rate = match *self {
            RateModel::Constant { rate } => rate,
            RateModel::Sinusoidal {
                rate,
                pulsed_fraction,
                frequency,
                fdot,
            } => {
                if !(0.0..=1.0).contains(&pulsed_fraction) {
                    return Err(TimingError::invalid(format!(
                        "pulsed fraction must lie in [0, 1], got {pulsed_fraction}"
                    )));
                }
                if !frequency.is_finite() || !fdot.is_finite() {
                    return Err(TimingError::invalid("pulse frequency must be finite"));
                }
                rate
            }
        };
        if !(rate >= 0.0) || !rate.is_finite() {
            return Err(TimingError::invalid(format!(
                "count rate must be non-negative, got {rate}"
            )));
        }
        Ok(())
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Simulate photon arrival times inside the GTIs.
///
/// # Arguments
/// * `gtis` - Intervals in which events are generated
/// * `model` - Count-rate model (times are absolute, phase zero at `t = 0`)
/// * `info` - Metadata attached to the event list
/// * `seed` - Optional random seed for reproducibility
///
/// # Returns
/// Sorted event list carrying `gtis`
pub fn simulate_events(
    gtis: &IntervalSet,
    model: &RateModel,
    info: ObservationInfo,
    seed: Option<u64>,
) -> Result<EventList> {
    model.validate()?;
    let mut rng = make_rng(seed);
    let max_rate = model.max_rate();
    let mut times = Vec::new();

    if max_rate > 0.0 {
        let waiting = Exp::new(max_rate).map_err(|e| TimingError::invalid(e.to_string()))?;
        for gti in gtis {
            let mut t = gti.start;
            loop {
                t += waiting.sample(&mut rng);
                if t >= gti.stop {
                    break;
                }
                let accept = match model {
                    RateModel::Constant { .. } => true,
                    RateModel::Sinusoidal { .. } => {
                        rng.gen::<f64>() * max_rate < model.rate_at(t)
                    }
                };
                if accept {
                    times.push(t);
                }
            }
        }
    }

    log::debug!("simulated {} events in {} GTIs", times.len(), gtis.len());
    EventList::new(times, gtis.clone(), info)
}

/// Simulate a light curve of Poisson counts on bins of width `dt` covering
/// the GTIs.
pub fn simulate_light_curve(
    gtis: &IntervalSet,
    dt: f64,
    model: &RateModel,
    seed: Option<u64>,
) -> Result<LightCurve> {
    model.validate()?;
    if !(dt > 0.0) {
        return Err(TimingError::invalid(format!("bin time must be positive, got {dt}")));
    }
    let mut rng = make_rng(seed);
    let mut time = Vec::new();
    let mut counts = Vec::new();

    for gti in gtis {
        let n_bins = (gti.length() / dt).floor() as usize;
        for i in 0..n_bins {
            let t = gti.start + (i as f64 + 0.5) * dt;
            let mean = model.rate_at(t) * dt;
            let c: f64 = if mean > 0.0 {
                let dist = Poisson::new(mean).map_err(|e| TimingError::invalid(e.to_string()))?;
                dist.sample(&mut rng)
            } else {
                0.0
            };
            time.push(t);
            counts.push(c);
        }
    }

    LightCurve::new(time, counts, dt, gtis.clone(), ObservationInfo::default())
}
