//! # xtiming-core
//!
//! Timing analysis of X-ray event data in Rust.
//!
//! This crate provides:
//! - Good-time-interval algebra (masks, safe margins, intersection)
//! - Segment planning for averaged spectra
//! - Welch-averaged power and cross spectra (Leahy and fractional-rms
//!   normalizations), rebinning and combination
//! - Epoch-folding and Z²ₙ periodicity searches with candidate detection
//!   and peak fitting
//! - Chi-squared detection levels and false-alarm probabilities
//! - Event simulation, JSON artifacts and multi-file batch execution
//!
//! ## Conventions
//!
//! Times are in seconds and frequencies in Hz. Intervals are half-open
//! `[start, stop)`. Periodicity searches work on times relative to the first
//! GTI start of the observation.

#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod parallel;

pub mod artifact;
pub mod batch;
pub mod config;
pub mod error;
pub mod events;
pub mod fitting;
pub mod folding;
pub mod gti;
pub mod helpers;
pub mod lightcurve;
pub mod pipeline;
pub mod search;
pub mod segments;
pub mod simulation;
pub mod spectrum;
pub mod stats;

// Re-export commonly used items
pub use error::{Result, TimingError};
pub use helpers::{DEFAULT_CONVERGENCE_TOL, NUMERICAL_EPS};

pub use gti::{Interval, IntervalSet, SafeMargin};
pub use segments::{optimal_bin_time, plan_segments};

pub use events::{EventList, EventSource, ObservationInfo};
pub use lightcurve::LightCurve;

// Re-export spectral types
pub use spectrum::{
    welch_average, welch_cpds, welch_pds, CrossSpectrum, Normalization, Spectrum, WelchSpectrum,
};

// Re-export periodicity search types
pub use fitting::{FitCurve, PeakFit};
pub use folding::{FoldedProfile, Phaseogram};
pub use search::{CandidateFit, FitOutcome, FoldingResult, SearchKind};

pub use artifact::{Artifact, ArtifactStore, JsonStore};
pub use config::{AnalysisConfig, BatchConfig, SearchConfig, SpectrumConfig};
pub use simulation::RateModel;
