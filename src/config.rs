//! Analysis configuration.
//!
//! Every stage takes its settings explicitly; nothing is read from
//! process-wide state. The structs deserialize from JSON with every field
//! optional, so a configuration file only needs the values it overrides:
//!
//! ```json
//! {
//!   "spectrum": { "bin_time": 0.0078125, "segment_length": 256 },
//!   "search": { "kind": "z2n", "freq_min": 1.0, "freq_max": 2.0, "harmonics": 2 },
//!   "batch": { "concurrency": 4, "log_level": "info" }
//! }
//! ```

use crate::error::{Result, TimingError};
use crate::fitting::FitCurve;
use crate::gti::SafeMargin;
use crate::search::SearchKind;
use crate::spectrum::Normalization;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Light-curve binning and Welch spectrum settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    /// Requested light-curve bin time
    pub bin_time: f64,
    /// FFT segment length
    pub segment_length: f64,
    pub normalization: Normalization,
    /// Shrink the requested bin time so each segment holds a power of two bins
    pub power_of_two_bins: bool,
    /// Margins removed from every GTI before binning
    pub safe_margin: SafeMargin,
    /// Background count rate used by the RMS normalization
    pub background_rate: Option<f64>,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            bin_time: 1.0 / 128.0,
            segment_length: 512.0,
            normalization: Normalization::Leahy,
            power_of_two_bins: true,
            safe_margin: SafeMargin::ZERO,
            background_rate: None,
        }
    }
}

impl SpectrumConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.bin_time > 0.0) || !self.bin_time.is_finite() {
            return Err(TimingError::invalid(format!(
                "bin_time must be positive, got {}",
                self.bin_time
            )));
        }
        if !(self.segment_length >= self.bin_time) || !self.segment_length.is_finite() {
            return Err(TimingError::invalid(format!(
                "segment_length {} must be at least one bin",
                self.segment_length
            )));
        }
        if self.safe_margin.before < 0.0 || self.safe_margin.after < 0.0 {
            return Err(TimingError::invalid("safe margins must be non-negative"));
        }
        if let Some(b) = self.background_rate {
            if !(b >= 0.0) {
                return Err(TimingError::invalid("background rate must be non-negative"));
            }
        }
        Ok(())
    }
}

/// Periodicity search settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub kind: SearchKind,
    /// Lowest trial frequency (inclusive)
    pub freq_min: f64,
    /// Highest trial frequency (exclusive)
    pub freq_max: f64,
    /// Frequency step; defaults to `1 / (oversample · T_obs)`
    pub step: Option<f64>,
    pub oversample: f64,
    /// Phase bins of the folded profile
    pub nbin: usize,
    /// Harmonics summed by Z²ₙ
    pub harmonics: usize,
    pub fdot: f64,
    /// Weight phase bins by their exposure (slow pulsars, long gaps)
    pub exposure_correction: bool,
    /// Fold windows of this many seconds separately and sum their
    /// statistics; `None` folds the whole observation at once
    pub segment_size: Option<f64>,
    pub find_candidates: bool,
    /// Percent confidence for candidate thresholding, in (0, 100)
    pub confidence_level: f64,
    pub fit_candidates: bool,
    pub curve: FitCurve,
    /// Fit this frequency instead of thresholded candidates
    pub fit_frequency: Option<f64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            kind: SearchKind::EpochFolding,
            freq_min: 0.1,
            freq_max: 1.0,
            step: None,
            oversample: 2.0,
            nbin: 128,
            harmonics: 2,
            fdot: 0.0,
            exposure_correction: false,
            segment_size: None,
            find_candidates: false,
            confidence_level: 99.0,
            fit_candidates: false,
            curve: FitCurve::Sinc,
            fit_frequency: None,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.freq_min > 0.0) || !(self.freq_max > self.freq_min) {
            return Err(TimingError::invalid(format!(
                "frequency range must satisfy 0 < freq_min < freq_max, got [{}, {})",
                self.freq_min, self.freq_max
            )));
        }
        if let Some(step) = self.step {
            if !(step > 0.0) || !step.is_finite() {
                return Err(TimingError::invalid(format!(
                    "frequency step must be positive, got {step}"
                )));
            }
        }
        if !(self.oversample > 0.0) {
            return Err(TimingError::invalid("oversample must be positive"));
        }
        if self.nbin < 2 {
            return Err(TimingError::invalid("nbin must be at least 2"));
        }
        if self.harmonics == 0 {
            return Err(TimingError::invalid("harmonics must be at least 1"));
        }
        if !self.fdot.is_finite() {
            return Err(TimingError::invalid("fdot must be finite"));
        }
        if let Some(size) = self.segment_size {
            if !(size > 0.0) || !size.is_finite() {
                return Err(TimingError::invalid(format!(
                    "segment size must be positive, got {size}"
                )));
            }
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 100.0) {
            return Err(TimingError::invalid(format!(
                "confidence level must lie in (0, 100), got {}",
                self.confidence_level
            )));
        }
        Ok(())
    }

    /// Whether candidates should be thresholded, given the fitting options.
    ///
    /// Fitting implies thresholding unless a forced frequency is supplied.
    pub fn thresholds_candidates(&self) -> bool {
        if self.fit_candidates {
            self.fit_frequency.is_none()
        } else {
            self.find_candidates
        }
    }
}

/// Multi-file batch settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads; 1 runs sequentially
    pub concurrency: usize,
    /// Most verbose level of per-file progress messages
    pub log_level: LevelFilter,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            log_level: LevelFilter::Warn,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(TimingError::invalid("concurrency must be at least 1"));
        }
        Ok(())
    }

    /// True when messages at `level` pass the configured filter.
    #[inline]
    pub fn logs(&self, level: log::Level) -> bool {
        level <= self.log_level
    }
}

/// Complete configuration of an analysis run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub spectrum: SpectrumConfig,
    pub search: SearchConfig,
    pub batch: BatchConfig,
}

impl AnalysisConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.spectrum.validate()?;
        self.search.validate()?;
        self.batch.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        AnalysisConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json() {
        let json = r#"{
            "spectrum": { "segment_length": 256.0 },
            "search": { "kind": "z2n", "freq_min": 1.0, "freq_max": 2.0, "curve": "gaussian" },
            "batch": { "concurrency": 3, "log_level": "info" }
        }"#;
        let config = AnalysisConfig::from_json_str(json).unwrap();
        assert_eq!(config.spectrum.segment_length, 256.0);
        assert_eq!(config.spectrum.bin_time, 1.0 / 128.0);
        assert_eq!(config.search.kind, SearchKind::Z2n);
        assert_eq!(config.search.curve, FitCurve::Gaussian);
        assert_eq!(config.search.nbin, 128);
        assert_eq!(config.search.segment_size, None);
        assert_eq!(config.batch.concurrency, 3);
        assert_eq!(config.batch.log_level, LevelFilter::Info);
        assert!(config.batch.logs(log::Level::Info));
        assert!(!config.batch.logs(log::Level::Debug));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let json = r#"{ "search": { "freq_min": 2.0, "freq_max": 1.0 } }"#;
        assert!(AnalysisConfig::from_json_str(json).is_err());

        let json = r#"{ "batch": { "concurrency": 0 } }"#;
        assert!(AnalysisConfig::from_json_str(json).is_err());

        let json = r#"{ "search": { "confidence_level": 100.0 } }"#;
        assert!(AnalysisConfig::from_json_str(json).is_err());

        let json = r#"{ "search": { "segment_size": 0.0 } }"#;
        assert!(AnalysisConfig::from_json_str(json).is_err());

        assert!(matches!(
            AnalysisConfig::from_json_str("{ not json"),
            Err(TimingError::Serialization(_))
        ));
    }

    #[test]
    fn test_thresholding_rules() {
        let mut search = SearchConfig {
            fit_candidates: true,
            ..Default::default()
        };
        assert!(search.thresholds_candidates());
        search.fit_frequency = Some(1.5);
        assert!(!search.thresholds_candidates());
        search.fit_candidates = false;
        search.find_candidates = true;
        assert!(search.thresholds_candidates());
    }
}
