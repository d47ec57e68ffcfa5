//! Per-file analysis chains.
//!
//! Each function takes its configuration explicitly and either returns a
//! complete product or an error; no partial artifact is produced.

use crate::config::{AnalysisConfig, SearchConfig, SpectrumConfig};
use crate::error::{Result, TimingError};
use crate::events::{EventList, EventSource};
use crate::gti::IntervalSet;
use crate::lightcurve::LightCurve;
use crate::search::{search_events, FoldingResult};
use crate::segments::optimal_bin_time;
use crate::spectrum::{welch_cpds, welch_pds, CrossSpectrum, Normalization, Spectrum};
use log::Level;
use std::path::{Path, PathBuf};

/// Bin time actually used for a spectrum configuration.
pub fn effective_bin_time(config: &SpectrumConfig) -> Result<f64> {
    if config.power_of_two_bins {
        optimal_bin_time(config.segment_length, config.bin_time)
    } else {
        Ok(config.bin_time)
    }
}

/// Bin an event list for spectral analysis.
pub fn lightcurve_for_events(events: &EventList, config: &SpectrumConfig) -> Result<LightCurve> {
    config.validate()?;
    let dt = effective_bin_time(config)?;
    LightCurve::from_events(events, dt, config.safe_margin)
}

/// Welch-averaged power spectrum of a light curve.
///
/// Leahy powers are converted to fractional rms when the configuration asks
/// for it, using the light-curve mean rate as source rate.
pub fn pds_for_lightcurve(lc: &LightCurve, config: &SpectrumConfig) -> Result<Spectrum> {
    config.validate()?;
    let mut spectrum = welch_pds(&lc.time, &lc.counts, lc.dt, config.segment_length, &lc.gtis)?;
    spectrum.info = lc.info.clone();
    log::debug!(
        "{}: averaged {} segments of {} s",
        lc.info.instrument,
        spectrum.n_segments,
        config.segment_length
    );

    match config.normalization {
        Normalization::Leahy => Ok(spectrum),
        Normalization::Rms => spectrum.to_rms(lc.mean_rate(), config.background_rate),
        Normalization::None => Err(TimingError::invalid(
            "averaged spectra are Leahy or RMS normalized",
        )),
    }
}

/// Welch-averaged cross spectrum of two light curves on a common grid.
///
/// The GTIs of the two curves are crossed at the bin time and both curves
/// restricted to the result. The remaining bins must coincide.
pub fn cpds_for_pair(
    lc_a: &LightCurve,
    lc_b: &LightCurve,
    config: &SpectrumConfig,
) -> Result<CrossSpectrum> {
    config.validate()?;
    let dt = lc_a.dt;
    if (lc_b.dt - dt).abs() > 1e-9 * dt {
        return Err(TimingError::invalid(format!(
            "light curves have different bin times ({dt} and {})",
            lc_b.dt
        )));
    }

    let gtis = IntervalSet::intersect(&[lc_a.gtis.clone(), lc_b.gtis.clone()], dt)?;
    let a = lc_a.restrict(&gtis);
    let b = lc_b.restrict(&gtis);
    if a.len() != b.len() {
        return Err(TimingError::LengthMismatch {
            what: "cross-spectrum light curves after GTI crossing",
            left: a.len(),
            right: b.len(),
        });
    }
    if a
        .time
        .iter()
        .zip(&b.time)
        .any(|(ta, tb)| (ta - tb).abs() > 1e-6 * dt)
    {
        return Err(TimingError::invalid(
            "light curves are not sampled on a common time grid",
        ));
    }

    let mut cross = welch_cpds(&a.time, &a.counts, &b.counts, dt, config.segment_length, &gtis)?;
    let mut info = a.info.clone();
    info.instrument = format!("{}+{}", lc_a.info.instrument, lc_b.info.instrument);
    cross.info = info;
    Ok(cross)
}

/// Power spectrum of one event file.
pub fn pds_file<S: EventSource + ?Sized>(
    source: &S,
    path: &Path,
    config: &SpectrumConfig,
) -> Result<Spectrum> {
    let events = source.load(path)?;
    let lc = lightcurve_for_events(&events, config)?;
    pds_for_lightcurve(&lc, config)
}

/// Cross spectrum of two simultaneous event files.
///
/// The event GTIs are crossed before binning so both light curves share
/// the same bins.
pub fn cpds_files<S: EventSource + ?Sized>(
    source: &S,
    path_a: &Path,
    path_b: &Path,
    config: &SpectrumConfig,
) -> Result<CrossSpectrum> {
    config.validate()?;
    let mut events_a = source.load(path_a)?;
    let mut events_b = source.load(path_b)?;
    let dt = effective_bin_time(config)?;

    let common = IntervalSet::intersect(&[events_a.gtis.clone(), events_b.gtis.clone()], dt)?;
    events_a.gtis = common.clone();
    events_b.gtis = common;

    let lc_a = LightCurve::from_events(&events_a, dt, config.safe_margin)?;
    let lc_b = LightCurve::from_events(&events_b, dt, config.safe_margin)?;
    cpds_for_pair(&lc_a, &lc_b, config)
}

/// Periodicity search of one event file.
pub fn search_file<S: EventSource + ?Sized>(
    source: &S,
    path: &Path,
    config: &SearchConfig,
) -> Result<FoldingResult> {
    let events = source.load(path)?;
    log::debug!("{}: {} events", path.display(), events.len());
    search_events(&events, config)
}

/// Power spectra of many files on the configured worker pool.
pub fn pds_batch<S: EventSource>(
    source: &S,
    paths: &[PathBuf],
    config: &AnalysisConfig,
) -> Result<Vec<(PathBuf, Result<Spectrum>)>> {
    crate::batch::run_batch(paths, &config.batch, |path| {
        let spectrum = pds_file(source, path, &config.spectrum)?;
        if config.batch.logs(Level::Info) {
            log::info!(
                "{}: averaged {} segments of {} s",
                path.display(),
                spectrum.n_segments,
                spectrum.segment_length
            );
        }
        Ok(spectrum)
    })
}

/// Periodicity searches of many files on the configured worker pool.
pub fn search_batch<S: EventSource>(
    source: &S,
    paths: &[PathBuf],
    config: &AnalysisConfig,
) -> Result<Vec<(PathBuf, Result<FoldingResult>)>> {
    crate::batch::run_batch(paths, &config.batch, |path| {
        let result = search_file(source, path, &config.search)?;
        if config.batch.logs(Level::Info) {
            log::info!(
                "{}: {} over {} trials, {} candidates",
                path.display(),
                result.kind.label(),
                result.frequencies.len(),
                result.peaks.len()
            );
        }
        Ok(result)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use crate::events::ObservationInfo;
    use crate::simulation::{simulate_events, RateModel};
    use log::LevelFilter;
    use std::sync::Mutex;

    /// Records every message the library emits in this test binary.
    struct CaptureLogger;

    static MESSAGES: Mutex<Vec<String>> = Mutex::new(Vec::new());
    static LOGGER: CaptureLogger = CaptureLogger;

    impl log::Log for CaptureLogger {
        fn enabled(&self, _: &log::Metadata) -> bool {
            true
        }

        fn log(&self, record: &log::Record) {
            if let Ok(mut messages) = MESSAGES.lock() {
                messages.push(record.args().to_string());
            }
        }

        fn flush(&self) {}
    }

    fn captured_mentioning(needle: &str) -> usize {
        MESSAGES
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }

    fn spectrum_config() -> SpectrumConfig {
        SpectrumConfig {
            bin_time: 0.25,
            segment_length: 64.0,
            ..Default::default()
        }
    }

    fn events(gtis: &[(f64, f64)], instrument: &str, seed: u64) -> EventList {
        simulate_events(
            &IntervalSet::from_pairs(gtis).unwrap(),
            &RateModel::Constant { rate: 15.0 },
            ObservationInfo {
                instrument: instrument.to_string(),
                ..Default::default()
            },
            Some(seed),
        )
        .unwrap()
    }

    #[test]
    fn test_effective_bin_time() {
        let mut config = SpectrumConfig {
            bin_time: 0.3,
            segment_length: 64.0,
            ..Default::default()
        };
        assert!((effective_bin_time(&config).unwrap() - 0.25).abs() < 1e-12);
        config.power_of_two_bins = false;
        assert_eq!(effective_bin_time(&config).unwrap(), 0.3);
    }

    #[test]
    fn test_pds_for_events() {
        let ev = events(&[(0.0, 640.0)], "FPMA", 1);
        let config = spectrum_config();
        let lc = lightcurve_for_events(&ev, &config).unwrap();
        let pds = pds_for_lightcurve(&lc, &config).unwrap();
        assert_eq!(pds.n_segments, 10);
        assert_eq!(pds.len(), 128);
        assert_eq!(pds.info.instrument, "FPMA");

        let rms = pds_for_lightcurve(
            &lc,
            &SpectrumConfig {
                normalization: Normalization::Rms,
                ..config
            },
        )
        .unwrap();
        assert_eq!(rms.normalization, Normalization::Rms);
    }

    #[test]
    fn test_cpds_files_crosses_gtis() {
        let a = events(&[(0.0, 700.0)], "FPMA", 2);
        let b = events(&[(100.0, 900.0)], "FPMB", 3);
        let source = move |path: &Path| -> Result<EventList> {
            if path.ends_with("a.evt") {
                Ok(a.clone())
            } else {
                Ok(b.clone())
            }
        };
        let cross = cpds_files(
            &source,
            Path::new("a.evt"),
            Path::new("b.evt"),
            &spectrum_config(),
        )
        .unwrap();
        // Common interval roughly [100, 700): 9 segments of 64 s
        assert_eq!(cross.n_segments, 9);
        assert_eq!(cross.info.instrument, "FPMA+FPMB");
        assert_eq!(cross.len(), 128);
    }

    #[test]
    fn test_batch_progress_follows_log_level() {
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(LevelFilter::Trace);

        let ev = events(&[(0.0, 640.0)], "FPMA", 5);
        let source = move |_: &Path| -> Result<EventList> { Ok(ev.clone()) };
        let run = |name: &str, log_level: LevelFilter| {
            let config = AnalysisConfig {
                spectrum: spectrum_config(),
                batch: BatchConfig {
                    concurrency: 1,
                    log_level,
                },
                ..Default::default()
            };
            let results = pds_batch(&source, &[PathBuf::from(name)], &config).unwrap();
            assert!(results[0].1.is_ok());
        };

        run("quiet-progress.evt", LevelFilter::Warn);
        assert_eq!(captured_mentioning("quiet-progress.evt"), 0);

        run("loud-progress.evt", LevelFilter::Info);
        assert_eq!(captured_mentioning("loud-progress.evt: averaged 10 segments"), 1);
    }

    #[test]
    fn test_cpds_rejects_different_bin_times() {
        let ev = events(&[(0.0, 200.0)], "FPMA", 4);
        let lc_a = LightCurve::from_events(&ev, 0.25, Default::default()).unwrap();
        let lc_b = LightCurve::from_events(&ev, 0.5, Default::default()).unwrap();
        assert!(cpds_for_pair(&lc_a, &lc_b, &spectrum_config()).is_err());
    }
}
