//! End-to-end tests on simulated observations.
//!
//! Events are drawn with `simulation::simulate_events`, so every test is
//! reproducible through its seed.
//!
//! Run: cargo test --test timing_pipeline

use std::path::{Path, PathBuf};
use xtiming_core::artifact::{Artifact, ArtifactStore, JsonStore};
use xtiming_core::config::{AnalysisConfig, BatchConfig, SpectrumConfig};
use xtiming_core::events::{EventList, ObservationInfo};
use xtiming_core::gti::IntervalSet;
use xtiming_core::pipeline::{lightcurve_for_events, pds_batch, pds_for_lightcurve};
use xtiming_core::simulation::{simulate_events, RateModel};
use xtiming_core::TimingError;

// ─── Helpers ────────────────────────────────────────────────────────────────

fn info(instrument: &str, t_start: f64, t_stop: f64) -> ObservationInfo {
    ObservationInfo {
        instrument: instrument.to_string(),
        mjd_ref: 55197.00076601852,
        t_start,
        t_stop,
        ..Default::default()
    }
}

fn pulsar(frequency: f64, seed: u64) -> EventList {
    let gtis = IntervalSet::from_pairs(&[(0.0, 1000.0), (1200.0, 2200.0)]).unwrap();
    simulate_events(
        &gtis,
        &RateModel::Sinusoidal {
            rate: 20.0,
            pulsed_fraction: 0.3,
            frequency,
            fdot: 0.0,
        },
        info("FPMA", 0.0, 2200.0),
        Some(seed),
    )
    .unwrap()
}

fn noise(gtis: &[(f64, f64)], rate: f64, seed: u64) -> EventList {
    let gtis = IntervalSet::from_pairs(gtis).unwrap();
    let (t_start, t_stop) = (gtis.first_start().unwrap(), gtis.last_stop().unwrap());
    simulate_events(
        &gtis,
        &RateModel::Constant { rate },
        info("FPMB", t_start, t_stop),
        Some(seed),
    )
    .unwrap()
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("xtiming-{}-{name}", std::process::id()))
}

// ─── Periodicity search ─────────────────────────────────────────────────────

#[cfg(feature = "statistics")]
mod search {
    use super::*;
    use xtiming_core::config::SearchConfig;
    use xtiming_core::fitting::FitCurve;
    use xtiming_core::search::{search_events, FitOutcome, SearchKind};

    fn config(kind: SearchKind) -> SearchConfig {
        SearchConfig {
            kind,
            freq_min: 0.45,
            freq_max: 0.55,
            nbin: 16,
            harmonics: 2,
            fit_candidates: true,
            curve: FitCurve::Sinc,
            ..Default::default()
        }
    }

    #[test]
    fn test_epoch_folding_recovers_pulsar() {
        let events = pulse_train();
        let result = search_events(&events, &config(SearchKind::EpochFolding)).unwrap();

        let threshold = result.threshold.expect("candidates were thresholded");
        let (best, stat) = result.best_candidate().expect("pulsar detected");
        assert!(stat > threshold);
        assert!((best - 0.5).abs() < 2.0 * result.step, "best {best}");
        assert!(result.false_alarm_probability(stat).unwrap() < 1e-6);

        assert_eq!(result.fits.len(), result.peaks.len());
        assert_eq!(result.fits[0].frequency, best);
        if let FitOutcome::Fitted(fit) = &result.fits[0].outcome {
            assert!((fit.mean - 0.5).abs() < 2.0 / result.obs_length, "fit {}", fit.mean);
        }
        assert_eq!(result.info.instrument, "FPMA");
    }

    #[test]
    fn test_z2n_agrees_with_epoch_folding() {
        let events = pulse_train();
        let ef = search_events(&events, &config(SearchKind::EpochFolding)).unwrap();
        let z2 = search_events(&events, &config(SearchKind::Z2n)).unwrap();

        assert_eq!(ef.frequencies.len(), z2.frequencies.len());
        let (f_ef, _) = ef.best_candidate().unwrap();
        let (f_z2, _) = z2.best_candidate().unwrap();
        assert!((f_ef - f_z2).abs() <= ef.step + 1e-12);
        assert_eq!(z2.dof(), 4);
    }

    #[test]
    fn test_noise_has_no_candidates() {
        let events = noise(&[(0.0, 2000.0)], 20.0, 11);
        let mut cfg = config(SearchKind::Z2n);
        cfg.fit_candidates = false;
        cfg.find_candidates = true;
        cfg.confidence_level = 99.9;
        let result = search_events(&events, &cfg).unwrap();
        assert!(result.peaks.is_empty(), "spurious peaks {:?}", result.peaks);
        assert!(result.fits.is_empty());
    }

    #[test]
    fn test_forced_frequency_is_fitted_without_threshold() {
        let events = pulse_train();
        let mut cfg = config(SearchKind::EpochFolding);
        cfg.fit_frequency = Some(0.5);
        cfg.curve = FitCurve::Gaussian;
        let result = search_events(&events, &cfg).unwrap();
        assert!(result.threshold.is_none());
        assert_eq!(result.peaks, vec![0.5]);
        assert_eq!(result.fits.len(), 1);
    }

    #[test]
    fn test_exposure_correction_keeps_detection() {
        let events = pulse_train();
        let mut cfg = config(SearchKind::EpochFolding);
        cfg.exposure_correction = true;
        cfg.fit_candidates = false;
        cfg.find_candidates = true;
        let result = search_events(&events, &cfg).unwrap();
        assert!(result.exposure_corrected);
        let (best, _) = result.best_candidate().unwrap();
        assert!((best - 0.5).abs() < 2.0 * result.step);
    }

    fn pulse_train() -> EventList {
        pulsar(0.5, 2024)
    }
}

// ─── Spectra ────────────────────────────────────────────────────────────────

#[test]
fn test_welch_pds_of_poisson_noise_is_flat() {
    let events = noise(&[(0.0, 1100.0), (1500.0, 2600.0)], 50.0, 5);
    let config = SpectrumConfig {
        bin_time: 1.0 / 64.0,
        segment_length: 100.0,
        ..Default::default()
    };
    let lc = lightcurve_for_events(&events, &config).unwrap();
    let pds = pds_for_lightcurve(&lc, &config).unwrap();

    assert_eq!(pds.n_segments, 22);
    let mean = pds.power[1..].iter().sum::<f64>() / (pds.len() - 1) as f64;
    assert!((mean - 2.0).abs() < 0.05, "mean Leahy power {mean}");
    assert!(pds.frequencies.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn test_welch_pds_shows_pulsation() {
    let events = pulsar(2.0, 17);
    let config = SpectrumConfig {
        bin_time: 1.0 / 16.0,
        segment_length: 64.0,
        ..Default::default()
    };
    let lc = lightcurve_for_events(&events, &config).unwrap();
    let pds = pds_for_lightcurve(&lc, &config).unwrap();

    let peak = (1..pds.len())
        .max_by(|&a, &b| pds.power[a].total_cmp(&pds.power[b]))
        .unwrap();
    assert!((pds.frequencies[peak] - 2.0).abs() < pds.df());
}

#[test]
fn test_segments_longer_than_gtis_fail() {
    let events = noise(&[(0.0, 50.0), (60.0, 110.0)], 10.0, 8);
    let config = SpectrumConfig {
        bin_time: 0.125,
        segment_length: 64.0,
        ..Default::default()
    };
    let lc = lightcurve_for_events(&events, &config).unwrap();
    match pds_for_lightcurve(&lc, &config) {
        Err(TimingError::NoSegments { segment_length }) => assert_eq!(segment_length, 64.0),
        other => panic!("expected NoSegments, got {other:?}"),
    }
}

// ─── Artifacts and batches ──────────────────────────────────────────────────

#[test]
fn test_spectrum_artifact_survives_disk() {
    let events = noise(&[(0.0, 512.0)], 30.0, 21);
    let config = SpectrumConfig {
        bin_time: 0.125,
        segment_length: 64.0,
        ..Default::default()
    };
    let lc = lightcurve_for_events(&events, &config).unwrap();
    let pds = pds_for_lightcurve(&lc, &config).unwrap();

    let path = temp_path("pds.json");
    let store = JsonStore::pretty();
    store.save(&pds.clone().into(), &path).unwrap();
    let loaded = store.load(&path);
    let _ = std::fs::remove_file(&path);

    match loaded.unwrap() {
        Artifact::Spectrum(back) => {
            assert_eq!(back.n_segments, pds.n_segments);
            assert_eq!(back.info.instrument, "FPMB");
            assert_eq!(back.len(), pds.len());
            for (a, b) in back.power.iter().zip(&pds.power) {
                assert!((a - b).abs() <= 1e-12 * b.abs().max(1.0));
            }
        }
        other => panic!("expected a spectrum, got {}", other.kind()),
    }
}

#[test]
fn test_foreign_json_is_rejected() {
    let path = temp_path("foreign.json");
    std::fs::write(&path, r#"{"format":"other","version":1,"artifact":{}}"#).unwrap();
    let loaded = JsonStore::new().load(&path);
    let _ = std::fs::remove_file(&path);
    assert!(matches!(
        loaded,
        Err(TimingError::UnsupportedArtifact { .. })
    ));
}

#[test]
fn test_batch_reports_each_file() {
    let source = |path: &Path| -> xtiming_core::Result<EventList> {
        match path.file_stem().and_then(|s| s.to_str()) {
            Some("short") => Ok(noise(&[(0.0, 10.0)], 10.0, 1)),
            Some("missing") => Err(TimingError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such file",
            ))),
            _ => Ok(noise(&[(0.0, 300.0)], 10.0, 2)),
        }
    };
    let config = AnalysisConfig {
        spectrum: SpectrumConfig {
            bin_time: 0.25,
            segment_length: 32.0,
            ..Default::default()
        },
        batch: BatchConfig {
            concurrency: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    let paths: Vec<PathBuf> = ["good.evt", "short.evt", "missing.evt", "other.evt"]
        .iter()
        .map(PathBuf::from)
        .collect();

    let results = pds_batch(&source, &paths, &config).unwrap();
    assert_eq!(results.len(), 4);
    for (path, outcome) in &results {
        match path.to_str().unwrap() {
            "good.evt" | "other.evt" => assert_eq!(outcome.as_ref().unwrap().n_segments, 9),
            "short.evt" => assert!(matches!(outcome, Err(TimingError::NoSegments { .. }))),
            "missing.evt" => assert!(matches!(outcome, Err(TimingError::Io(_)))),
            p => panic!("unexpected path {p}"),
        }
    }
}
