//! Example: Averaged Power and Cross Spectra
//!
//! Simulates two detectors seeing the same pulsed source, bins the events,
//! computes Welch-averaged power spectra and their cross spectrum, and
//! shows rebinning, rms normalization and detection levels.
//!
//! Run: cargo run --example welch_spectra

use xtiming_core::config::SpectrumConfig;
use xtiming_core::events::ObservationInfo;
use xtiming_core::gti::{IntervalSet, SafeMargin};
use xtiming_core::pipeline::{cpds_for_pair, lightcurve_for_events, pds_for_lightcurve};
use xtiming_core::segments::plan_segments;
use xtiming_core::simulation::{simulate_events, RateModel};
use xtiming_core::spectrum::{Normalization, Spectrum};

fn print_top(label: &str, spectrum: &Spectrum, n: usize) {
    let mut idx: Vec<usize> = (1..spectrum.len()).collect();
    idx.sort_by(|&a, &b| spectrum.power[b].total_cmp(&spectrum.power[a]));
    println!("  {label}:");
    for &i in idx.iter().take(n) {
        println!(
            "    f = {:>8.4} Hz  P = {:>10.4}",
            spectrum.frequencies[i], spectrum.power[i]
        );
    }
}

fn main() -> xtiming_core::Result<()> {
    println!("=== Example: Welch Spectra ===\n");

    let model = RateModel::Sinusoidal {
        rate: 30.0,
        pulsed_fraction: 0.1,
        frequency: 3.0,
        fdot: 0.0,
    };
    let gtis_a = IntervalSet::from_pairs(&[(0.0, 900.0), (1000.0, 2000.0)])?;
    let gtis_b = IntervalSet::from_pairs(&[(50.0, 2000.0)])?;
    let detector = |name: &str| ObservationInfo {
        instrument: name.to_string(),
        t_start: 0.0,
        t_stop: 2000.0,
        ..Default::default()
    };
    let events_a = simulate_events(&gtis_a, &model, detector("FPMA"), Some(1))?;
    let events_b = simulate_events(&gtis_b, &model, detector("FPMB"), Some(2))?;

    // --- Section 1: Segment planning ---
    println!("--- Segments ---");
    let config = SpectrumConfig {
        bin_time: 0.01,
        segment_length: 128.0,
        safe_margin: SafeMargin::symmetric(2.0),
        ..Default::default()
    };
    let starts = plan_segments(&gtis_a, config.segment_length)?;
    println!("  {} segments of {} s in FPMA GTIs", starts.len(), config.segment_length);

    // --- Section 2: Power spectra ---
    println!("\n--- Leahy Power Spectra ---");
    let lc_a = lightcurve_for_events(&events_a, &config)?;
    let lc_b = lightcurve_for_events(&events_b, &config)?;
    println!("  Bin time: {} s, mean rate {:.2} ct/s", lc_a.dt, lc_a.mean_rate());
    let pds_a = pds_for_lightcurve(&lc_a, &config)?;
    let pds_b = pds_for_lightcurve(&lc_b, &config)?;
    print_top("FPMA", &pds_a, 3);

    let combined = Spectrum::combine(&[pds_a.clone(), pds_b])?;
    println!("  Combined: {} segments", combined.n_segments);
    let rebinned = combined.rebin(8)?;
    print_top("Combined, rebinned x8", &rebinned, 3);
    match rebinned.detection_level(0.01) {
        Ok(level) => println!("  99% detection level: {level:.3}"),
        Err(e) => println!("  Detection level unavailable: {e}"),
    }

    // --- Section 3: RMS normalization ---
    println!("\n--- Fractional RMS ---");
    let rms = pds_for_lightcurve(
        &lc_a,
        &SpectrumConfig {
            normalization: Normalization::Rms,
            ..config.clone()
        },
    )?;
    let total: f64 = rms.power[1..].iter().sum::<f64>() * rms.df();
    println!("  Integrated (rms/mean)² power: {total:.4}");

    // --- Section 4: Cross spectrum ---
    println!("\n--- Cross Spectrum ---");
    let cross = cpds_for_pair(&lc_a, &lc_b, &config)?;
    println!("  {}: {} segments", cross.info.instrument, cross.n_segments);
    let co = cross.cospectrum();
    let lags = cross.time_lags();
    let peak = (1..cross.len())
        .max_by(|&a, &b| co[a].total_cmp(&co[b]))
        .unwrap_or(1);
    println!(
        "  Cospectrum peak at {:.4} Hz, time lag {:.2e} s",
        cross.frequencies[peak], lags[peak]
    );

    println!("\n=== Done ===");
    Ok(())
}
