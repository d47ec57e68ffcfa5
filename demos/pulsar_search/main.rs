//! Example: Searching for a Pulsar
//!
//! Simulates a weakly pulsed source observed in two good time intervals,
//! runs epoch-folding and Z²ₙ searches around the pulse frequency, fits the
//! strongest candidate and folds the events at the best frequency.
//!
//! Run: cargo run --example pulsar_search

use xtiming_core::config::SearchConfig;
use xtiming_core::events::ObservationInfo;
use xtiming_core::fitting::FitCurve;
use xtiming_core::folding::{fold_events, phaseogram};
use xtiming_core::gti::IntervalSet;
use xtiming_core::search::{search_events, FitOutcome, FoldingResult, SearchKind};
use xtiming_core::simulation::{simulate_events, RateModel};

fn print_result(result: &FoldingResult) -> xtiming_core::Result<()> {
    println!(
        "  {} over {} trials (step {:.3e} Hz, T = {:.0} s)",
        result.kind.label(),
        result.frequencies.len(),
        result.step,
        result.obs_length
    );
    if let Some(threshold) = result.threshold {
        println!("  Threshold: {threshold:.2} ({} candidates)", result.peaks.len());
    }
    for (f, s) in result.peaks.iter().zip(&result.peak_stats).take(3) {
        println!(
            "    f = {f:.6} Hz, stat = {s:.1}, FAP = {:.2e}",
            result.false_alarm_probability(*s)?
        );
    }
    for fit in result.fits.iter().take(1) {
        match &fit.outcome {
            FitOutcome::Fitted(p) => println!(
                "  {:?} fit: f = {:.6} ± {:.1e} Hz, amplitude = {:.1}",
                p.curve, p.mean, p.mean_err, p.amplitude
            ),
            FitOutcome::Failed { reason } => println!("  Fit failed: {reason}"),
        }
    }
    Ok(())
}

fn main() -> xtiming_core::Result<()> {
    println!("=== Example: Pulsar Search ===\n");

    let f_true = 0.4123;
    let gtis = IntervalSet::from_pairs(&[(0.0, 1500.0), (2500.0, 4000.0)])?;
    let model = RateModel::Sinusoidal {
        rate: 8.0,
        pulsed_fraction: 0.15,
        frequency: f_true,
        fdot: 0.0,
    };
    let info = ObservationInfo {
        instrument: "FPMA".to_string(),
        t_start: 0.0,
        t_stop: 4000.0,
        ..Default::default()
    };
    let events = simulate_events(&gtis, &model, info, Some(42))?;

    // --- Section 1: Simulated data ---
    println!("--- Simulated Observation ---");
    println!("  {} events, exposure {:.0} s", events.len(), gtis.exposure());
    println!("  True frequency: {f_true} Hz\n");

    // --- Section 2: Epoch folding ---
    println!("--- Epoch Folding ---");
    let config = SearchConfig {
        kind: SearchKind::EpochFolding,
        freq_min: 0.40,
        freq_max: 0.42,
        nbin: 16,
        fit_candidates: true,
        curve: FitCurve::Sinc,
        ..Default::default()
    };
    let ef = search_events(&events, &config)?;
    print_result(&ef)?;

    // --- Section 3: Z²ₙ with exposure correction ---
    println!("\n--- Z²₂ (exposure corrected) ---");
    let z2 = search_events(
        &events,
        &SearchConfig {
            kind: SearchKind::Z2n,
            harmonics: 2,
            exposure_correction: true,
            curve: FitCurve::Gaussian,
            ..config.clone()
        },
    )?;
    print_result(&z2)?;

    // --- Section 4: Folded profile ---
    let Some((best, _)) = ef.best_candidate() else {
        println!("\nNo candidate above threshold");
        return Ok(());
    };
    println!("\n--- Profile at {best:.6} Hz ---");
    let epoch = events.reference_time().unwrap_or(0.0);
    let times: Vec<f64> = events.times.iter().map(|t| t - epoch).collect();
    let profile = fold_events(&times, best, 0.0, 16, None)?;
    let max = profile.counts.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    for (i, c) in profile.counts.iter().enumerate() {
        let bar = "#".repeat((40.0 * c / max).round() as usize);
        println!("  {:>5.3} {c:>6.0} {bar}", i as f64 / 16.0);
    }

    // --- Section 5: Phaseogram drift ---
    println!("\n--- Phaseogram ---");
    let pg = phaseogram(&times, best, 0.0, 16, 8)?;
    for (row, edges) in pg.time_edges.windows(2).enumerate() {
        let peak = (0..pg.counts.ncols())
            .max_by(|&a, &b| pg.counts[(row, a)].total_cmp(&pg.counts[(row, b)]))
            .unwrap_or(0);
        println!(
            "  [{:>6.0}, {:>6.0}) s: pulse peak in phase bin {peak}",
            edges[0], edges[1]
        );
    }

    println!("\n=== Done ===");
    Ok(())
}
