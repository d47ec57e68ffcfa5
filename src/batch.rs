//! Multi-file batch execution.
//!
//! Files are processed independently on a pool of `concurrency` workers.
//! A failure in one file is reported next to its path and does not affect
//! the others. Results arrive in completion order.

use crate::artifact::Artifact;
use crate::config::BatchConfig;
use crate::error::Result;
use crate::slice_maybe_parallel;
use log::Level;
#[cfg(feature = "parallel")]
use rayon::iter::ParallelIterator;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Run `job` on every path and wait for all of them.
///
/// # Arguments
/// * `paths` - Input files
/// * `config` - Worker count and log verbosity
/// * `job` - Per-file analysis
///
/// # Returns
/// One `(path, result)` pair per input, in completion order. The outer
/// error is reserved for an invalid configuration or a pool that cannot
/// be started.
pub fn run_batch<T, F>(
    paths: &[PathBuf],
    config: &BatchConfig,
    job: F,
) -> Result<Vec<(PathBuf, Result<T>)>>
where
    T: Send,
    F: Fn(&Path) -> Result<T> + Sync + Send,
{
    config.validate()?;
    let (tx, rx) = mpsc::channel();

    let work = || {
        slice_maybe_parallel!(paths).for_each(|path| {
            if config.logs(Level::Info) {
                log::info!("processing {}", path.display());
            }
            let outcome = job(path);
            if let Err(e) = &outcome {
                if config.logs(Level::Warn) {
                    log::warn!("{}: {e}", path.display());
                }
            }
            // The receiver outlives every worker.
            let _ = tx.send((path.clone(), outcome));
        });
    };

    #[cfg(feature = "parallel")]
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.concurrency)
            .build()
            .map_err(|e| crate::error::TimingError::WorkerPool(e.to_string()))?;
        pool.install(work);
    }
    #[cfg(not(feature = "parallel"))]
    work();

    drop(tx);
    let results: Vec<_> = rx.into_iter().collect();
    if config.logs(Level::Info) {
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        log::info!("batch finished: {} files, {failed} failed", results.len());
    }
    Ok(results)
}

/// Group artifacts by instrument, each group ordered by observation start.
pub fn sort_by_instrument(artifacts: Vec<Artifact>) -> BTreeMap<String, Vec<Artifact>> {
    let mut groups: BTreeMap<String, Vec<Artifact>> = BTreeMap::new();
    for artifact in artifacts {
        groups
            .entry(artifact.info().instrument.clone())
            .or_default()
            .push(artifact);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.info().t_start.total_cmp(&b.info().t_start));
    }
    groups
}
