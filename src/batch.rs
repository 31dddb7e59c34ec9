use crate::cache::LoudnessCache;
use crate::error::MeasurementError;
use crate::measure::measure_isolated;
use crate::report::Reporter;
use log::{info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Counts from one batch of measurements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Files that were not in the cache and got measured
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Measures every file in `files` that the cache does not know yet.
///
/// Measurements run on a rayon pool of `num_threads` workers (host
/// parallelism when `None`); results stream back to the calling thread, which
/// is the only one touching `cache` and `reporter`. Failed files are left out
/// of the cache so they are retried on the next run.
///
/// # Arguments
/// * `files` - Canonical paths of all audio files currently on disk
/// * `cache` - Reconciled cache, updated in place
/// * `num_threads` - Worker count, `None` for the rayon default
/// * `meter` - Loudness measurement for a single file
/// * `reporter` - Receives progress and per-file failures
pub fn measure_new_files<M>(
    files: &[PathBuf],
    cache: &mut LoudnessCache,
    num_threads: Option<usize>,
    meter: M,
    reporter: &mut dyn Reporter,
) -> BatchOutcome
where
    M: Fn(&Path) -> Result<f64, MeasurementError> + Sync,
{
    let new_files: Vec<&PathBuf> = files.iter().filter(|f| !cache.contains(f)).collect();
    let mut outcome = BatchOutcome {
        dispatched: new_files.len(),
        ..Default::default()
    };
    if new_files.is_empty() {
        return outcome;
    }
    reporter.batch_started(new_files.len());

    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads.unwrap_or(0))
        .thread_name(|i| format!("loudness-{i}"))
        .build()
    {
        Ok(pool) => {
            info!("Measuring with {} threads.", pool.current_num_threads());
            Some(pool)
        }
        Err(e) => {
            warn!(
                "Failed to configure Rayon thread pool: {}. Using default number of threads.",
                e
            );
            None
        }
    };

    let (tx, rx) = mpsc::channel::<(PathBuf, Result<f64, MeasurementError>)>();
    std::thread::scope(|s| {
        let new_files = &new_files;
        let meter = &meter;
        s.spawn(move || {
            let run = move || {
                new_files.par_iter().for_each_with(tx, |tx, path| {
                    let result = measure_isolated(meter, path);
                    // the receiver lives until every sender is dropped
                    let _ = tx.send(((*path).clone(), result));
                });
            };
            match &pool {
                Some(pool) => pool.install(run),
                None => run(),
            }
        });

        for (path, result) in rx {
            reporter.file_measured(&path, &result);
            match result {
                Ok(lufs) => {
                    cache.insert(path, lufs);
                    outcome.succeeded += 1;
                }
                Err(_) => outcome.failed += 1,
            }
        }
    });

    reporter.batch_finished(&outcome);
    outcome
}
