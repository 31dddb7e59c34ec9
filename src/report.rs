use crate::batch::BatchOutcome;
use crate::cache::LoudnessCache;
use crate::error::{CacheError, MeasurementError};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::{Path, PathBuf};

/// One line of the final report
#[derive(Debug, Clone, PartialEq)]
pub struct SongLoudness {
    pub path: PathBuf,
    /// Integrated loudness in LUFS
    pub lufs: f64,
}

/// Pairs every current file with its cached loudness, quietest first.
///
/// Files without a cached value (failed measurements) are left out. Returns
/// `None` when there is nothing to report.
pub fn sort_by_loudness(cache: &LoudnessCache, files: &[PathBuf]) -> Option<Vec<SongLoudness>> {
    let mut songs: Vec<SongLoudness> = files
        .iter()
        .filter_map(|path| {
            cache.get(path).map(|lufs| SongLoudness {
                path: path.clone(),
                lufs,
            })
        })
        .collect();
    if songs.is_empty() {
        return None;
    }
    songs.sort_by(|a, b| a.lufs.total_cmp(&b.lufs));
    Some(songs)
}

/// Receives everything a run has to tell.
///
/// Passed explicitly into [`crate::sort_songs_by_loudness`] so callers decide
/// where progress and results go. Only [`Reporter::songs_sorted`] is
/// required.
pub trait Reporter {
    fn scan_finished(&mut self, _source_dir: &Path, _found: usize) {}
    fn cache_pruned(&mut self, _removed: usize) {}
    fn cache_error(&mut self, _err: &CacheError) {}
    fn no_new_files(&mut self) {}
    fn batch_started(&mut self, _total: usize) {}
    fn file_measured(&mut self, _path: &Path, _result: &Result<f64, MeasurementError>) {}
    fn batch_finished(&mut self, _outcome: &BatchOutcome) {}
    /// Final report; an empty slice means no songs could be listed
    fn songs_sorted(&mut self, songs: &[SongLoudness]);
}

/// Writes the run to the `log` facade with a progress bar for measurements
#[derive(Default)]
pub struct LogReporter {
    progress: Option<ProgressBar>,
}

impl LogReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reporter for LogReporter {
    fn scan_finished(&mut self, source_dir: &Path, found: usize) {
        info!("Found {} audio files in {:?}.", found, source_dir);
    }

    fn cache_pruned(&mut self, removed: usize) {
        info!("Removed {} cache entries for files that no longer exist.", removed);
    }

    fn cache_error(&mut self, err: &CacheError) {
        error!("{}", err);
    }

    fn no_new_files(&mut self) {
        info!("No new songs detected for processing.");
    }

    fn batch_started(&mut self, total: usize) {
        info!("Detected {} new songs. Processing...", total);
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message("Processing new songs");
        self.progress = Some(pb);
    }

    fn file_measured(&mut self, path: &Path, result: &Result<f64, MeasurementError>) {
        if let Err(e) = result {
            let msg = format!("Error calculating loudness for {:?}: {}", path, e);
            match &self.progress {
                Some(pb) => pb.suspend(|| error!("{}", msg)),
                None => error!("{}", msg),
            }
        }
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
    }

    fn batch_finished(&mut self, outcome: &BatchOutcome) {
        if let Some(pb) = self.progress.take() {
            pb.finish_with_message("Processing done");
        }
        info!(
            "Measured {} new songs, {} failed.",
            outcome.succeeded, outcome.failed
        );
    }

    fn songs_sorted(&mut self, songs: &[SongLoudness]) {
        if songs.is_empty() {
            info!("No songs to display.");
            return;
        }
        info!("Songs sorted by loudness (lowest to highest):");
        for song in songs {
            info!(
                "  {}: {:.2} LUFS",
                song.path.file_name().unwrap_or_default().to_string_lossy(),
                song.lufs
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_quietest_first_and_skips_uncached() {
        let files: Vec<PathBuf> = ["a.mp3", "b.mp3", "c.mp3", "d.mp3"]
            .iter()
            .map(PathBuf::from)
            .collect();
        let cache: LoudnessCache = [
            (files[0].clone(), -8.0),
            (files[1].clone(), -23.5),
            (files[3].clone(), -14.0),
            (PathBuf::from("gone.mp3"), -40.0),
        ]
        .into_iter()
        .collect();

        let songs = sort_by_loudness(&cache, &files).unwrap();
        let order: Vec<(&str, f64)> = songs
            .iter()
            .map(|s| (s.path.to_str().unwrap(), s.lufs))
            .collect();
        assert_eq!(order, vec![("b.mp3", -23.5), ("d.mp3", -14.0), ("a.mp3", -8.0)]);
        assert!(songs.windows(2).all(|w| w[0].lufs <= w[1].lufs));
    }

    #[test]
    fn nothing_to_report() {
        let cache = LoudnessCache::new();
        assert_eq!(sort_by_loudness(&cache, &[PathBuf::from("a.mp3")]), None);
        assert_eq!(sort_by_loudness(&cache, &[]), None);
    }
}
