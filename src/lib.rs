/// Measuring new files in parallel
pub mod batch;
/// Persisted loudness cache
pub mod cache;
/// Module for error handling
pub mod error;
/// Loudness measurement of a single file
pub mod measure;
pub mod paths;
/// Sorting and reporting results
pub mod report;
/// Discovering audio files
pub mod scan;

pub use crate::batch::{BatchOutcome, measure_new_files};
pub use crate::cache::LoudnessCache;
pub use crate::error::{CacheError, MeasurementError};
pub use crate::measure::measure_single_file_loudness;
pub use crate::report::{LogReporter, Reporter, SongLoudness, sort_by_loudness};
pub use crate::scan::find_audio_files;

use std::path::{Path, PathBuf};
use strum_macros::Display;

/// Default cache file name, created in the working directory
pub const DEFAULT_CACHE_FILE: &str = "loudness_cache.json";

/// Represents supported audio file formats
#[derive(Debug, PartialEq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AudioFormats {
    Mp3,
    Wav,
    Flac,
    Ogg,
}

impl AudioFormats {
    /// Returns a list of supported file extensions
    #[inline]
    pub fn supported_extensions() -> &'static [&'static str] {
        &["mp3", "wav", "flac", "ogg"]
    }

    /// Creates an AudioFormats enum from a file path based on its extension,
    /// ignoring case
    #[inline]
    pub fn from_path(value: impl AsRef<Path>) -> Option<Self> {
        Some(
            match value
                .as_ref()
                .extension()
                .unwrap_or_default()
                .to_string_lossy()
                .to_lowercase()
                .as_ref()
            {
                "mp3" => Self::Mp3,
                "wav" => Self::Wav,
                "flac" => Self::Flac,
                "ogg" => Self::Ogg,
                _ => return None,
            },
        )
    }
}

/// Configuration of one sorting run
#[derive(Debug, Clone)]
pub struct SortOptions {
    /// Directory scanned recursively for songs
    pub source_dir: PathBuf,
    /// JSON cache of previous measurements
    pub cache_path: PathBuf,
    /// Number of threads measuring new songs, default to CPU core count
    pub num_threads: Option<usize>,
}

impl Default for SortOptions {
    fn default() -> Self {
        SortOptions {
            source_dir: PathBuf::from("."),
            cache_path: PathBuf::from(DEFAULT_CACHE_FILE),
            num_threads: None,
        }
    }
}

/// Sorts the songs in `options.source_dir` by integrated loudness, measuring
/// only songs missing from the cache.
///
/// Nothing here is fatal: an unreadable cache starts empty, a song that fails
/// to measure is skipped (and retried next run), a failed cache write only
/// loses this run's new measurements for the next run.
pub fn sort_songs_by_loudness(
    options: &SortOptions,
    reporter: &mut dyn Reporter,
) -> Vec<SongLoudness> {
    sort_songs_with_meter(
        options,
        |path: &Path| measure_single_file_loudness(path),
        reporter,
    )
}

/// [`sort_songs_by_loudness`] with a custom single-file meter
pub fn sort_songs_with_meter<M>(
    options: &SortOptions,
    meter: M,
    reporter: &mut dyn Reporter,
) -> Vec<SongLoudness>
where
    M: Fn(&Path) -> Result<f64, MeasurementError> + Sync,
{
    // 1. Load existing cache
    let mut cache = LoudnessCache::try_load(&options.cache_path).unwrap_or_else(|e| {
        reporter.cache_error(&e);
        LoudnessCache::new()
    });

    // 2. Discover audio files
    let files = find_audio_files(&options.source_dir);
    reporter.scan_finished(&options.source_dir, files.len());

    // 3. Forget files that disappeared
    let pruned = cache.reconcile(&files);
    if pruned > 0 {
        reporter.cache_pruned(pruned);
    }

    // 4. Measure new files
    let outcome = measure_new_files(&files, &mut cache, options.num_threads, meter, reporter);
    if outcome.dispatched == 0 {
        reporter.no_new_files();
    }

    // 5. Persist once any file was measured (failures included) or pruned
    if outcome.dispatched > 0 || pruned > 0 {
        if let Err(e) = cache.save(&options.cache_path) {
            reporter.cache_error(&e);
        }
    }

    // 6. Report
    let songs = sort_by_loudness(&cache, &files).unwrap_or_default();
    reporter.songs_sorted(&songs);
    songs
}
