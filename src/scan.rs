use crate::AudioFormats;
use crate::paths::canonical_path_from;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Finds all supported audio files under `input_dir`, recursively.
///
/// Every returned path is canonical (see [`crate::paths`]), so it can be
/// compared directly with cache keys. A missing or non-directory root yields
/// an empty list.
///
/// # Arguments
/// * `input_dir` - Directory to search for audio files
///
/// # Returns
/// Sorted, de-duplicated canonical paths
pub fn find_audio_files(input_dir: impl AsRef<Path>) -> Vec<PathBuf> {
    let input_dir = input_dir.as_ref();
    if !input_dir.is_dir() {
        warn!(
            "Source path is not a readable directory, nothing to scan: {:?}",
            input_dir
        );
        return Vec::new();
    }
    let base = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            warn!("Cannot determine working directory: {}", e);
            PathBuf::new()
        }
    };

    let mut audio_files: Vec<PathBuf> = WalkDir::new(input_dir)
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        // `Path::is_file` follows symlinks, so linked songs are kept too
        .filter(|e| e.path().is_file())
        .filter(|e| AudioFormats::from_path(e.path()).is_some())
        .map(|e| canonical_path_from(e.path(), &base))
        .collect();

    audio_files.sort();
    audio_files.dedup();
    audio_files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn finds_nested_files_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        for name in [
            "a.mp3",
            "b.WAV",
            "deep/er/c.Flac",
            "deep/d.ogg",
            "notes.txt",
            "cover.jpg",
            "deep/e.m4a",
            "noext",
        ] {
            touch(&root.join(name));
        }
        fs::create_dir_all(root.join("folder.mp3")).unwrap();

        let found = find_audio_files(&root);
        let expected: Vec<PathBuf> = ["a.mp3", "b.WAV", "deep/d.ogg", "deep/er/c.Flac"]
            .iter()
            .map(|n| root.join(n))
            .collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn missing_directory_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_audio_files(dir.path().join("nope")).is_empty());

        let file = dir.path().join("song.mp3");
        touch(&file);
        assert!(find_audio_files(&file).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_song_collapses_onto_target() {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let song = root.join("real.flac");
        touch(&song);
        std::os::unix::fs::symlink(&song, root.join("link.flac")).unwrap();

        assert_eq!(find_audio_files(&root), vec![song]);
    }
}
