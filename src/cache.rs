//! Persisted mapping from canonical song path to integrated loudness.
//!
//! On disk the cache is a JSON object whose keys are paths relative to the
//! working directory and whose values are LUFS numbers:
//!
//! ```json
//! {
//!     "music/quiet.flac": -23.4,
//!     "music/loud.mp3": -8.9,
//!     "music/silence.wav": "-inf"
//! }
//! ```
//!
//! JSON has no infinity, so silent songs are stored as the string `"-inf"`.
//! The bare `-Infinity`/`Infinity`/`NaN` literals other JSON writers emit
//! are accepted on load.

use crate::error::CacheError;
use crate::paths::{canonical_path_from, portable_key};
use log::{debug, error, warn};
use serde::Serialize as _;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Loudness values keyed by canonical file path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoudnessCache {
    entries: HashMap<PathBuf, f64>,
}

impl LoudnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, path: &Path) -> Option<f64> {
        self.entries.get(path).copied()
    }

    #[inline]
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    /// Records a measurement, returning the previous value if any
    pub fn insert(&mut self, path: PathBuf, lufs: f64) -> Option<f64> {
        self.entries.insert(path, lufs)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, f64)> {
        self.entries.iter().map(|(p, l)| (p.as_path(), *l))
    }

    /// Loads the cache, degrading to an empty one on any error.
    ///
    /// A corrupt file is logged and ignored; it will be overwritten by the
    /// next save.
    pub fn load(path: impl AsRef<Path>) -> Self {
        match Self::try_load(path) {
            Ok(cache) => cache,
            Err(e) => {
                error!("{}. A new cache will be created.", e);
                Self::new()
            }
        }
    }

    /// Loads the cache, resolving keys against the working directory.
    /// An absent file is an empty cache, not an error.
    pub fn try_load(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let base = std::env::current_dir().map_err(CacheError::WorkingDir)?;
        Self::try_load_relative_to(path, base)
    }

    pub fn try_load_relative_to(
        path: impl AsRef<Path>,
        base: impl AsRef<Path>,
    ) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let base = base.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cache file at {:?}, starting empty", path);
                return Ok(Self::new());
            }
            Err(e) => {
                return Err(CacheError::Read {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        let raw: HashMap<String, Value> = serde_json::from_str(&quote_non_finite_literals(&text))
            .map_err(|e| CacheError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;

        let mut entries = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            match loudness_from_json(&value) {
                Some(lufs) => {
                    entries.insert(canonical_path_from(&key, base), lufs);
                }
                None => warn!(
                    "Ignoring cache entry {:?} with non-numeric loudness {}",
                    key, value
                ),
            }
        }
        debug!("Loaded {} cached measurements from {:?}", entries.len(), path);
        Ok(Self { entries })
    }

    /// Writes the cache with keys relative to the working directory
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CacheError> {
        let base = std::env::current_dir().map_err(CacheError::WorkingDir)?;
        self.save_relative_to(path, base)
    }

    /// Writes the cache with keys relative to `base`.
    ///
    /// The file is overwritten in place; a failure halfway may leave a
    /// truncated file, which the next load treats as corrupt.
    pub fn save_relative_to(
        &self,
        path: impl AsRef<Path>,
        base: impl AsRef<Path>,
    ) -> Result<(), CacheError> {
        let path = path.as_ref();
        let base = base.as_ref();
        let portable: BTreeMap<String, Value> = self
            .entries
            .iter()
            .map(|(p, l)| (portable_key(p, base), loudness_to_json(*l)))
            .collect();

        let mut buf = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        portable.serialize(&mut ser)?;
        buf.push(b'\n');

        fs::write(path, buf).map_err(|e| CacheError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;
        debug!("Saved {} measurements to {:?}", portable.len(), path);
        Ok(())
    }

    /// Drops entries for files that are not in `current_files`.
    ///
    /// # Returns
    /// Number of entries removed
    pub fn reconcile(&mut self, current_files: &[PathBuf]) -> usize {
        let current: HashSet<&Path> = current_files.iter().map(PathBuf::as_path).collect();
        let before = self.entries.len();
        self.entries.retain(|path, _| current.contains(path.as_path()));
        before - self.entries.len()
    }
}

fn loudness_to_json(lufs: f64) -> Value {
    serde_json::Number::from_f64(lufs)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(lufs.to_string()))
}

/// Numbers as-is, strings through `f64::from_str` (which takes `-inf` and
/// `-Infinity`). NaN is not a loudness.
fn loudness_from_json(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|l| !l.is_nan()),
        _ => None,
    }
}

/// Wraps bare `-Infinity`, `Infinity` and `NaN` tokens outside of strings in
/// quotes so the text becomes valid JSON.
fn quote_non_finite_literals(text: &str) -> Cow<'_, str> {
    const LITERALS: [&str; 3] = ["-Infinity", "Infinity", "NaN"];
    if !LITERALS.iter().any(|l| text.contains(l)) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if let Some(lit) = LITERALS.iter().find(|l| rest.starts_with(**l)) {
            out.push('"');
            out.push_str(lit);
            out.push('"');
            rest = &rest[lit.len()..];
            continue;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    Cow::Owned(out)
}

impl FromIterator<(PathBuf, f64)> for LoudnessCache {
    fn from_iter<T: IntoIterator<Item = (PathBuf, f64)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn absent_file_is_empty_cache() {
        let (_dir, root) = scratch();
        let cache = LoudnessCache::try_load_relative_to(root.join("cache.json"), &root).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error_and_loads_empty() {
        let (_dir, root) = scratch();
        let path = root.join("cache.json");
        fs::write(&path, "{ \"a.mp3\": -12.0, ").unwrap();

        let err = LoudnessCache::try_load_relative_to(&path, &root).unwrap_err();
        assert!(matches!(err, CacheError::Parse { .. }));
        assert!(LoudnessCache::load(&path).is_empty());
    }

    #[test]
    fn save_then_load_restores_canonical_entries() {
        let (_dir, root) = scratch();
        let music = root.join("music");
        fs::create_dir_all(music.join("live")).unwrap();
        fs::write(music.join("a.mp3"), b"").unwrap();
        fs::write(music.join("live/b.flac"), b"").unwrap();
        let cache: LoudnessCache = [
            (music.join("a.mp3"), -14.25),
            (music.join("live/b.flac"), -9.5),
            (root.join("deleted.ogg"), -30.0),
        ]
        .into_iter()
        .collect();

        let work = root.join("work");
        fs::create_dir_all(&work).unwrap();
        let path = work.join("cache.json");
        cache.save_relative_to(&path, &work).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"../music/a.mp3\": -14.25"), "{text}");
        assert!(text.starts_with("{\n    \""), "{text}");

        let loaded = LoudnessCache::try_load_relative_to(&path, &work).unwrap();
        assert_eq!(loaded, cache);
    }

    #[test]
    fn non_numeric_values_are_skipped() {
        let (_dir, root) = scratch();
        let path = root.join("cache.json");
        fs::write(&path, r#"{"a.mp3": -10.5, "b.mp3": null, "c.mp3": "loud"}"#).unwrap();

        let cache = LoudnessCache::try_load_relative_to(&path, &root).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&root.join("a.mp3")), Some(-10.5));
    }

    #[test]
    fn infinite_literals_keep_the_other_entries() {
        let (_dir, root) = scratch();
        let path = root.join("cache.json");
        fs::write(
            &path,
            "{\n    \"silent.wav\": -Infinity,\n    \"loud.wav\": -10.5,\n    \"odd.wav\": NaN,\n    \"NaN -Infinity.mp3\": -20.0\n}",
        )
        .unwrap();

        let cache = LoudnessCache::try_load_relative_to(&path, &root).unwrap();
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&root.join("silent.wav")), Some(f64::NEG_INFINITY));
        assert_eq!(cache.get(&root.join("loud.wav")), Some(-10.5));
        assert_eq!(cache.get(&root.join("NaN -Infinity.mp3")), Some(-20.0));
    }

    #[test]
    fn silent_song_survives_save_and_load() {
        let (_dir, root) = scratch();
        let path = root.join("cache.json");
        let cache: LoudnessCache = [
            (root.join("silence.wav"), f64::NEG_INFINITY),
            (root.join("song.wav"), -12.0),
        ]
        .into_iter()
        .collect();

        cache.save_relative_to(&path, &root).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"silence.wav\": \"-inf\""), "{text}");

        let loaded = LoudnessCache::try_load_relative_to(&path, &root).unwrap();
        assert_eq!(loaded, cache);
    }

    #[test]
    fn json_array_is_rejected() {
        let (_dir, root) = scratch();
        let path = root.join("cache.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(LoudnessCache::try_load_relative_to(&path, &root).is_err());
    }

    #[test]
    fn reconcile_drops_vanished_files_and_is_idempotent() {
        let a = PathBuf::from("/music/a.mp3");
        let b = PathBuf::from("/music/b.mp3");
        let mut cache: LoudnessCache = [(a.clone(), -10.0), (b.clone(), -20.0)]
            .into_iter()
            .collect();
        let current = vec![a.clone(), PathBuf::from("/music/new.wav")];

        assert_eq!(cache.reconcile(&current), 1);
        let once = cache.clone();
        assert_eq!(cache.reconcile(&current), 0);
        assert_eq!(cache, once);
        assert_eq!(cache.get(&a), Some(-10.0));
        assert!(!cache.contains(&b));
    }
}
