//! Path canonicalization used for cache keys.
//!
//! A canonical path is absolute, has no `.` or `..` components and, when the
//! file exists, has every symlink resolved. Case is kept as-is, so two paths
//! are the same cache key only when they are byte-identical after this step.

use std::path::{Component, Path, PathBuf};

/// Resolve `path` against `base` and canonicalize it.
///
/// Falls back to lexical normalization when the file is gone, which happens
/// for cache keys of deleted songs.
pub fn canonical_path_from(path: impl AsRef<Path>, base: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.as_ref().join(path)
    };
    std::fs::canonicalize(&absolute).unwrap_or_else(|_| normalize_lexically(&absolute))
}

/// Remove `.` components and fold `..` into their parent without touching the
/// file system.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Key under which `path` is written to the cache file: relative to `base`
/// when such a form exists, absolute otherwise.
pub fn portable_key(path: &Path, base: &Path) -> String {
    pathdiff::diff_paths(path, base)
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}
