// src/path_utils.rs

//! Path and pattern utilities.
//!
//! All internal bookkeeping uses absolute, lexically normalized paths with no
//! trailing separator. Patterns are split into a literal base (everything up
//! to the last separator before the first glob meta-character) and a glob
//! tail; the base decides where a matcher anchors and how specific it is.

use std::path::{Component, Path, PathBuf};

/// Glob meta-characters that end the literal prefix of a pattern.
const GLOB_META: [char; 4] = ['*', '?', '[', '{'];

/// True when `pattern` contains any glob meta-character.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(GLOB_META)
}

/// Lexically normalize a path: resolve `.` and `..` components and drop any
/// trailing separator. Does not touch the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve `path` against `root` into an absolute normalized path.
pub fn resolve(root: &Path, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&root.join(path))
    }
}

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// First tries a direct `strip_prefix`; if that fails (symlinked roots,
/// different absolute prefixes), canonicalizes both sides and tries again.
/// Returns `None` if the path cannot be related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(rel.to_string_lossy().replace('\\', "/"));
    }

    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(rel.to_string_lossy().replace('\\', "/"));
        }
    }

    None
}

/// Path relative to `root` when possible, the absolute path otherwise.
pub fn relative_path(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => path.to_path_buf(),
    }
}

/// Number of real components in a path. Matchers with deeper bases are more
/// specific and are consulted first.
pub fn separator_depth(path: &Path) -> usize {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

/// A pattern split into its literal base and glob tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternParts {
    /// Literal prefix; relative to the pattern's cwd unless the pattern was
    /// absolute. The whole pattern when it contains no meta-characters.
    pub base: String,
    /// Remaining glob tail; empty for literal patterns.
    pub glob: String,
    /// True when the glob tail contains `**`.
    pub is_globstar: bool,
}

/// Split a pattern at the last separator before the first glob
/// meta-character.
pub fn split_pattern(pattern: &str) -> PatternParts {
    let pattern = pattern.replace('\\', "/");

    match pattern.find(GLOB_META) {
        None => PatternParts {
            base: pattern,
            glob: String::new(),
            is_globstar: false,
        },
        Some(meta) => {
            let sep = pattern[..meta].rfind('/');
            let (base, glob) = match sep {
                Some(i) => (&pattern[..i], &pattern[i + 1..]),
                None => ("", pattern.as_str()),
            };
            PatternParts {
                base: base.to_string(),
                glob: glob.to_string(),
                is_globstar: glob.contains("**"),
            }
        }
    }
}
