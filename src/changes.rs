// src/changes.rs

//! The change log: an ordered per-path fold of watch events between two runs.
//!
//! Callers resolve blame before recording, so entries are keyed by the path
//! that will be reported to the generator. Fold rules:
//! - directory kinds collapse to their file counterparts,
//! - a bare `change` never overwrites an `add` or an `unlink`,
//! - repeated `add`/`unlink` keeps the latest value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::path_utils::relative_path;
use crate::types::{ChangeKind, FsEventKind};

/// One folded change reported to the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub kind: ChangeKind,
    /// Absolute path of the reported file.
    pub path: PathBuf,
    /// The same path relative to the engine root when under it.
    pub rel_path: PathBuf,
}

#[derive(Debug, Default)]
pub struct ChangeLog {
    entries: Vec<Change>,
    index: HashMap<PathBuf, usize>,
    critical_touched: bool,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one normalized event for an already blame-resolved `path`.
    pub fn record(&mut self, root: &Path, path: &Path, kind: FsEventKind) {
        let folded = kind.fold();
        match self.index.get(path) {
            Some(&at) => {
                let previous = self.entries[at].kind;
                if folded == ChangeKind::Change && previous != ChangeKind::Change {
                    return;
                }
                self.entries[at].kind = folded;
            }
            None => {
                self.index.insert(path.to_path_buf(), self.entries.len());
                self.entries.push(Change {
                    kind: folded,
                    path: path.to_path_buf(),
                    rel_path: relative_path(root, path),
                });
            }
        }
    }

    /// Remember that some logged path maps to a critical file.
    pub fn mark_critical(&mut self) {
        self.critical_touched = true;
    }

    pub fn is_critical(&self) -> bool {
        self.critical_touched
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Take the folded changes in observation order, leaving the log empty.
    pub fn drain(&mut self) -> Vec<Change> {
        self.index.clear();
        self.critical_touched = false;
        std::mem::take(&mut self.entries)
    }
}
