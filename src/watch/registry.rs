// src/watch/registry.rs

//! The watch registry: which files the generator depends on, how changes to
//! them are blamed, which are critical, and which ancestors are held open
//! because a target does not exist yet.
//!
//! The registry is pure state. Mutating operations return [`WatchAction`]s
//! describing what the OS-level watchers should do; the caller applies them.
//! This keeps every registration decision testable without a real watcher.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::patterns::{MatcherOptions, PatternRegistry};
use crate::types::FsEventKind;

/// Kind of existence probe a path was registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistenceKind {
    Any,
    File,
    Dir,
}

/// Instruction for the OS-level watchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// Subscribe the recursive watcher to `path`. Non-recursive
    /// subscriptions observe only the path itself and its direct children.
    Watch { path: PathBuf, recursive: bool },
    /// Drop the recursive watcher's direct subscription on `path`, if any.
    Unwatch(PathBuf),
    /// Add one reference to the existence watcher's subscription on a parent
    /// directory.
    WatchShallow(PathBuf),
    /// Release one such reference.
    UnwatchShallow(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct AddFileOptions {
    /// Files to blame instead of the watched path itself.
    pub causes: Vec<PathBuf>,
    /// Changes to this file trigger a hard reset.
    pub critical: bool,
}

#[derive(Debug)]
pub struct WatchRegistry {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    patterns: PatternRegistry,
    watched_files: HashSet<PathBuf>,
    /// Watched path -> cause files, in insertion order.
    blamed_files: HashMap<PathBuf, Vec<PathBuf>>,
    critical_files: HashSet<PathBuf>,
    /// Watched targets that did not exist at registration time, with the
    /// ancestor chain that was reference-counted for them.
    missing_paths: HashMap<PathBuf, Vec<PathBuf>>,
    /// Ancestor directory -> count of missing descendants relying on it.
    fallback_paths: HashMap<PathBuf, usize>,
    existence_paths: HashSet<PathBuf>,
    file_existence_paths: HashSet<PathBuf>,
    directory_existence_paths: HashSet<PathBuf>,
}

impl WatchRegistry {
    pub fn new(root: PathBuf, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root,
            fs,
            patterns: PatternRegistry::new(),
            watched_files: HashSet::new(),
            blamed_files: HashMap::new(),
            critical_files: HashSet::new(),
            missing_paths: HashMap::new(),
            fallback_paths: HashMap::new(),
            existence_paths: HashSet::new(),
            file_existence_paths: HashSet::new(),
            directory_existence_paths: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Register an explicit file dependency.
    pub fn add_file(&mut self, path: &Path, opts: AddFileOptions) -> Vec<WatchAction> {
        let newly = self.watched_files.insert(path.to_path_buf());

        if opts.critical {
            self.critical_files.insert(path.to_path_buf());
        }

        if !opts.causes.is_empty() {
            // A file watched plainly and then blamed must keep blaming itself
            // for its own changes.
            let watched_plainly = !newly && !self.blamed_files.contains_key(path);
            let causes = self.blamed_files.entry(path.to_path_buf()).or_default();
            if watched_plainly {
                push_unique(causes, path);
            }
            for cause in &opts.causes {
                push_unique(causes, cause);
            }
        } else if let Some(causes) = self.blamed_files.get_mut(path) {
            // Re-added without a cause: the file now also blames itself.
            push_unique(causes, path);
        }

        if !newly {
            return Vec::new();
        }

        debug!(?path, critical = opts.critical, "watching file");
        if self.fs.exists(path) {
            if path.starts_with(&self.root) {
                // Covered by the recursive root subscription.
                Vec::new()
            } else {
                vec![WatchAction::Watch {
                    path: path.to_path_buf(),
                    recursive: false,
                }]
            }
        } else {
            self.register_missing(path)
        }
    }

    /// Register glob matchers rooted at `opts.cwd`. Returns watch actions for
    /// bases the root subscription does not cover.
    pub fn add_patterns(
        &mut self,
        patterns: &[String],
        opts: &MatcherOptions,
    ) -> Result<Vec<WatchAction>> {
        let bases = self.patterns.add(patterns, opts)?;
        Ok(bases
            .into_iter()
            .filter(|(base, _)| !base.starts_with(&self.root))
            .map(|(path, recursive)| WatchAction::Watch { path, recursive })
            .collect())
    }

    /// Register an existence probe.
    pub fn add_existence(&mut self, path: &Path, kind: ExistenceKind) -> Vec<WatchAction> {
        let set = match kind {
            ExistenceKind::Any => &mut self.existence_paths,
            ExistenceKind::File => &mut self.file_existence_paths,
            ExistenceKind::Dir => &mut self.directory_existence_paths,
        };
        if set.insert(path.to_path_buf()) {
            trace!(?path, ?kind, "existence probe registered");
            if let Some(parent) = path.parent() {
                return vec![WatchAction::WatchShallow(parent.to_path_buf())];
            }
        }
        Vec::new()
    }

    /// Forget a file dependency. Cascades through blame: any file left with
    /// an empty cause set is forgotten as well.
    pub fn unwatch(&mut self, path: &Path) -> Vec<WatchAction> {
        let mut actions = Vec::new();
        let mut queue = vec![path.to_path_buf()];

        while let Some(p) = queue.pop() {
            self.watched_files.remove(&p);
            self.blamed_files.remove(&p);
            self.critical_files.remove(&p);
            actions.extend(self.remove_existence(&p));
            if let Some(chain) = self.missing_paths.remove(&p) {
                actions.extend(self.release_chain(&chain));
            }

            // Keep the OS subscription while an active matcher still wants
            // change events for this path.
            let still_wanted = self.patterns.matchers_for(&p).any(|m| m.accept_change_events());
            if !still_wanted {
                actions.push(WatchAction::Unwatch(p.clone()));
            }
            debug!(path = ?p, "unwatched file");

            let mut orphaned = Vec::new();
            for (blamed, causes) in self.blamed_files.iter_mut() {
                if let Some(at) = causes.iter().position(|c| c == &p) {
                    causes.remove(at);
                    if causes.is_empty() {
                        orphaned.push(blamed.clone());
                    }
                }
            }
            for blamed in orphaned {
                self.blamed_files.remove(&blamed);
                queue.push(blamed);
            }
        }

        actions
    }

    /// An add was observed for `path`: release fallback bookkeeping and
    /// promote a formerly missing target to a direct subscription.
    pub fn check_added_path(&mut self, path: &Path) -> Vec<WatchAction> {
        let Some(chain) = self.missing_paths.remove(path) else {
            return Vec::new();
        };
        debug!(?path, "missing path appeared");
        let mut actions = self.release_chain(&chain);
        if !path.starts_with(&self.root) {
            actions.push(WatchAction::Watch {
                path: path.to_path_buf(),
                recursive: false,
            });
        }
        actions
    }

    /// The recursive-watcher filter with the suppression folds applied.
    ///
    /// An `add` is suppressed when every applicable matcher ignores empty new
    /// files and the file is currently zero bytes; a `change` is suppressed
    /// unless the path is explicitly watched or some applicable matcher
    /// accepts change events.
    pub fn accepts(&self, path: &Path, kind: FsEventKind) -> bool {
        if self.watched_files.contains(path) {
            return true;
        }

        let matching: Vec<_> = self.patterns.matchers_for(path).collect();
        if matching.is_empty() {
            return false;
        }

        match kind {
            FsEventKind::Add => {
                if matching.iter().all(|m| m.ignore_empty_new_files())
                    && matches!(self.fs.file_size(path), Ok(0))
                {
                    trace!(?path, "suppressed add for empty new file");
                    return false;
                }
                true
            }
            FsEventKind::Change => matching.iter().any(|m| m.accept_change_events()),
            FsEventKind::AddDir | FsEventKind::Unlink | FsEventKind::UnlinkDir => true,
        }
    }

    /// The existence-watcher filter: only add/unlink kinds, only for
    /// registered probes, and never for paths the recursive watcher already
    /// delivers.
    pub fn accepts_existence(&self, path: &Path, kind: FsEventKind) -> bool {
        if self.watched_files.contains(path) {
            return false;
        }
        match kind {
            FsEventKind::Change => false,
            FsEventKind::Add | FsEventKind::Unlink => {
                self.existence_paths.contains(path) || self.file_existence_paths.contains(path)
            }
            FsEventKind::AddDir | FsEventKind::UnlinkDir => {
                self.existence_paths.contains(path)
                    || self.directory_existence_paths.contains(path)
            }
        }
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.watched_files.contains(path)
    }

    pub fn is_file_critical(&self, path: &Path) -> bool {
        self.critical_files.contains(path)
    }

    /// Cause files for `path`, in insertion order.
    pub fn causes_for(&self, path: &Path) -> Option<Vec<PathBuf>> {
        self.blamed_files.get(path).cloned()
    }

    pub fn watched_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<_> = self.watched_files.iter().cloned().collect();
        files.sort();
        files
    }

    pub fn blamed_files(&self) -> Vec<(PathBuf, Vec<PathBuf>)> {
        let mut entries: Vec<_> = self
            .blamed_files
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort();
        entries
    }

    pub fn fallback_count(&self, path: &Path) -> usize {
        self.fallback_paths.get(path).copied().unwrap_or(0)
    }

    pub fn is_missing(&self, path: &Path) -> bool {
        self.missing_paths.contains_key(path)
    }

    /// Drop every registration. The caller resets the OS watchers.
    pub fn close(&mut self) {
        self.patterns.clear();
        self.watched_files.clear();
        self.blamed_files.clear();
        self.critical_files.clear();
        self.missing_paths.clear();
        self.fallback_paths.clear();
        self.existence_paths.clear();
        self.file_existence_paths.clear();
        self.directory_existence_paths.clear();
    }

    /// Reference-count ancestors of a target that does not exist yet, down to
    /// the first ancestor that does.
    fn register_missing(&mut self, path: &Path) -> Vec<WatchAction> {
        let mut actions = Vec::new();
        let mut chain = Vec::new();
        let mut current = path.parent();

        while let Some(dir) = current {
            *self.fallback_paths.entry(dir.to_path_buf()).or_insert(0) += 1;
            chain.push(dir.to_path_buf());
            if self.fs.exists(dir) {
                if !dir.starts_with(&self.root) {
                    // Recursive: intermediate directories may be created in
                    // one burst and the target must still be observed.
                    actions.push(WatchAction::Watch {
                        path: dir.to_path_buf(),
                        recursive: true,
                    });
                }
                break;
            }
            current = dir.parent();
        }

        debug!(?path, fallback = ?chain.last(), "target missing; holding ancestors");
        self.missing_paths.insert(path.to_path_buf(), chain);
        actions
    }

    fn release_chain(&mut self, chain: &[PathBuf]) -> Vec<WatchAction> {
        let mut actions = Vec::new();
        for dir in chain {
            if let Some(count) = self.fallback_paths.get_mut(dir) {
                *count -= 1;
                if *count == 0 {
                    self.fallback_paths.remove(dir);
                    if !dir.starts_with(&self.root) {
                        actions.push(WatchAction::Unwatch(dir.clone()));
                    }
                }
            }
        }
        actions
    }

    fn remove_existence(&mut self, path: &Path) -> Vec<WatchAction> {
        let mut removed = 0;
        removed += usize::from(self.existence_paths.remove(path));
        removed += usize::from(self.file_existence_paths.remove(path));
        removed += usize::from(self.directory_existence_paths.remove(path));

        match path.parent() {
            Some(parent) if removed > 0 => {
                vec![WatchAction::UnwatchShallow(parent.to_path_buf()); removed]
            }
            _ => Vec::new(),
        }
    }
}

fn push_unique(causes: &mut Vec<PathBuf>, cause: &Path) {
    if !causes.iter().any(|c| c == cause) {
        causes.push(cause.to_path_buf());
    }
}
