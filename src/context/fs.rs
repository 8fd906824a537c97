// src/context/fs.rs

//! The filesystem facade the generator uses.
//!
//! Every call maps the operation onto a watch-registry update (in watch mode)
//! and a synchronous filesystem action. The registry is the single source of
//! truth for what the engine depends on; nothing here performs I/O the
//! registry has not seen.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::EngineNotice;
use crate::errors::{EngineError, Result};
use crate::fs::{FileInfo, FileSystem};
use crate::path_utils::{relative_path, resolve};
use crate::patterns::{MatcherOptions, NameMatcher, PatternRegistry};
use crate::watch::registry::{AddFileOptions, ExistenceKind, WatchRegistry};
use crate::watch::{lock_registry, Watchers};

/// Options for [`ContextFs::scan`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Directory the patterns are relative to; the engine root by default.
    pub cwd: Option<PathBuf>,
    /// Register the patterns for watching. On by default.
    pub watch: bool,
    /// Do not rerun for new files that are still empty.
    pub ignore_empty_new_files: bool,
    /// Match dotfiles.
    pub dot: bool,
    /// Extra negative patterns.
    pub ignore: Vec<String>,
    /// Return absolute paths instead of cwd-relative ones.
    pub absolute: bool,
    pub case_insensitive: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            cwd: None,
            watch: true,
            ignore_empty_new_files: false,
            dot: false,
            ignore: Vec::new(),
            absolute: false,
            case_insensitive: false,
        }
    }
}

/// When to halt the upward walk of [`ContextFs::find_up`].
#[derive(Clone)]
pub enum FindUpStop {
    /// Halt once this directory has been searched.
    Path(PathBuf),
    /// Halt once a directory contains an entry matching one of these globs.
    Globs(Vec<String>),
    /// Halt once the predicate accepts the directory being searched.
    Predicate(Arc<dyn Fn(&Path) -> bool + Send + Sync>),
}

impl fmt::Debug for FindUpStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindUpStop::Path(p) => f.debug_tuple("Path").field(p).finish(),
            FindUpStop::Globs(g) => f.debug_tuple("Globs").field(g).finish(),
            FindUpStop::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindUpOptions {
    pub cwd: Option<PathBuf>,
    pub absolute: bool,
    pub stop: Option<FindUpStop>,
}

/// Options for [`ContextFs::list`].
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub absolute: bool,
    pub watch: bool,
    /// Name filter; `*` by default.
    pub glob: Option<String>,
    pub dot: bool,
    pub case_insensitive: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            absolute: false,
            watch: true,
            glob: None,
            dot: false,
            case_insensitive: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Changes to this file trigger a hard reset.
    pub critical: bool,
}

/// Options for [`ContextFs::watch`].
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// Files to blame for changes instead of the watched paths themselves.
    pub causes: Vec<PathBuf>,
}

/// The API surface the generator uses for all filesystem access.
#[derive(Debug, Clone)]
pub struct ContextFs {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
    registry: Arc<Mutex<WatchRegistry>>,
    watchers: Watchers,
    watch_enabled: bool,
    notices: mpsc::UnboundedSender<EngineNotice>,
}

impl ContextFs {
    pub(crate) fn new(
        root: PathBuf,
        fs: Arc<dyn FileSystem>,
        registry: Arc<Mutex<WatchRegistry>>,
        watchers: Watchers,
        watch_enabled: bool,
        notices: mpsc::UnboundedSender<EngineNotice>,
    ) -> Self {
        Self {
            root,
            fs,
            registry,
            watchers,
            watch_enabled,
            notices,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate files matching `patterns` and register them for watching.
    ///
    /// A scan expresses interest in which files exist, not in their contents:
    /// later content mutations of matched files do not rerun the generator by
    /// themselves.
    pub fn scan(&self, patterns: &[&str], opts: &ScanOptions) -> Result<Vec<PathBuf>> {
        let cwd = match &opts.cwd {
            Some(cwd) => resolve(&self.root, cwd),
            None => self.root.clone(),
        };
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        let matcher_opts = MatcherOptions {
            cwd: cwd.clone(),
            dot: opts.dot,
            case_insensitive: opts.case_insensitive,
            ignore: opts.ignore.clone(),
            ignore_empty_new_files: opts.ignore_empty_new_files,
            accept_change_events: false,
        };

        if self.watch_enabled && opts.watch {
            let actions = lock_registry(&self.registry).add_patterns(&patterns, &matcher_opts)?;
            self.watchers.apply(actions);
        }

        // A private registry drives the enumeration so `watch: false` scans
        // match identically.
        let mut local = PatternRegistry::new();
        local.add(&patterns, &matcher_opts)?;

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for matcher in local.matchers() {
            if matcher.is_literal() {
                let base = matcher.base();
                if self.fs.is_file(base) && seen.insert(base.to_path_buf()) {
                    results.push(base.to_path_buf());
                }
                continue;
            }

            let walk_hidden = opts.dot || matcher.names_hidden();
            let mut stack = vec![matcher.base().to_path_buf()];
            while let Some(dir) = stack.pop() {
                let entries = match self.fs.read_dir(&dir) {
                    Ok(entries) => entries,
                    Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                    Err(err) => return Err(EngineError::Io(err)),
                };
                for entry in entries {
                    if !walk_hidden && file_name_of(&entry).is_some_and(|n| n.starts_with('.')) {
                        continue;
                    }
                    if self.fs.is_dir(&entry) {
                        stack.push(entry);
                    } else if self.fs.is_file(&entry)
                        && matcher.matches(&entry)
                        && seen.insert(entry.clone())
                    {
                        results.push(entry);
                    }
                }
            }
        }

        results.sort();
        debug!(count = results.len(), ?cwd, "scan complete");
        Ok(results
            .into_iter()
            .map(|abs| {
                if opts.absolute {
                    abs
                } else {
                    relative_path(&cwd, &abs)
                }
            })
            .collect())
    }

    /// Walk upward from `cwd` until a stop condition holds or the filesystem
    /// root is reached; return the first entry matching `patterns` from the
    /// deepest directory that has one, in directory-listing order.
    ///
    /// Every directory on the walk gets listing matchers for both the source
    /// globs and any stop globs, even past the directory that produced the
    /// match, so a matching entry appearing anywhere on the chain reruns the
    /// generator.
    pub fn find_up(&self, patterns: &[&str], opts: &FindUpOptions) -> Result<Option<PathBuf>> {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        let names = NameMatcher::compile(&patterns, true, false)?;

        let stop_path = match &opts.stop {
            Some(FindUpStop::Path(p)) => Some(resolve(&self.root, p)),
            _ => None,
        };
        let stop_names = match &opts.stop {
            Some(FindUpStop::Globs(globs)) => Some(NameMatcher::compile(globs, true, false)?),
            _ => None,
        };

        let mut dir = match &opts.cwd {
            Some(cwd) => resolve(&self.root, cwd),
            None => self.root.clone(),
        };
        let mut found: Option<PathBuf> = None;

        loop {
            if self.watch_enabled {
                let mut to_register = patterns.clone();
                if let Some(FindUpStop::Globs(globs)) = &opts.stop {
                    to_register.extend(globs.iter().cloned());
                }
                let matcher_opts = MatcherOptions {
                    dot: true,
                    ..MatcherOptions::new(dir.clone())
                };
                let actions =
                    lock_registry(&self.registry).add_patterns(&to_register, &matcher_opts)?;
                self.watchers.apply(actions);
            }

            let entries = match self.fs.read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
                Err(err) => return Err(EngineError::Io(err)),
            };

            if found.is_none() {
                for entry in &entries {
                    let Some(name) = file_name_of(entry) else {
                        continue;
                    };
                    if names.matches(&name) {
                        debug!(?entry, "find_up match");
                        found = Some(entry.clone());
                        break;
                    }
                }
            }

            let stop_here = match &opts.stop {
                None => false,
                Some(FindUpStop::Path(_)) => stop_path.as_deref() == Some(dir.as_path()),
                Some(FindUpStop::Globs(_)) => {
                    let stop_names = stop_names.as_ref();
                    entries.iter().any(|entry| {
                        file_name_of(entry)
                            .is_some_and(|n| stop_names.is_some_and(|m| m.matches(&n)))
                    })
                }
                Some(FindUpStop::Predicate(pred)) => pred(&dir),
            };
            if stop_here {
                debug!(?dir, "find_up stopped");
                break;
            }

            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(found.map(|entry| {
            if opts.absolute {
                entry
            } else {
                relative_path(&self.root, &entry)
            }
        }))
    }

    /// List a directory, filtered by a name glob (`*` by default), and
    /// register the listing for watching.
    pub fn list(&self, dir: impl AsRef<Path>, opts: &ListOptions) -> Result<Vec<PathBuf>> {
        let abs = resolve(&self.root, dir);
        let glob = opts.glob.clone().unwrap_or_else(|| "*".to_string());

        if self.watch_enabled && opts.watch {
            let matcher_opts = MatcherOptions {
                dot: opts.dot,
                case_insensitive: opts.case_insensitive,
                ..MatcherOptions::new(abs.clone())
            };
            let actions = lock_registry(&self.registry)
                .add_patterns(std::slice::from_ref(&glob), &matcher_opts)?;
            self.watchers.apply(actions);
        }

        let names = NameMatcher::compile(
            std::slice::from_ref(&glob),
            opts.dot,
            opts.case_insensitive,
        )?;
        let entries = self.fs.read_dir(&abs).map_err(EngineError::Io)?;

        let mut out = Vec::new();
        for entry in entries {
            let Some(name) = file_name_of(&entry) else {
                continue;
            };
            if !names.matches(&name) {
                continue;
            }
            out.push(if opts.absolute {
                entry
            } else {
                PathBuf::from(name)
            });
        }
        Ok(out)
    }

    /// Read a file and register it as a dependency.
    pub fn read(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        self.read_with(path, &ReadOptions::default())
    }

    pub fn read_with(&self, path: impl AsRef<Path>, opts: &ReadOptions) -> Result<Vec<u8>> {
        let abs = resolve(&self.root, path);
        self.register_file(
            &abs,
            AddFileOptions {
                causes: Vec::new(),
                critical: opts.critical,
            },
        );
        self.fs.read(&abs).map_err(EngineError::Io)
    }

    pub fn read_to_string(&self, path: impl AsRef<Path>) -> Result<String> {
        self.read_to_string_with(path, &ReadOptions::default())
    }

    pub fn read_to_string_with(
        &self,
        path: impl AsRef<Path>,
        opts: &ReadOptions,
    ) -> Result<String> {
        let bytes = self.read_with(path, opts)?;
        String::from_utf8(bytes)
            .map_err(|err| EngineError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
    }

    /// As `read`, but any I/O failure becomes `None`.
    pub fn try_read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.read(path).ok()
    }

    pub fn try_read_to_string(&self, path: impl AsRef<Path>) -> Option<String> {
        self.read_to_string(path).ok()
    }

    /// Stat a file and register it as a dependency. `None` when missing.
    pub fn stat(&self, path: impl AsRef<Path>) -> Result<Option<FileInfo>> {
        let abs = resolve(&self.root, path);
        self.register_file(&abs, AddFileOptions::default());
        map_stat(self.fs.metadata(&abs))
    }

    pub fn lstat(&self, path: impl AsRef<Path>) -> Result<Option<FileInfo>> {
        let abs = resolve(&self.root, path);
        self.register_file(&abs, AddFileOptions::default());
        map_stat(self.fs.symlink_metadata(&abs))
    }

    /// Probe existence and register an existence watch.
    pub fn exists(&self, path: impl AsRef<Path>) -> bool {
        let abs = resolve(&self.root, path);
        self.register_existence(&abs, ExistenceKind::Any);
        self.fs.exists(&abs)
    }

    pub fn file_exists(&self, path: impl AsRef<Path>) -> bool {
        let abs = resolve(&self.root, path);
        self.register_existence(&abs, ExistenceKind::File);
        self.fs.is_file(&abs)
    }

    pub fn directory_exists(&self, path: impl AsRef<Path>) -> bool {
        let abs = resolve(&self.root, path);
        self.register_existence(&abs, ExistenceKind::Dir);
        self.fs.is_dir(&abs)
    }

    pub fn symlink_exists(&self, path: impl AsRef<Path>) -> bool {
        let abs = resolve(&self.root, path);
        self.register_existence(&abs, ExistenceKind::Any);
        self.fs
            .symlink_metadata(&abs)
            .map(|info| info.is_symlink())
            .unwrap_or(false)
    }

    /// Content-skipping write. Returns whether bytes were written; parents
    /// are created as needed. Writes are not self-dependencies.
    pub fn write(&self, path: impl AsRef<Path>, contents: &[u8]) -> Result<bool> {
        let abs = resolve(&self.root, path);
        if let Ok(existing) = self.fs.read(&abs) {
            if existing == contents {
                debug!(path = ?abs, "write skipped; contents identical");
                return Ok(false);
            }
        }
        self.fs.write(&abs, contents).map_err(EngineError::Io)?;
        debug!(path = ?abs, bytes = contents.len(), "wrote file");
        let _ = self.notices.send(EngineNotice::Write(abs));
        Ok(true)
    }

    /// Watch paths without reading them, optionally blaming other files for
    /// their changes.
    pub fn watch<P: AsRef<Path>>(&self, paths: &[P], opts: &WatchOptions) {
        let causes: Vec<PathBuf> = opts
            .causes
            .iter()
            .map(|cause| resolve(&self.root, cause))
            .collect();
        for path in paths {
            let abs = resolve(&self.root, path);
            self.register_file(
                &abs,
                AddFileOptions {
                    causes: causes.clone(),
                    critical: false,
                },
            );
        }
    }

    fn register_file(&self, abs: &Path, opts: AddFileOptions) {
        if !self.watch_enabled {
            return;
        }
        let actions = lock_registry(&self.registry).add_file(abs, opts);
        self.watchers.apply(actions);
    }

    fn register_existence(&self, abs: &Path, kind: ExistenceKind) {
        if !self.watch_enabled {
            return;
        }
        let actions = lock_registry(&self.registry).add_existence(abs, kind);
        self.watchers.apply(actions);
    }
}

fn map_stat(result: io::Result<FileInfo>) -> Result<Option<FileInfo>> {
    match result {
        Ok(info) => Ok(Some(info)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(EngineError::Io(err)),
    }
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
