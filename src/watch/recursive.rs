// src/watch/recursive.rs

//! Recursive watcher: one `notify` instance covering the engine root plus
//! direct subscriptions for paths outside it.
//!
//! The synchronous notify callback forwards raw events over an unbounded
//! channel into an async normalizer task, which classifies each path into a
//! normalized kind, lets the registry release fallback bookkeeping on adds,
//! and forwards events that survive the registry filter.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::errors::{EngineError, Result};
use crate::fs::FileSystem;
use crate::path_utils::normalize;
use crate::types::{FsEvent, FsEventKind};
use crate::watch::registry::{WatchAction, WatchRegistry};
use crate::watch::{lock_registry, WatcherMessage};

#[derive(Clone)]
pub struct RecursiveWatcher {
    watcher: Arc<Mutex<RecommendedWatcher>>,
    /// Paths with a direct OS subscription and the mode each was taken in.
    roots: Arc<Mutex<HashMap<PathBuf, RecursiveMode>>>,
}

impl fmt::Debug for RecursiveWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecursiveWatcher").finish_non_exhaustive()
    }
}

impl RecursiveWatcher {
    /// Create the watcher and spawn its normalizer task. Events that survive
    /// the registry filter are forwarded to `messages`.
    pub fn spawn(
        registry: Arc<Mutex<WatchRegistry>>,
        fs: Arc<dyn FileSystem>,
        messages: mpsc::UnboundedSender<WatcherMessage>,
    ) -> Result<Self> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // Receiver gone means the engine loop exited; drop silently.
                let _ = raw_tx.send(res);
            },
            Config::default(),
        )?;

        let this = Self {
            watcher: Arc::new(Mutex::new(watcher)),
            roots: Arc::new(Mutex::new(HashMap::new())),
        };

        let handle = this.clone();
        tokio::spawn(async move {
            while let Some(res) = raw_rx.recv().await {
                match res {
                    Ok(event) => {
                        trace!(?event, "raw notify event");
                        for path in &event.paths {
                            let path = normalize(path);
                            let Some(kind) = normalize_kind(&event.kind, &path, fs.as_ref())
                            else {
                                continue;
                            };

                            let (actions, accepted) = {
                                let mut reg = lock_registry(&registry);
                                let actions = if kind.is_add() {
                                    reg.check_added_path(&path)
                                } else {
                                    Vec::new()
                                };
                                (actions, reg.accepts(&path, kind))
                            };

                            for action in actions {
                                handle.apply(action);
                            }

                            if accepted {
                                debug!(kind = %kind, ?path, "relevant filesystem event");
                                let message = WatcherMessage::Event(FsEvent { kind, path });
                                if messages.send(message).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "file watch error");
                        if messages
                            .send(WatcherMessage::Error(EngineError::Notify(err)))
                            .is_err()
                        {
                            return;
                        }
                    }
                }
            }
            debug!("recursive watcher event loop finished");
        });

        Ok(this)
    }

    /// Subscribe to `path`, unless an existing subscription already covers
    /// it. A recursive request upgrades a previous non-recursive one.
    pub fn watch_path(&self, path: &Path, recursive: bool) -> Result<()> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        let mut roots = self.roots.lock().unwrap_or_else(|p| p.into_inner());
        let covered = roots.iter().any(|(root, existing)| {
            let existing_recursive = matches!(existing, RecursiveMode::Recursive);
            if path == root.as_path() {
                !recursive || existing_recursive
            } else {
                existing_recursive && path.starts_with(root)
            }
        });
        if covered {
            return Ok(());
        }

        let mut watcher = self.watcher.lock().unwrap_or_else(|p| p.into_inner());
        if roots.contains_key(path) {
            // Upgrade: notify has no mode change, so re-subscribe.
            let _ = watcher.unwatch(path);
        }
        watcher.watch(path, mode)?;
        debug!(?path, recursive, "subscription added");
        roots.insert(path.to_path_buf(), mode);
        Ok(())
    }

    /// Drop a direct subscription. Paths covered only by an ancestor
    /// subscription are unaffected.
    pub fn unwatch_path(&self, path: &Path) {
        let mut roots = self.roots.lock().unwrap_or_else(|p| p.into_inner());
        if roots.remove(path).is_some() {
            let mut watcher = self.watcher.lock().unwrap_or_else(|p| p.into_inner());
            if let Err(err) = watcher.unwatch(path) {
                // The path may already be gone; notify treats that as an error.
                debug!(?path, error = %err, "unwatch failed");
            }
        }
    }

    /// Drop every subscription.
    pub fn close(&self) {
        let paths: Vec<_> = {
            let mut roots = self.roots.lock().unwrap_or_else(|p| p.into_inner());
            roots.drain().map(|(path, _)| path).collect()
        };
        let mut watcher = self.watcher.lock().unwrap_or_else(|p| p.into_inner());
        for path in paths {
            let _ = watcher.unwatch(&path);
        }
    }

    /// Drop every subscription and re-anchor on `root`.
    pub fn reset(&self, root: &Path) {
        self.close();
        if let Err(err) = self.watch_path(root, true) {
            warn!(?root, error = %err, "failed to re-anchor root subscription");
        }
    }

    fn apply(&self, action: WatchAction) {
        match action {
            WatchAction::Watch { path, recursive } => {
                if let Err(err) = self.watch_path(&path, recursive) {
                    warn!(?path, error = %err, "failed to add watch");
                }
            }
            WatchAction::Unwatch(path) => self.unwatch_path(&path),
            // Existence actions never originate from add bookkeeping.
            WatchAction::WatchShallow(_) | WatchAction::UnwatchShallow(_) => {}
        }
    }
}

/// Classify a raw notify kind into a normalized event kind, using the current
/// state of the path to disambiguate renames and coarse events.
pub(crate) fn normalize_kind(
    kind: &EventKind,
    path: &Path,
    fs: &dyn FileSystem,
) -> Option<FsEventKind> {
    match kind {
        EventKind::Create(CreateKind::Folder) => Some(FsEventKind::AddDir),
        EventKind::Create(_) => Some(if fs.is_dir(path) {
            FsEventKind::AddDir
        } else {
            FsEventKind::Add
        }),
        EventKind::Remove(RemoveKind::Folder) => Some(FsEventKind::UnlinkDir),
        EventKind::Remove(_) => Some(FsEventKind::Unlink),
        EventKind::Modify(ModifyKind::Name(_)) => {
            if fs.is_dir(path) {
                Some(FsEventKind::AddDir)
            } else if fs.exists(path) {
                Some(FsEventKind::Add)
            } else {
                Some(FsEventKind::Unlink)
            }
        }
        EventKind::Modify(_) => {
            if !fs.exists(path) {
                Some(FsEventKind::Unlink)
            } else if fs.is_dir(path) {
                // Directory content mutations surface as child events.
                None
            } else {
                Some(FsEventKind::Change)
            }
        }
        EventKind::Access(_) => None,
        EventKind::Any | EventKind::Other => {
            if fs.is_file(path) {
                Some(FsEventKind::Change)
            } else {
                None
            }
        }
    }
}
