// src/watch/existence.rs

//! Existence watcher: shallow (depth 0) subscriptions on the parent
//! directories of `exists*` probes.
//!
//! Change events are suppressed entirely; an add/unlink is relevant only when
//! the path is registered as a probe of the matching kind and is not already
//! delivered by the recursive watcher.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::errors::{EngineError, Result};
use crate::fs::FileSystem;
use crate::path_utils::normalize;
use crate::types::FsEvent;
use crate::watch::recursive::normalize_kind;
use crate::watch::registry::WatchRegistry;
use crate::watch::{lock_registry, WatcherMessage};

#[derive(Clone)]
pub struct ExistenceWatcher {
    watcher: Arc<Mutex<RecommendedWatcher>>,
    /// Parent directory -> number of probes relying on it.
    dirs: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

impl fmt::Debug for ExistenceWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExistenceWatcher").finish_non_exhaustive()
    }
}

impl ExistenceWatcher {
    pub fn spawn(
        registry: Arc<Mutex<WatchRegistry>>,
        fs: Arc<dyn FileSystem>,
        messages: mpsc::UnboundedSender<WatcherMessage>,
    ) -> Result<Self> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = raw_tx.send(res);
            },
            Config::default(),
        )?;

        let this = Self {
            watcher: Arc::new(Mutex::new(watcher)),
            dirs: Arc::new(Mutex::new(HashMap::new())),
        };

        tokio::spawn(async move {
            while let Some(res) = raw_rx.recv().await {
                match res {
                    Ok(event) => {
                        for path in &event.paths {
                            let path = normalize(path);
                            let Some(kind) = normalize_kind(&event.kind, &path, fs.as_ref())
                            else {
                                continue;
                            };
                            let accepted =
                                lock_registry(&registry).accepts_existence(&path, kind);
                            if accepted {
                                trace!(kind = %kind, ?path, "existence event");
                                let message = WatcherMessage::Event(FsEvent { kind, path });
                                if messages.send(message).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Err(err) => {
                        if messages
                            .send(WatcherMessage::Error(EngineError::Notify(err)))
                            .is_err()
                        {
                            return;
                        }
                    }
                }
            }
            debug!("existence watcher event loop finished");
        });

        Ok(this)
    }

    /// Add one reference to the shallow subscription on `dir`.
    pub fn watch_parent(&self, dir: &Path) {
        let mut dirs = self.dirs.lock().unwrap_or_else(|p| p.into_inner());
        let count = dirs.entry(dir.to_path_buf()).or_insert(0);
        *count += 1;
        if *count == 1 {
            let mut watcher = self.watcher.lock().unwrap_or_else(|p| p.into_inner());
            if let Err(err) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                // Probing a path under a missing directory is legitimate; the
                // probe just cannot observe until the directory appears.
                debug!(?dir, error = %err, "existence subscription failed");
            } else {
                debug!(?dir, "existence subscription added");
            }
        }
    }

    /// Release one reference; the subscription is dropped with the last one.
    pub fn unwatch_parent(&self, dir: &Path) {
        let mut dirs = self.dirs.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(count) = dirs.get_mut(dir) {
            *count -= 1;
            if *count == 0 {
                dirs.remove(dir);
                let mut watcher = self.watcher.lock().unwrap_or_else(|p| p.into_inner());
                let _ = watcher.unwatch(dir);
                debug!(?dir, "existence subscription dropped");
            }
        }
    }

    /// Drop every subscription.
    pub fn close(&self) {
        let paths: Vec<_> = {
            let mut dirs = self.dirs.lock().unwrap_or_else(|p| p.into_inner());
            dirs.drain().map(|(path, _)| path).collect()
        };
        let mut watcher = self.watcher.lock().unwrap_or_else(|p| p.into_inner());
        for path in paths {
            let _ = watcher.unwatch(&path);
        }
    }
}
