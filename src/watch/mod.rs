// src/watch/mod.rs

//! File watching: OS subscriptions, event normalization, and the watch
//! registry.
//!
//! The registry is pure state; the recursive and existence watchers wrap
//! `notify` and consult the registry to decide which events survive. Relevant
//! events flow to the engine lifecycle as [`WatcherMessage`]s.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

pub mod existence;
pub mod recursive;
pub mod registry;

pub use existence::ExistenceWatcher;
pub use recursive::RecursiveWatcher;
pub use registry::{AddFileOptions, ExistenceKind, WatchAction, WatchRegistry};

use crate::errors::EngineError;
use crate::types::FsEvent;

/// Output of the watcher normalizer tasks.
#[derive(Debug)]
pub enum WatcherMessage {
    Event(FsEvent),
    Error(EngineError),
}

/// Lock the shared registry, recovering from poisoning. Registry mutations
/// are short and do not hold the lock across await points.
pub(crate) fn lock_registry(registry: &Arc<Mutex<WatchRegistry>>) -> MutexGuard<'_, WatchRegistry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handles to the OS-level watchers; empty when watching is disabled.
#[derive(Debug, Clone, Default)]
pub struct Watchers {
    pub recursive: Option<RecursiveWatcher>,
    pub existence: Option<ExistenceWatcher>,
}

impl Watchers {
    /// Apply registry-produced actions to the OS watchers.
    pub fn apply(&self, actions: Vec<WatchAction>) {
        for action in actions {
            match action {
                WatchAction::Watch { path, recursive } => {
                    if let Some(watcher) = &self.recursive {
                        if let Err(err) = watcher.watch_path(&path, recursive) {
                            warn!(?path, error = %err, "failed to add watch");
                        }
                    }
                }
                WatchAction::Unwatch(path) => {
                    if let Some(recursive) = &self.recursive {
                        recursive.unwatch_path(&path);
                    }
                }
                WatchAction::WatchShallow(path) => {
                    if let Some(existence) = &self.existence {
                        existence.watch_parent(&path);
                    }
                }
                WatchAction::UnwatchShallow(path) => {
                    if let Some(existence) = &self.existence {
                        existence.unwatch_parent(&path);
                    }
                }
            }
        }
    }

    /// Drop every OS subscription.
    pub fn close(&self) {
        if let Some(recursive) = &self.recursive {
            recursive.close();
        }
        if let Some(existence) = &self.existence {
            existence.close();
        }
    }

    /// Drop every subscription, then re-anchor the recursive root watch.
    pub fn reset(&self, root: &Path) {
        if let Some(recursive) = &self.recursive {
            recursive.reset(root);
        }
        if let Some(existence) = &self.existence {
            existence.close();
        }
    }
}
