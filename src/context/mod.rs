// src/context/mod.rs

//! The generator context: everything a body sees.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

pub mod fs;

pub use fs::{
    ContextFs, FindUpOptions, FindUpStop, ListOptions, ReadOptions, ScanOptions, WatchOptions,
};

use crate::abort::AbortSignal;
use crate::changes::Change;
use crate::engine::EngineNotice;
use crate::store::Store;

/// Handed to the generator body on every run. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Context {
    name: String,
    root: Arc<Path>,
    store: Store,
    changes: Arc<Vec<Change>>,
    signal: AbortSignal,
    fs: ContextFs,
    notices: mpsc::UnboundedSender<EngineNotice>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: String,
        root: Arc<Path>,
        store: Store,
        changes: Arc<Vec<Change>>,
        signal: AbortSignal,
        fs: ContextFs,
        notices: mpsc::UnboundedSender<EngineNotice>,
    ) -> Self {
        Self {
            name,
            root,
            store,
            changes,
            signal,
            fs,
            notices,
        }
    }

    /// Name of the engine running this body.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute engine root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// User-owned state, preserved across soft resets.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Folded changes observed since the previous run's start. Empty on the
    /// first run.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// This run's cancellation signal.
    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    /// The filesystem facade.
    pub fn fs(&self) -> &ContextFs {
        &self.fs
    }

    /// Publish a custom event on the engine's bus.
    pub fn emit(&self, event: impl Into<String>) {
        let _ = self.notices.send(EngineNotice::Custom(event.into()));
    }
}
