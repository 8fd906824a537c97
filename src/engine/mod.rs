// src/engine/mod.rs

//! Engine assembly.
//!
//! This module ties together:
//! - factory options (`root`, `watch`, `name`)
//! - the [`Generator`] trait the user body implements
//! - the run lifecycle actor in [`lifecycle`]
//! - parallel composition of engines over a shared bus in [`compose`]
//!
//! The lifecycle loop is the only place that runs bodies; everything else
//! communicates with it over channels.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::sync::oneshot;

pub mod compose;
pub mod lifecycle;

pub use compose::{compose, Composition, EngineFactory};
pub use lifecycle::{Engine, RunResult, WatcherView};

use crate::context::Context;
use crate::errors::{EngineError, Result};
use crate::path_utils::normalize;
use crate::types::WatchMode;

/// Boxed future returned by generator bodies.
pub type GeneratorFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send>>;

/// A generator body. The engine calls it once per run with a fresh context.
///
/// Implemented for any `Fn(Context)` returning a sendable future.
pub trait Generator<T>: Send + Sync + 'static {
    fn run(&self, ctx: Context) -> GeneratorFuture<T>;
}

impl<F, Fut, T> Generator<T> for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    fn run(&self, ctx: Context) -> GeneratorFuture<T> {
        Box::pin((self)(ctx))
    }
}

/// Factory configuration for an engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    root: PathBuf,
    watch: WatchMode,
    name: String,
}

impl EngineOptions {
    /// `root` is made absolute against the process working directory and
    /// stripped of any trailing separator.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.is_absolute() {
            normalize(&root)
        } else {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            normalize(&cwd.join(root))
        };
        Self {
            root,
            watch: WatchMode::default(),
            name: "generator".to_string(),
        }
    }

    /// Enable or disable watch mode. Off by default.
    pub fn watch(mut self, enabled: bool) -> Self {
        self.watch = WatchMode::Flag(enabled);
        self
    }

    /// Enable watch mode with initial paths/globs watched before the first
    /// run. Entries are resolved against the root and must not be negated.
    pub fn watch_initial(
        mut self,
        entries: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.watch = WatchMode::Initial(entries.into_iter().map(Into::into).collect());
        self
    }

    pub fn watch_mode(mut self, mode: WatchMode) -> Self {
        self.watch = mode;
        self
    }

    /// Name used to tag events on a shared bus.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn engine_name(&self) -> &str {
        &self.name
    }

    pub fn watch_enabled(&self) -> bool {
        self.watch.is_enabled()
    }

    pub fn watch_entries(&self) -> &[String] {
        self.watch.initial_entries()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        for entry in self.watch_entries() {
            if entry.starts_with('!') {
                return Err(EngineError::InvalidWatchPattern(entry.clone()));
            }
        }
        Ok(())
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Internal notifications from a running body to its engine loop.
#[derive(Debug)]
pub(crate) enum EngineNotice {
    Write(PathBuf),
    Custom(String),
}

/// Commands from the public handle to the engine loop.
#[derive(Debug)]
pub(crate) enum EngineCommand {
    Rerun,
    Destroy(oneshot::Sender<()>),
}
