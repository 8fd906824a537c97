// src/engine/compose.rs

//! Parallel composition of engines over a shared event bus.
//!
//! Children run concurrently and independently; the composition aggregates
//! lifecycle state, fans out `rerun`/`destroy`, and exposes the union of the
//! children's watch registries.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::debug;

use crate::errors::{EngineError, Result};
use crate::events::EngineEvents;
use crate::types::RunStatus;

use super::lifecycle::{Engine, RunResult};

/// Builds one child engine over the shared bus.
pub type EngineFactory<T> = Box<dyn FnOnce(EngineEvents<T>) -> Result<Engine<T>> + Send>;

/// Build each child with a shared emitter.
pub fn compose<T>(factories: Vec<EngineFactory<T>>) -> Result<Composition<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let events = EngineEvents::new();
    let mut engines = Vec::with_capacity(factories.len());
    for factory in factories {
        engines.push(factory(events.clone())?);
    }
    debug!(children = engines.len(), "composition built");
    Ok(Composition { engines, events })
}

pub struct Composition<T> {
    engines: Vec<Engine<T>>,
    events: EngineEvents<T>,
}

impl<T: Clone + Send + Sync + 'static> Composition<T> {
    pub fn events(&self) -> EngineEvents<T> {
        self.events.clone()
    }

    pub fn engines(&self) -> &[Engine<T>] {
        &self.engines
    }

    /// `Running` if any child is, else `Pending` if any is, else `Finished`.
    pub fn status(&self) -> RunStatus {
        let statuses: Vec<RunStatus> = self.engines.iter().map(Engine::status).collect();
        if statuses.contains(&RunStatus::Running) {
            RunStatus::Running
        } else if statuses.contains(&RunStatus::Pending) {
            RunStatus::Pending
        } else {
            RunStatus::Finished
        }
    }

    /// Results of every child in construction order, waiting for each to
    /// settle.
    pub async fn results(&self) -> Vec<RunResult<T>> {
        let mut results = Vec::with_capacity(self.engines.len());
        for engine in &self.engines {
            results.push(engine.result().await);
        }
        results
    }

    /// Rerun every child; resolves when each has started again.
    pub async fn rerun(&self) -> Result<()> {
        let handles: Vec<_> = self
            .engines
            .iter()
            .map(|engine| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.rerun().await })
            })
            .collect();
        for handle in handles {
            handle
                .await
                .map_err(|err| EngineError::Internal(err.to_string()))??;
        }
        Ok(())
    }

    /// Destroy every child.
    pub async fn destroy(&self) -> Result<()> {
        for engine in &self.engines {
            engine.destroy().await?;
        }
        Ok(())
    }

    /// Union of the children's watched files.
    pub fn watched_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .engines
            .iter()
            .filter_map(Engine::watcher)
            .flat_map(|view| view.watched_files())
            .collect();
        files.sort();
        files.dedup();
        files
    }

    /// Union of the children's blame mappings, causes merged in insertion
    /// order.
    pub fn blamed_files(&self) -> Vec<(PathBuf, Vec<PathBuf>)> {
        let mut merged: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
        for view in self.engines.iter().filter_map(Engine::watcher) {
            for (path, causes) in view.blamed_files() {
                let entry = merged.entry(path).or_default();
                for cause in causes {
                    if !entry.contains(&cause) {
                        entry.push(cause);
                    }
                }
            }
        }
        merged.into_iter().collect()
    }
}
