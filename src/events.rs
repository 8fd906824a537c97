// src/events.rs

//! The typed event bus.
//!
//! Every engine emits its lifecycle onto an [`EngineEvents`] bus; composed
//! engines share one bus and tag each event with the emitting engine's name.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::errors::EngineError;
use crate::types::{AbortReason, FsEventKind};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Typed events emitted by an engine.
#[derive(Debug, Clone)]
pub enum EngineEvent<T> {
    /// A run is about to execute the generator body.
    Start { name: String },
    /// A relevant filesystem event was observed.
    Watch {
        kind: FsEventKind,
        path: PathBuf,
        name: String,
    },
    /// `fs.write` performed a byte-level write.
    Write { path: PathBuf, name: String },
    /// The body resolved with a result.
    Finish { result: T, name: String },
    /// The body failed with a non-abort error.
    Error {
        error: Arc<EngineError>,
        name: String,
    },
    /// The run's cancellation token fired.
    Abort { reason: AbortReason, name: String },
    /// The engine reached its terminal state.
    Destroy { name: String },
    /// A generator-emitted event.
    Custom { event: String, name: String },
}

impl<T> EngineEvent<T> {
    /// Name of the engine that emitted this event.
    pub fn name(&self) -> &str {
        match self {
            EngineEvent::Start { name }
            | EngineEvent::Watch { name, .. }
            | EngineEvent::Write { name, .. }
            | EngineEvent::Finish { name, .. }
            | EngineEvent::Error { name, .. }
            | EngineEvent::Abort { name, .. }
            | EngineEvent::Destroy { name }
            | EngineEvent::Custom { name, .. } => name,
        }
    }
}

/// Shared event bus. Cheap to clone; clones publish to and subscribe from the
/// same channel. Subscribers only observe events emitted after subscribing.
#[derive(Debug)]
pub struct EngineEvents<T> {
    tx: broadcast::Sender<EngineEvent<T>>,
}

impl<T> Clone for EngineEvents<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T: Clone> EngineEvents<T> {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent<T>> {
        self.tx.subscribe()
    }

    /// Publish an event. A bus with no subscribers drops events silently.
    pub(crate) fn emit(&self, event: EngineEvent<T>) {
        let _ = self.tx.send(event);
    }
}

impl<T: Clone> Default for EngineEvents<T> {
    fn default() -> Self {
        Self::new()
    }
}
