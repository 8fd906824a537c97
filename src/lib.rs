// src/lib.rs

//! `regen` is a reactive filesystem access engine for build-time code
//! generators.
//!
//! A user-supplied generator body reads, scans, writes, and probes files
//! through an engine-provided [`Context`]; the engine records every observed
//! dependency and, in watch mode, reruns the body automatically when any of
//! them changes. The engine is the sole mediator between generator code and
//! the filesystem, so dependency tracking is transparent and complete.
//!
//! ```no_run
//! use regen::{Engine, EngineOptions, ScanOptions};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let engine = Engine::new(
//!     EngineOptions::new("/path/to/project").watch(true),
//!     |ctx: regen::Context| async move {
//!         let sources = ctx.fs().scan(&["src/**/*.rs"], &ScanOptions::default())?;
//!         let manifest = sources
//!             .iter()
//!             .map(|p| p.display().to_string())
//!             .collect::<Vec<_>>()
//!             .join("\n");
//!         ctx.fs().write("generated/manifest.txt", manifest.as_bytes())?;
//!         Ok(sources.len())
//!     },
//! )?;
//!
//! let count = engine.result().await;
//! # Ok(())
//! # }
//! ```

pub mod abort;
pub mod changes;
pub mod context;
pub mod engine;
pub mod errors;
pub mod events;
pub mod fs;
pub mod logging;
pub mod path_utils;
pub mod patterns;
pub mod store;
pub mod types;
pub mod watch;

pub use abort::{AbortController, AbortSignal};
pub use changes::{Change, ChangeLog};
pub use context::{
    Context, ContextFs, FindUpOptions, FindUpStop, ListOptions, ReadOptions, ScanOptions,
    WatchOptions,
};
pub use engine::{
    compose, Composition, Engine, EngineFactory, EngineOptions, Generator, RunResult, WatcherView,
};
pub use errors::{EngineError, Result};
pub use events::{EngineEvent, EngineEvents};
pub use fs::{FileInfo, FileKind, FileSystem, RealFileSystem};
pub use logging::init_logging;
pub use store::Store;
pub use types::{AbortReason, ChangeKind, FsEvent, FsEventKind, RunStatus, WatchMode};
