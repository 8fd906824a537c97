// src/engine/lifecycle.rs

//! The run lifecycle: a state machine over {Pending, Running, Finished}
//! driven by an event loop that selects over the generator body, watcher
//! messages, and public commands.
//!
//! Invariants the loop maintains:
//! - at most one body executes per engine at any time,
//! - a fresh cancellation token is installed before every `Running`,
//! - exactly one reset (hard or soft) runs between two bodies,
//! - events folded during a run are exposed as `changes` to the next run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::abort::AbortController;
use crate::changes::{Change, ChangeLog};
use crate::context::{Context, ContextFs};
use crate::errors::{is_abort_error, EngineError, Result};
use crate::events::{EngineEvent, EngineEvents};
use crate::fs::{FileSystem, RealFileSystem};
use crate::path_utils::{is_glob, resolve};
use crate::patterns::MatcherOptions;
use crate::store::Store;
use crate::types::{AbortReason, ChangeKind, RunStatus};
use crate::watch::registry::AddFileOptions;
use crate::watch::{
    lock_registry, ExistenceWatcher, RecursiveWatcher, WatchRegistry, WatcherMessage, Watchers,
};

use super::{EngineCommand, EngineNotice, EngineOptions, Generator};

/// Outcome of a run, shared with every waiter.
pub type RunResult<T> = std::result::Result<T, Arc<EngineError>>;

/// Public handle to a running engine. Cheap to clone; all clones drive the
/// same lifecycle.
pub struct Engine<T> {
    inner: Arc<EngineShared<T>>,
}

impl<T> Clone for Engine<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Engine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.inner.name)
            .field("root", &self.inner.root)
            .finish_non_exhaustive()
    }
}

struct EngineShared<T> {
    name: String,
    root: Arc<Path>,
    watch_enabled: bool,
    events: EngineEvents<T>,
    registry: Arc<Mutex<WatchRegistry>>,
    status_rx: watch::Receiver<RunStatus>,
    result_rx: watch::Receiver<Option<RunResult<T>>>,
    started_rx: watch::Receiver<bool>,
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    destroyed: Arc<AtomicBool>,
}

impl<T: Clone + Send + Sync + 'static> Engine<T> {
    /// Build an engine with a private event bus and schedule its first run.
    ///
    /// The first run begins once the spawned lifecycle task is polled, so
    /// callers may subscribe to events immediately after construction without
    /// missing `start`.
    pub fn new(options: EngineOptions, generator: impl Generator<T>) -> Result<Self> {
        Self::with_events(options, EngineEvents::new(), generator)
    }

    /// As [`Engine::new`], but emitting onto a shared bus.
    pub fn with_events(
        options: EngineOptions,
        events: EngineEvents<T>,
        generator: impl Generator<T>,
    ) -> Result<Self> {
        options.validate()?;

        let name = options.engine_name().to_string();
        let root: Arc<Path> = Arc::from(options.root().to_path_buf());
        let watch_enabled = options.watch_enabled();

        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let registry = Arc::new(Mutex::new(WatchRegistry::new(
            root.to_path_buf(),
            Arc::clone(&fs),
        )));

        let (messages_tx, messages_rx) = mpsc::unbounded_channel();
        let watchers = if watch_enabled {
            let recursive =
                RecursiveWatcher::spawn(Arc::clone(&registry), Arc::clone(&fs), messages_tx.clone())?;
            recursive.watch_path(&root, true)?;
            let existence =
                ExistenceWatcher::spawn(Arc::clone(&registry), Arc::clone(&fs), messages_tx)?;
            Watchers {
                recursive: Some(recursive),
                existence: Some(existence),
            }
        } else {
            drop(messages_tx);
            Watchers::default()
        };

        if watch_enabled {
            register_initial_watches(&root, &registry, &watchers, options.watch_entries())?;
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(RunStatus::Pending);
        let (result_tx, result_rx) = watch::channel(None);
        let (started_tx, started_rx) = watch::channel(false);
        let destroyed = Arc::new(AtomicBool::new(false));

        let lifecycle = LifecycleLoop {
            name: name.clone(),
            root: Arc::clone(&root),
            watch_enabled,
            generator: Arc::new(generator),
            fs,
            registry: Arc::clone(&registry),
            watchers,
            store: Store::new(),
            events: events.clone(),
            messages_rx,
            cmd_rx,
            notice_rx,
            notice_tx,
            status_tx,
            result_tx,
            started_tx,
            destroyed: Arc::clone(&destroyed),
            initial_entries: options.watch_entries().to_vec(),
            log: ChangeLog::new(),
            pending_changes: Vec::new(),
            abort: AbortController::new(),
            handle_dropped: false,
        };
        tokio::spawn(lifecycle.run());

        Ok(Self {
            inner: Arc::new(EngineShared {
                name,
                root,
                watch_enabled,
                events,
                registry,
                status_rx,
                result_rx,
                started_rx,
                cmd_tx,
                destroyed,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn status(&self) -> RunStatus {
        *self.inner.status_rx.borrow()
    }

    pub fn events(&self) -> EngineEvents<T> {
        self.inner.events.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Watch-mode introspection; `None` when watching is disabled.
    pub fn watcher(&self) -> Option<WatcherView> {
        self.inner.watch_enabled.then(|| WatcherView {
            registry: Arc::clone(&self.inner.registry),
            started: self.inner.started_rx.clone(),
        })
    }

    /// Resolves once the engine has emitted its first `start`. With a
    /// timeout, elapses into [`EngineError::StartTimeout`]; the engine itself
    /// is unaffected.
    pub async fn wait_for_start(&self, timeout: Option<Duration>) -> Result<()> {
        if self.is_destroyed() {
            return Err(EngineError::Destroyed);
        }
        let mut started = self.inner.started_rx.clone();
        let wait = async move {
            loop {
                if *started.borrow_and_update() {
                    return Ok(());
                }
                if started.changed().await.is_err() {
                    return Err(EngineError::Destroyed);
                }
            }
        };
        match timeout {
            Some(duration) => tokio::time::timeout(duration, wait)
                .await
                .map_err(|_| EngineError::StartTimeout(duration))?,
            None => wait.await,
        }
    }

    /// Schedule a new run and resolve when it starts. Aborts the current run
    /// if one is executing.
    pub async fn rerun(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(EngineError::Destroyed);
        }
        let mut events = self.inner.events.subscribe();
        self.inner
            .cmd_tx
            .send(EngineCommand::Rerun)
            .map_err(|_| EngineError::Destroyed)?;
        loop {
            match events.recv().await {
                Ok(EngineEvent::Start { name }) if name == self.inner.name => return Ok(()),
                Ok(EngineEvent::Destroy { name }) if name == self.inner.name => {
                    return Err(EngineError::Destroyed)
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return Err(EngineError::Destroyed),
            }
        }
    }

    /// Abort any current run, close all watchers, and emit `destroy`. The
    /// engine is terminal afterwards.
    pub async fn destroy(&self) -> Result<()> {
        if self.is_destroyed() {
            return Ok(());
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .inner
            .cmd_tx
            .send(EngineCommand::Destroy(ack_tx))
            .is_err()
        {
            return Ok(());
        }
        let _ = ack_rx.await;
        Ok(())
    }

    /// The result of the current run, waiting for it to settle first. Errors
    /// are shared between waiters.
    pub async fn result(&self) -> RunResult<T> {
        let mut rx = self.inner.result_rx.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(result) = current {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err(Arc::new(EngineError::Destroyed));
            }
        }
    }
}

/// Watch-mode introspection surface.
#[derive(Debug, Clone)]
pub struct WatcherView {
    registry: Arc<Mutex<WatchRegistry>>,
    started: watch::Receiver<bool>,
}

impl WatcherView {
    /// Resolves once the watchers are serving a run. Subscriptions are
    /// installed synchronously at construction, so this coincides with the
    /// first `start`.
    pub async fn ready(&self) {
        let mut started = self.started.clone();
        loop {
            if *started.borrow_and_update() {
                return;
            }
            if started.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn watched_files(&self) -> Vec<PathBuf> {
        lock_registry(&self.registry).watched_files()
    }

    pub fn blamed_files(&self) -> Vec<(PathBuf, Vec<PathBuf>)> {
        lock_registry(&self.registry).blamed_files()
    }
}

struct LifecycleLoop<T: Clone + Send + Sync + 'static> {
    name: String,
    root: Arc<Path>,
    watch_enabled: bool,
    generator: Arc<dyn Generator<T>>,
    fs: Arc<dyn FileSystem>,
    registry: Arc<Mutex<WatchRegistry>>,
    watchers: Watchers,
    store: Store,
    events: EngineEvents<T>,
    messages_rx: mpsc::UnboundedReceiver<WatcherMessage>,
    cmd_rx: mpsc::UnboundedReceiver<EngineCommand>,
    notice_rx: mpsc::UnboundedReceiver<EngineNotice>,
    notice_tx: mpsc::UnboundedSender<EngineNotice>,
    status_tx: watch::Sender<RunStatus>,
    result_tx: watch::Sender<Option<RunResult<T>>>,
    started_tx: watch::Sender<bool>,
    destroyed: Arc<AtomicBool>,
    initial_entries: Vec<String>,
    log: ChangeLog,
    pending_changes: Vec<Change>,
    abort: AbortController,
    handle_dropped: bool,
}

impl<T: Clone + Send + Sync + 'static> LifecycleLoop<T> {
    async fn run(mut self) {
        debug!(engine = %self.name, root = ?self.root, "engine loop started");

        loop {
            // Fresh token before entering Running.
            self.abort = AbortController::new();
            self.status_tx.send_replace(RunStatus::Running);
            self.result_tx.send_replace(None);

            let ctx = self.make_context();
            info!(
                engine = %self.name,
                changes = self.pending_changes.len(),
                "run starting"
            );
            self.events.emit(EngineEvent::Start {
                name: self.name.clone(),
            });
            self.started_tx.send_replace(true);

            let mut body = tokio::spawn(self.generator.run(ctx));
            let mut rerun_pending = false;
            let mut destroy_ack: Option<oneshot::Sender<()>> = None;

            let outcome = loop {
                tokio::select! {
                    res = &mut body => break res,
                    Some(message) = self.messages_rx.recv() => {
                        if self.ingest(message) && destroy_ack.is_none() && !rerun_pending {
                            self.supersede(AbortReason::Watch);
                            rerun_pending = true;
                        }
                    }
                    Some(notice) = self.notice_rx.recv() => self.emit_notice(notice),
                    cmd = self.cmd_rx.recv(), if !self.handle_dropped => match cmd {
                        Some(EngineCommand::Rerun) => {
                            if destroy_ack.is_none() && !rerun_pending {
                                self.supersede(AbortReason::Rerun);
                                rerun_pending = true;
                            }
                        }
                        Some(EngineCommand::Destroy(ack)) => {
                            self.abort.abort(AbortReason::Destroy);
                            self.events.emit(EngineEvent::Abort {
                                reason: AbortReason::Destroy,
                                name: self.name.clone(),
                            });
                            destroy_ack = Some(ack);
                        }
                        None => {
                            // Every public handle is gone; wind down once the
                            // body settles.
                            self.abort.abort(AbortReason::Destroy);
                            self.handle_dropped = true;
                        }
                    }
                }
            };

            // Notices sent by the body are ordered before its completion.
            while let Ok(notice) = self.notice_rx.try_recv() {
                self.emit_notice(notice);
            }

            let aborted = self.abort.is_aborted();

            // Publish the terminal status before the result so waiters woken
            // by the result observe a settled engine.
            if !self.handle_dropped && destroy_ack.is_none() && !rerun_pending {
                self.status_tx.send_replace(RunStatus::Finished);
            }

            match outcome {
                Ok(Ok(value)) => {
                    if !aborted {
                        debug!(engine = %self.name, "run finished");
                        self.result_tx.send_replace(Some(Ok(value.clone())));
                        self.events.emit(EngineEvent::Finish {
                            result: value,
                            name: self.name.clone(),
                        });
                    }
                }
                Ok(Err(err)) => {
                    if is_abort_error(&err) {
                        debug!(engine = %self.name, "run aborted");
                    } else {
                        let error = Arc::new(EngineError::Other(err));
                        warn!(engine = %self.name, error = %error, "run failed");
                        self.result_tx.send_replace(Some(Err(Arc::clone(&error))));
                        self.events.emit(EngineEvent::Error {
                            error,
                            name: self.name.clone(),
                        });
                    }
                }
                Err(join_err) => {
                    if join_err.is_panic() {
                        let error = Arc::new(EngineError::Internal(format!(
                            "generator panicked: {join_err}"
                        )));
                        warn!(engine = %self.name, error = %error, "run panicked");
                        self.result_tx.send_replace(Some(Err(Arc::clone(&error))));
                        self.events.emit(EngineEvent::Error {
                            error,
                            name: self.name.clone(),
                        });
                    }
                }
            }

            if self.handle_dropped {
                self.shutdown(None);
                return;
            }
            if let Some(ack) = destroy_ack {
                self.shutdown(Some(ack));
                return;
            }
            if rerun_pending {
                self.perform_reset();
                continue;
            }

            // Idle until a relevant change or a command arrives.
            loop {
                tokio::select! {
                    Some(message) = self.messages_rx.recv() => {
                        if self.ingest(message) {
                            break;
                        }
                    }
                    Some(notice) = self.notice_rx.recv() => self.emit_notice(notice),
                    cmd = self.cmd_rx.recv(), if !self.handle_dropped => match cmd {
                        Some(EngineCommand::Rerun) => break,
                        Some(EngineCommand::Destroy(ack)) => {
                            self.shutdown(Some(ack));
                            return;
                        }
                        None => self.handle_dropped = true,
                    }
                }
                if self.handle_dropped {
                    self.shutdown(None);
                    return;
                }
            }

            // Coalesce any events already queued into the same reset.
            while let Ok(message) = self.messages_rx.try_recv() {
                self.ingest(message);
            }
            self.perform_reset();
        }
    }

    /// Abort the current run so a new one can be scheduled.
    fn supersede(&mut self, reason: AbortReason) {
        debug!(engine = %self.name, %reason, "aborting current run");
        self.abort.abort(reason);
        self.events.emit(EngineEvent::Abort {
            reason,
            name: self.name.clone(),
        });
        self.status_tx.send_replace(RunStatus::Pending);
    }

    /// Fold one watcher message into the change log. Returns whether a change
    /// was recorded.
    fn ingest(&mut self, message: WatcherMessage) -> bool {
        match message {
            WatcherMessage::Error(err) => {
                self.events.emit(EngineEvent::Error {
                    error: Arc::new(err),
                    name: self.name.clone(),
                });
                false
            }
            WatcherMessage::Event(event) => {
                self.events.emit(EngineEvent::Watch {
                    kind: event.kind,
                    path: event.path.clone(),
                    name: self.name.clone(),
                });

                let reported = {
                    let reg = lock_registry(&self.registry);
                    let reported = match reg.causes_for(&event.path) {
                        Some(causes) if !causes.is_empty() => causes,
                        _ => vec![event.path.clone()],
                    };
                    if reported.iter().any(|path| reg.is_file_critical(path)) {
                        self.log.mark_critical();
                    }
                    reported
                };

                for path in &reported {
                    self.log.record(&self.root, path, event.kind);
                }
                debug!(
                    engine = %self.name,
                    kind = %event.kind,
                    path = ?event.path,
                    folded = self.log.len(),
                    "change folded"
                );
                true
            }
        }
    }

    fn emit_notice(&mut self, notice: EngineNotice) {
        match notice {
            EngineNotice::Write(path) => self.events.emit(EngineEvent::Write {
                path,
                name: self.name.clone(),
            }),
            EngineNotice::Custom(event) => self.events.emit(EngineEvent::Custom {
                event,
                name: self.name.clone(),
            }),
        }
    }

    /// The reset executed between two bodies: hard iff a logged path maps to
    /// a critical file, soft otherwise.
    fn perform_reset(&mut self) {
        let critical = self.log.is_critical();
        let changes = self.log.drain();

        if critical {
            info!(engine = %self.name, "critical file changed; hard reset");
            self.store.clear();
            lock_registry(&self.registry).close();
            self.watchers.reset(&self.root);
            if let Err(err) = register_initial_watches(
                &self.root,
                &self.registry,
                &self.watchers,
                &self.initial_entries,
            ) {
                warn!(engine = %self.name, error = %err, "failed to re-register initial watches");
            }
        } else {
            debug!(engine = %self.name, changes = changes.len(), "soft reset");
            let mut actions = Vec::new();
            {
                let mut reg = lock_registry(&self.registry);
                for change in &changes {
                    if change.kind != ChangeKind::Add {
                        actions.extend(reg.unwatch(&change.path));
                    }
                }
            }
            self.watchers.apply(actions);
        }

        self.pending_changes = changes;
    }

    fn shutdown(&mut self, ack: Option<oneshot::Sender<()>>) {
        self.destroyed.store(true, Ordering::SeqCst);
        lock_registry(&self.registry).close();
        self.watchers.close();
        if self.result_tx.borrow().is_none() {
            self.result_tx
                .send_replace(Some(Err(Arc::new(EngineError::Destroyed))));
        }
        self.status_tx.send_replace(RunStatus::Finished);
        self.events.emit(EngineEvent::Destroy {
            name: self.name.clone(),
        });
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
        info!(engine = %self.name, "engine destroyed");
    }

    fn make_context(&self) -> Context {
        let fs_api = ContextFs::new(
            self.root.to_path_buf(),
            Arc::clone(&self.fs),
            Arc::clone(&self.registry),
            self.watchers.clone(),
            self.watch_enabled,
            self.notice_tx.clone(),
        );
        Context::new(
            self.name.clone(),
            Arc::clone(&self.root),
            self.store.clone(),
            Arc::new(self.pending_changes.clone()),
            self.abort.signal(),
            fs_api,
            self.notice_tx.clone(),
        )
    }
}

/// Register the option-provided initial watch list: globs become matchers
/// that also accept change events, plain paths become watched files.
fn register_initial_watches(
    root: &Path,
    registry: &Arc<Mutex<WatchRegistry>>,
    watchers: &Watchers,
    entries: &[String],
) -> Result<()> {
    for entry in entries {
        let actions = if is_glob(entry) {
            let opts = MatcherOptions {
                dot: true,
                accept_change_events: true,
                ..MatcherOptions::new(root.to_path_buf())
            };
            lock_registry(registry).add_patterns(std::slice::from_ref(entry), &opts)?
        } else {
            let abs = resolve(root, entry);
            lock_registry(registry).add_file(&abs, AddFileOptions::default())
        };
        watchers.apply(actions);
    }
    Ok(())
}
