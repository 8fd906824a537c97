#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

use regen::{EngineEvent, EngineEvents};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Watcher latency headroom for assertions that something happens.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Observation window for assertions that something does NOT happen.
pub const QUIET_WINDOW: Duration = Duration::from_millis(700);

/// A temp project rooted at a canonicalized directory, so engine paths and
/// notify paths agree.
pub struct Project {
    _dir: tempfile::TempDir,
    pub root: PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp project");
        let root = dir.path().canonicalize().expect("canonicalize temp root");
        Self { _dir: dir, root }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(path, contents).expect("write fixture file");
    }

    pub fn mkdir(&self, rel: &str) {
        std::fs::create_dir_all(self.path(rel)).expect("create fixture dir");
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.path(rel)).expect("remove fixture file");
    }
}

/// Wait for the first bus event matching `pred`, panicking on timeout.
pub async fn expect_event<T, F>(
    rx: &mut broadcast::Receiver<EngineEvent<T>>,
    timeout: Duration,
    what: &str,
    pred: F,
) -> EngineEvent<T>
where
    T: Clone,
    F: Fn(&EngineEvent<T>) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) if pred(&event) => return event,
            Ok(Ok(_)) => continue,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                panic!("event bus closed while waiting for {what}")
            }
            Err(_) => panic!("timed out waiting for {what}"),
        }
    }
}

/// Assert that no bus event matching `pred` arrives within `window`.
pub async fn expect_no_event<T, F>(
    rx: &mut broadcast::Receiver<EngineEvent<T>>,
    window: Duration,
    what: &str,
    pred: F,
) where
    T: Clone,
    F: Fn(&EngineEvent<T>) -> bool,
{
    let deadline = Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) if pred(&event) => panic!("unexpected {what}"),
            Ok(Ok(_)) => continue,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => return,
            Err(_) => return,
        }
    }
}

/// Poll `cond` until it holds, panicking after `timeout`.
pub async fn wait_until(timeout: Duration, what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not met within {timeout:?}: {what}");
}

/// Subscribe to an engine's bus before acting on it.
pub fn subscribe<T: Clone>(events: &EngineEvents<T>) -> broadcast::Receiver<EngineEvent<T>> {
    events.subscribe()
}

pub fn is_start<T>(event: &EngineEvent<T>) -> bool {
    matches!(event, EngineEvent::Start { .. })
}

pub fn is_finish<T>(event: &EngineEvent<T>) -> bool {
    matches!(event, EngineEvent::Finish { .. })
}
