// src/abort.rs

//! Per-run cancellation.
//!
//! Each run gets a fresh [`AbortController`]; the generator body sees the
//! matching [`AbortSignal`] through its context and is expected to honor it
//! at its own suspension points.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::{EngineError, Result};
use crate::types::AbortReason;

/// Owner side of a run's cancellation token. Held by the engine lifecycle;
/// aborted on relevant filesystem changes, `rerun()`, and `destroy()`.
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    token: CancellationToken,
    reason: Arc<OnceLock<AbortReason>>,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    /// The handle exposed to the generator body.
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            token: self.token.clone(),
            reason: Arc::clone(&self.reason),
        }
    }

    /// Fire the token. The first reason wins; later aborts are no-ops.
    pub fn abort(&self, reason: AbortReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        self.reason.get().copied()
    }
}

/// Read side of a run's cancellation token, exposed as `ctx.signal()`.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<AbortReason>>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<AbortReason> {
        self.reason.get().copied()
    }

    /// Errors with [`EngineError::Aborted`] once the token has fired.
    ///
    /// Bodies call this at their own suspension points; the resulting error
    /// terminates the run silently.
    pub fn checkpoint(&self) -> Result<()> {
        match self.reason() {
            Some(reason) if self.is_aborted() => Err(EngineError::Aborted(reason)),
            _ if self.is_aborted() => Err(EngineError::Aborted(AbortReason::Watch)),
            _ => Ok(()),
        }
    }

    /// Resolves when the token fires.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Sleep that honors the signal: errors with [`EngineError::Aborted`] if
    /// the token fires first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.token.cancelled() => self.checkpoint(),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
