// src/errors.rs

//! Crate-wide error type and `Result` alias.

use std::time::Duration;

use thiserror::Error;

use crate::types::AbortReason;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("file watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("run aborted ({0})")]
    Aborted(AbortReason),

    #[error("no start within {0:?}")]
    StartTimeout(Duration),

    #[error("engine destroyed")]
    Destroyed,

    #[error("watch patterns must not be negated: {0}")]
    InvalidWatchPattern(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// True when this error is the cancellation control signal rather than a
    /// failure. The lifecycle terminates such runs silently.
    pub fn is_abort(&self) -> bool {
        matches!(self, EngineError::Aborted(_))
    }
}

/// True when `err` is, or wraps, the abort control signal.
pub fn is_abort_error(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<EngineError>(), Some(e) if e.is_abort()))
}

pub type Result<T> = std::result::Result<T, EngineError>;
