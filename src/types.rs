// src/types.rs

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

/// Where the run lifecycle currently is.
///
/// - `Pending`: a run is scheduled but the body is not executing yet.
/// - `Running`: the generator body is executing.
/// - `Finished`: the last body resolved or errored and nothing is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Running,
    Finished,
}

/// Why a run's cancellation token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// A watched dependency changed.
    Watch,
    /// An explicit `rerun()` superseded the run.
    Rerun,
    /// The engine was destroyed.
    Destroy,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbortReason::Watch => "watch",
            AbortReason::Rerun => "rerun",
            AbortReason::Destroy => "destroy",
        };
        f.write_str(s)
    }
}

impl FromStr for AbortReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "watch" => Ok(AbortReason::Watch),
            "rerun" => Ok(AbortReason::Rerun),
            "destroy" => Ok(AbortReason::Destroy),
            other => Err(format!("invalid abort reason: {other}")),
        }
    }
}

/// Normalized filesystem event kinds, the common denominator the rest of the
/// engine works with after raw notify events have been classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Add,
    AddDir,
    Change,
    Unlink,
    UnlinkDir,
}

impl FsEventKind {
    pub fn is_add(&self) -> bool {
        matches!(self, FsEventKind::Add | FsEventKind::AddDir)
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, FsEventKind::Unlink | FsEventKind::UnlinkDir)
    }

    /// Collapse directory kinds into their file counterparts for the change
    /// log.
    pub fn fold(&self) -> ChangeKind {
        match self {
            FsEventKind::Add | FsEventKind::AddDir => ChangeKind::Add,
            FsEventKind::Change => ChangeKind::Change,
            FsEventKind::Unlink | FsEventKind::UnlinkDir => ChangeKind::Unlink,
        }
    }
}

impl fmt::Display for FsEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FsEventKind::Add => "add",
            FsEventKind::AddDir => "addDir",
            FsEventKind::Change => "change",
            FsEventKind::Unlink => "unlink",
            FsEventKind::UnlinkDir => "unlinkDir",
        };
        f.write_str(s)
    }
}

/// Folded change kinds reported to the generator between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Add => "add",
            ChangeKind::Change => "change",
            ChangeKind::Unlink => "unlink",
        };
        f.write_str(s)
    }
}

/// A normalized event emitted by one of the watchers.
#[derive(Debug, Clone)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

/// The `watch` factory option: disabled, enabled, or enabled with an initial
/// list of paths and globs to watch before the first run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WatchMode {
    Flag(bool),
    Initial(Vec<String>),
}

impl WatchMode {
    pub fn is_enabled(&self) -> bool {
        match self {
            WatchMode::Flag(enabled) => *enabled,
            WatchMode::Initial(_) => true,
        }
    }

    pub fn initial_entries(&self) -> &[String] {
        match self {
            WatchMode::Flag(_) => &[],
            WatchMode::Initial(entries) => entries,
        }
    }
}

impl Default for WatchMode {
    fn default() -> Self {
        WatchMode::Flag(false)
    }
}
