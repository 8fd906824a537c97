// src/fs/mod.rs

//! Abstract filesystem interface.
//!
//! The facade and the watch registry perform all of their I/O through this
//! trait so their semantics can be exercised without a disk. Methods return
//! `std::io::Result` because callers distinguish `NotFound` from other
//! failures.

use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub mod mock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    Other,
}

/// Stat surface small enough to mock.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub kind: FileKind,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileInfo {
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

pub trait FileSystem: Send + Sync + Debug {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    /// Write `contents`, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
    fn metadata(&self, path: &Path) -> io::Result<FileInfo>;
    fn symlink_metadata(&self, path: &Path) -> io::Result<FileInfo>;
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;

    /// Entries of a directory as full paths, sorted by name.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        self.metadata(path).map(|info| info.len)
    }
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)
    }

    fn metadata(&self, path: &Path) -> io::Result<FileInfo> {
        fs::metadata(path).map(file_info)
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<FileInfo> {
        fs::symlink_metadata(path).map(file_info)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }
}

fn file_info(meta: fs::Metadata) -> FileInfo {
    let kind = if meta.file_type().is_symlink() {
        FileKind::Symlink
    } else if meta.is_dir() {
        FileKind::Dir
    } else if meta.is_file() {
        FileKind::File
    } else {
        FileKind::Other
    };
    FileInfo {
        kind,
        len: meta.len(),
        modified: meta.modified().ok(),
    }
}
