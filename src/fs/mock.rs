// src/fs/mock.rs

//! In-memory [`FileSystem`] for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use super::{FileInfo, FileKind, FileSystem};

/// Mock filesystem backed by two in-memory sets. Directories are implied by
/// file paths and can also be added explicitly.
#[derive(Debug, Default)]
pub struct MockFileSystem {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.add_file(path, contents);
        self
    }

    pub fn with_dir(self, path: impl Into<PathBuf>) -> Self {
        self.add_dir(path);
        self
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        let path = path.into();
        self.add_parents(&path);
        self.files.lock().unwrap().insert(path, contents.into());
    }

    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.add_parents(&path);
        self.dirs.lock().unwrap().insert(path);
    }

    pub fn remove_file(&self, path: &Path) {
        self.files.lock().unwrap().remove(path);
    }

    fn add_parents(&self, path: &Path) {
        let mut dirs = self.dirs.lock().unwrap();
        let mut current = path.parent();
        while let Some(dir) = current {
            dirs.insert(dir.to_path_buf());
            current = dir.parent();
        }
    }

    fn not_found(path: &Path) -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, format!("no such path: {path:?}"))
    }
}

impl FileSystem for MockFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Self::not_found(path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.add_file(path, contents.to_vec());
        Ok(())
    }

    fn metadata(&self, path: &Path) -> io::Result<FileInfo> {
        if let Some(contents) = self.files.lock().unwrap().get(path) {
            return Ok(FileInfo {
                kind: FileKind::File,
                len: contents.len() as u64,
                modified: Some(SystemTime::now()),
            });
        }
        if self.dirs.lock().unwrap().contains(path) {
            return Ok(FileInfo {
                kind: FileKind::Dir,
                len: 0,
                modified: Some(SystemTime::now()),
            });
        }
        Err(Self::not_found(path))
    }

    fn symlink_metadata(&self, path: &Path) -> io::Result<FileInfo> {
        self.metadata(path)
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path) || self.dirs.lock().unwrap().contains(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.lock().unwrap().contains(path)
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        Ok(path.to_path_buf())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !self.is_dir(path) {
            return Err(Self::not_found(path));
        }
        let mut entries: Vec<PathBuf> = Vec::new();
        for file in self.files.lock().unwrap().keys() {
            if file.parent() == Some(path) {
                entries.push(file.clone());
            }
        }
        for dir in self.dirs.lock().unwrap().iter() {
            if dir.parent() == Some(path) {
                entries.push(dir.clone());
            }
        }
        entries.sort();
        Ok(entries)
    }
}
