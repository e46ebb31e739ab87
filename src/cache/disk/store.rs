//! Byte stores backing the disk level
//!
//! The disk level only talks to storage through [`ByteStore`], so tests can
//! swap the filesystem for [`InMemoryByteStore`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use bytes::Bytes;
use dashmap::DashMap;
use filetime::FileTime;

/// A file as reported by [`ByteStore::list`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
}

/// Blocking byte storage used by the disk level
///
/// Every call runs on the disk level's I/O executor, never on the caller.
pub trait ByteStore: Send + Sync + 'static {
    /// Read a whole file; `None` if it doesn't exist
    fn read(&self, path: &Path) -> io::Result<Option<Bytes>>;

    /// Create or replace a file
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Delete a file; deleting a missing file succeeds
    fn delete(&self, path: &Path) -> io::Result<()>;

    /// List the files directly inside `directory`
    fn list(&self, directory: &Path) -> io::Result<Vec<StoredFile>>;

    /// Create `path` and its parents
    fn create_directory(&self, path: &Path) -> io::Result<()>;

    /// Mark a file as just used
    fn touch(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

// =============================================================================
// Filesystem
// =============================================================================

/// [`ByteStore`] over the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsByteStore;

impl ByteStore for FsByteStore {
    fn read(&self, path: &Path) -> io::Result<Option<Bytes>> {
        match fs::read(path) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(path, data)
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn list(&self, directory: &Path) -> io::Result<Vec<StoredFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(directory)? {
            let entry = entry?;
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                // Removed between listing and stat.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if !metadata.is_file() {
                continue;
            }
            files.push(StoredFile {
                path: entry.path(),
                size: metadata.len(),
                modified: metadata.modified()?,
            });
        }
        Ok(files)
    }

    fn create_directory(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn touch(&self, path: &Path) -> io::Result<()> {
        filetime::set_file_mtime(path, FileTime::now())
    }
}

// =============================================================================
// In-Memory
// =============================================================================

/// In-memory [`ByteStore`] for tests and ephemeral pipelines
#[derive(Default)]
pub struct InMemoryByteStore {
    files: DashMap<PathBuf, (Bytes, SystemTime)>,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    fail_writes: AtomicBool,
}

impl InMemoryByteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail, or succeed again
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Whether a file exists at `path`
    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Number of stored files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }
}

impl ByteStore for InMemoryByteStore {
    fn read(&self, path: &Path) -> io::Result<Option<Bytes>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.files.get(path).map(|file| file.0.clone()))
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(io::Error::new(io::ErrorKind::Other, "write rejected"));
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.files
            .insert(path.to_path_buf(), (Bytes::copy_from_slice(data), SystemTime::now()));
        Ok(())
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.files.remove(path);
        Ok(())
    }

    fn list(&self, directory: &Path) -> io::Result<Vec<StoredFile>> {
        Ok(self
            .files
            .iter()
            .filter(|file| file.key().parent() == Some(directory))
            .map(|file| StoredFile {
                path: file.key().clone(),
                size: file.value().0.len() as u64,
                modified: file.value().1,
            })
            .collect())
    }

    fn create_directory(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn touch(&self, path: &Path) -> io::Result<()> {
        if let Some(mut file) = self.files.get_mut(path) {
            file.1 = SystemTime::now();
        }
        Ok(())
    }
}
