//! Disk Cache Level
//!
//! One file per key under a directory owned by the level, bounded by total
//! bytes.
//!
//! # Design
//!
//! - File names are the hex SHA-256 of the key's string form
//! - A size index (name -> size, last access) lives behind one mutex; the
//!   lock only covers index updates, never file I/O
//! - All I/O runs on an executor, by default a private serial queue
//! - Writes trigger a trim pass that removes least recently accessed files
//!   until the total size fits the capacity
//! - On startup the directory is scanned and ordered by modification time

mod store;

pub use store::{ByteStore, FsByteStore, InMemoryByteStore, StoredFile};

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::CacheLevel;
use crate::config::DiskCacheConfig;
use crate::error::{Error, Result};
use crate::executor::{Executor, SerialQueue};
use crate::future::{AsyncResult, Promise, Value};

/// Hex SHA-256 of the key's string form
pub fn file_name_for(key: &impl Display) -> String {
    hex::encode(Sha256::digest(key.to_string().as_bytes()))
}

struct DiskEntry {
    size: u64,
    last_access: u64,
}

#[derive(Default)]
struct DiskIndex {
    entries: HashMap<String, DiskEntry>,
    size: u64,
    clock: u64,
}

impl DiskIndex {
    /// Record a write or read of `name`; the latest size wins
    fn record(&mut self, name: &str, size: u64) {
        self.clock += 1;
        let last_access = self.clock;
        match self.entries.get_mut(name) {
            Some(entry) => {
                self.size = self.size.saturating_sub(entry.size) + size;
                entry.size = size;
                entry.last_access = last_access;
            }
            None => {
                self.entries.insert(name.to_owned(), DiskEntry { size, last_access });
                self.size += size;
            }
        }
    }

    /// Mark a tracked `name` as just accessed; untracked names stay out
    fn touch(&mut self, name: &str) -> bool {
        self.clock += 1;
        let clock = self.clock;
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.last_access = clock;
                true
            }
            None => false,
        }
    }

    fn forget(&mut self, name: &str) -> bool {
        match self.entries.remove(name) {
            Some(entry) => {
                self.size = self.size.saturating_sub(entry.size);
                true
            }
            None => false,
        }
    }

    /// Drop least recently accessed entries until the size fits `capacity`
    fn take_victims(&mut self, capacity: u64) -> Vec<String> {
        if self.size <= capacity {
            return Vec::new();
        }

        let mut by_age: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|(name, entry)| (entry.last_access, name.clone()))
            .collect();
        by_age.sort_unstable();

        let mut victims = Vec::new();
        for (_, name) in by_age {
            if self.size <= capacity {
                break;
            }
            self.forget(&name);
            victims.push(name);
        }
        victims
    }
}

struct Inner {
    directory: PathBuf,
    capacity: AtomicU64,
    store: Arc<dyn ByteStore>,
    executor: Arc<dyn Executor>,
    index: Mutex<DiskIndex>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Inner {
    fn path_of(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    /// Create the directory and index whatever it already holds
    fn load(&self) {
        if let Err(e) = self.store.create_directory(&self.directory) {
            warn!(path = %self.directory.display(), error = %e, "Failed to create disk cache directory");
            return;
        }

        let mut files = match self.store.list(&self.directory) {
            Ok(files) => files,
            Err(e) => {
                warn!(path = %self.directory.display(), error = %e, "Failed to scan disk cache directory");
                return;
            }
        };
        files.sort_by_key(|file| file.modified);

        let (entries, size) = {
            let mut index = self.index.lock();
            for file in &files {
                let Some(name) = file.path.file_name().and_then(|name| name.to_str()) else {
                    continue;
                };
                if !index.entries.contains_key(name) {
                    index.record(name, file.size);
                }
            }
            (index.entries.len(), index.size)
        };
        debug!(path = %self.directory.display(), entries, size, "Loaded disk cache index");

        self.trim();
    }

    fn read(&self, name: &str) -> Result<Bytes> {
        let path = self.path_of(name);
        match self.store.read(&path) {
            Ok(Some(data)) => {
                // A read never re-adds a file, or it could count one a trim
                // has just deleted.
                let tracked = self.index.lock().touch(name);
                if tracked {
                    if let Err(e) = self.store.touch(&path) {
                        debug!(path = %path.display(), error = %e, "Failed to touch cache file");
                    }
                }
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(file = name, size = data.len(), "Disk cache hit");
                Ok(data)
            }
            Ok(None) => {
                // Drop a stale index entry left by an interrupted trim.
                self.index.lock().forget(name);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(file = name, "Disk cache miss");
                Err(Error::ValueNotInCache)
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                warn!(path = %path.display(), error = %e, "Failed to read cache file");
                Err(e.into())
            }
        }
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.path_of(name);
        if let Err(e) = self.store.write(&path, data) {
            warn!(path = %path.display(), error = %e, "Failed to write cache file");
            return Err(e.into());
        }
        self.index.lock().record(name, data.len() as u64);
        self.trim();
        Ok(())
    }

    /// Delete least recently accessed files until the total size fits
    fn trim(&self) {
        let capacity = self.capacity.load(Ordering::Relaxed);
        let (victims, size) = {
            let mut index = self.index.lock();
            let victims = index.take_victims(capacity);
            (victims, index.size)
        };
        if victims.is_empty() {
            return;
        }

        for name in &victims {
            let path = self.path_of(name);
            if let Err(e) = self.store.delete(&path) {
                warn!(path = %path.display(), error = %e, "Failed to delete evicted cache file");
            }
        }
        self.evictions.fetch_add(victims.len() as u64, Ordering::Relaxed);
        info!(evicted = victims.len(), size, capacity, "Trimmed disk cache");
    }

    fn wipe(&self) {
        let tracked: Vec<String> = {
            let mut index = self.index.lock();
            index.size = 0;
            index.entries.drain().map(|(name, _)| name).collect()
        };

        let paths: Vec<PathBuf> = match self.store.list(&self.directory) {
            Ok(files) => files.into_iter().map(|file| file.path).collect(),
            Err(e) => {
                warn!(path = %self.directory.display(), error = %e, "Failed to list disk cache, deleting tracked files only");
                tracked.iter().map(|name| self.path_of(name)).collect()
            }
        };
        for path in &paths {
            if let Err(e) = self.store.delete(path) {
                warn!(path = %path.display(), error = %e, "Failed to delete cache file");
            }
        }
        debug!(deleted = paths.len(), "Cleared disk cache");
    }
}

/// Disk-backed cache level storing raw bytes
///
/// Cheap to clone; clones share the same directory index.
pub struct DiskCacheLevel<K> {
    inner: Arc<Inner>,
    _key: PhantomData<fn(&K)>,
}

impl<K> Clone for DiskCacheLevel<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _key: PhantomData,
        }
    }
}

impl<K> fmt::Debug for DiskCacheLevel<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskCacheLevel")
            .field("directory", &self.inner.directory)
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

impl<K> DiskCacheLevel<K> {
    /// Open a level on the local filesystem with its own I/O queue
    pub fn new(config: DiskCacheConfig) -> Result<Self> {
        let queue = SerialQueue::new("stratacache-disk")?;
        Ok(Self::with_store(config, Arc::new(FsByteStore), Arc::new(queue)))
    }

    /// Open a level over any byte store, running I/O on `executor`
    ///
    /// The directory scan is queued on `executor` before any request.
    /// `executor` is expected to run jobs one at a time, like a
    /// [`SerialQueue`]; a concurrent one keeps the index consistent but lets
    /// reads and trims race on the same file.
    pub fn with_store(config: DiskCacheConfig, store: Arc<dyn ByteStore>, executor: Arc<dyn Executor>) -> Self {
        let inner = Arc::new(Inner {
            directory: config.path,
            capacity: AtomicU64::new(config.capacity),
            store,
            executor,
            index: Mutex::new(DiskIndex::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        });

        let loading = Arc::clone(&inner);
        inner.executor.execute(Box::new(move || loading.load()));

        Self {
            inner,
            _key: PhantomData,
        }
    }

    /// Directory owned by this level
    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    /// Change the capacity, trimming if the level is now over it
    pub fn set_capacity(&self, capacity: u64) {
        self.inner.capacity.store(capacity, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        self.inner.executor.execute(Box::new(move || inner.trim()));
    }

    /// Total bytes tracked by the index
    pub fn size(&self) -> u64 {
        self.inner.index.lock().size
    }

    pub fn capacity(&self) -> u64 {
        self.inner.capacity.load(Ordering::Relaxed)
    }

    /// Number of tracked files
    pub fn len(&self) -> usize {
        self.inner.index.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.inner.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.inner.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.inner.evictions.load(Ordering::Relaxed)
    }

    /// Get cache statistics
    pub fn stats(&self) -> DiskStats {
        let (entries, size) = {
            let index = self.inner.index.lock();
            (index.entries.len(), index.size)
        };
        DiskStats {
            size,
            capacity: self.capacity(),
            entries,
            hits: self.hits(),
            misses: self.misses(),
            evictions: self.evictions(),
        }
    }
}

impl<K: Display> DiskCacheLevel<K> {
    /// Path of the file that holds `key`
    pub fn path_for(&self, key: &K) -> PathBuf {
        self.inner.path_of(&file_name_for(key))
    }
}

impl<K> CacheLevel for DiskCacheLevel<K>
where
    K: Value + Display,
{
    type Key = K;
    type Output = Bytes;

    fn get(&self, key: &K) -> AsyncResult<Bytes> {
        let name = file_name_for(key);
        let promise = Promise::new();
        let result = promise.future();

        let inner = Arc::clone(&self.inner);
        self.inner.executor.execute(Box::new(move || {
            // Cancelled while queued.
            if promise.is_pending() {
                promise.complete_with(inner.read(&name));
            }
        }));
        result
    }

    fn set(&self, value: Bytes, key: &K) -> AsyncResult<()> {
        let name = file_name_for(key);
        let promise = Promise::new();
        let result = promise.future();

        let inner = Arc::clone(&self.inner);
        self.inner.executor.execute(Box::new(move || {
            if promise.is_pending() {
                promise.complete_with(inner.write(&name, &value));
            }
        }));
        result
    }

    fn clear(&self) {
        let inner = Arc::clone(&self.inner);
        self.inner.executor.execute(Box::new(move || inner.wipe()));
    }

    fn on_memory_warning(&self) {}
}

/// Disk level statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskStats {
    /// Total tracked bytes
    pub size: u64,
    /// Capacity in bytes
    pub capacity: u64,
    /// Number of tracked files
    pub entries: usize,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Eviction count
    pub evictions: u64,
}

// =============================================================================
// Tests
// =============================================================================
