//! Ready-made pipelines
//!
//! [`CacheProvider`] assembles the usual memory / disk / fetcher stack from a
//! [`CacheConfig`]. Pipelines are plain owned values: build one at startup and
//! clone the handle. [`SharedCache`] is there for callers that want a lazily
//! built, process-wide instance anyway.

use std::fmt::Display;
use std::hash::Hash;

use bytes::Bytes;
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{BasicCache, CacheLevel, CacheLevelExt, DiskCacheLevel, JsonTransformer, MemoryCacheLevel, StringTransformer};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::future::Value;

/// Builds memory / disk / fetcher pipelines
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheProvider;

impl CacheProvider {
    /// Bytes pipeline: memory, then disk, then `fetcher`
    ///
    /// Memory cost is the byte length of each value. Values found by the
    /// fetcher populate the disk and then the memory level.
    pub fn data_cache<K, F>(config: &CacheConfig, fetcher: F) -> Result<BasicCache<K, Bytes>>
    where
        K: Value + Display + Eq + Hash,
        F: CacheLevel<Key = K, Output = Bytes>,
    {
        let disk = DiskCacheLevel::new(config.disk.clone())?;
        Ok(Self::data_cache_with_disk(config, disk, fetcher))
    }

    /// Like [`data_cache`](Self::data_cache) over an already opened disk level
    pub fn data_cache_with_disk<K, F>(config: &CacheConfig, disk: DiskCacheLevel<K>, fetcher: F) -> BasicCache<K, Bytes>
    where
        K: Value + Display + Eq + Hash,
        F: CacheLevel<Key = K, Output = Bytes>,
    {
        let memory = MemoryCacheLevel::with_cost(config.memory.clone(), |value: &Bytes| value.len() as u64);

        let fetcher = match config.max_concurrent_requests {
            Some(limit) => fetcher.capped(limit).normalize(),
            None => fetcher.normalize(),
        };

        let lower = disk.compose(fetcher);
        let lower = if config.pool_requests {
            lower.pooled().normalize()
        } else {
            lower
        };

        debug!(
            memory_capacity = config.memory.capacity,
            disk_capacity = config.disk.capacity,
            disk_path = %config.disk.path.display(),
            pooled = config.pool_requests,
            max_concurrent_requests = ?config.max_concurrent_requests,
            "Built data cache"
        );
        memory.compose(lower)
    }

    /// UTF-8 string pipeline over [`data_cache`](Self::data_cache)
    pub fn string_cache<K, F>(config: &CacheConfig, fetcher: F) -> Result<BasicCache<K, String>>
    where
        K: Value + Display + Eq + Hash,
        F: CacheLevel<Key = K, Output = Bytes>,
    {
        Ok(Self::data_cache(config, fetcher)?.transform_values(StringTransformer))
    }

    /// JSON pipeline over [`data_cache`](Self::data_cache), decoding into `T`
    pub fn json_cache<T, K, F>(config: &CacheConfig, fetcher: F) -> Result<BasicCache<K, T>>
    where
        T: Value + Serialize + DeserializeOwned,
        K: Value + Display + Eq + Hash,
        F: CacheLevel<Key = K, Output = Bytes>,
    {
        Ok(Self::data_cache(config, fetcher)?.transform_values(JsonTransformer::<T>::new()))
    }
}

/// A lazily built shared cache handle
///
/// ```
/// use stratacache::cache::{BasicCache, SharedCache};
///
/// static NAMES: SharedCache<BasicCache<u32, String>> = SharedCache::new();
/// ```
pub struct SharedCache<C> {
    cell: OnceCell<C>,
}

impl<C> SharedCache<C> {
    pub const fn new() -> Self {
        Self { cell: OnceCell::new() }
    }

    /// The cache, if already built
    pub fn get(&self) -> Option<&C> {
        self.cell.get()
    }

    /// The cache, building it with `init` on first use
    pub fn get_or_init(&self, init: impl FnOnce() -> C) -> &C {
        self.cell.get_or_init(init)
    }

    /// The cache, building it with a fallible `init` on first use
    ///
    /// A failed build leaves the handle empty so a later call can retry.
    pub fn get_or_try_init(&self, init: impl FnOnce() -> Result<C>) -> Result<&C> {
        self.cell.get_or_try_init(init)
    }
}

impl<C> Default for SharedCache<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BasicFetcher, DiskStats, InMemoryByteStore};
    use crate::config::{DiskCacheConfig, MemoryCacheConfig};
    use crate::error::Error;
    use crate::executor::ImmediateExecutor;
    use crate::future::{AsyncResult, Outcome, Promise};
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config() -> CacheConfig {
        CacheConfig {
            memory: MemoryCacheConfig { capacity: 1024 },
            disk: DiskCacheConfig {
                path: "/cache".into(),
                capacity: 4096,
            },
            ..Default::default()
        }
    }

    fn disk() -> DiskCacheLevel<String> {
        DiskCacheLevel::with_store(config().disk, Arc::new(InMemoryByteStore::new()), Arc::new(ImmediateExecutor))
    }

    fn origin(calls: Arc<AtomicUsize>) -> BasicFetcher<String, Bytes> {
        BasicFetcher::new(move |key: &String| {
            calls.fetch_add(1, Ordering::SeqCst);
            if key.starts_with("missing") {
                AsyncResult::failed(Error::ValueNotInCache)
            } else {
                AsyncResult::succeeded(Bytes::from(format!("body of {key}")))
            }
        })
    }

    #[test]
    fn test_data_cache_populates_lower_levels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let disk = disk();
        let cache = CacheProvider::data_cache_with_disk(&config(), disk.clone(), origin(Arc::clone(&calls)));

        assert_matches!(cache.get(&"page".into()).peek(), Some(Outcome::Success(v)) if v == "body of page");
        assert_matches!(cache.get(&"page".into()).peek(), Some(Outcome::Success(_)));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_matches!(disk.stats(), DiskStats { entries: 1, size: 12, .. });
    }

    #[test]
    fn test_data_cache_memory_warning_falls_back_to_disk() {
        let calls = Arc::new(AtomicUsize::new(0));
        let disk = disk();
        let cache = CacheProvider::data_cache_with_disk(&config(), disk.clone(), origin(Arc::clone(&calls)));

        cache.get(&"page".into());
        cache.on_memory_warning();

        assert_matches!(cache.get(&"page".into()).peek(), Some(Outcome::Success(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(disk.hits(), 1);
    }

    #[test]
    fn test_data_cache_miss_everywhere_fails() {
        let cache = CacheProvider::data_cache_with_disk(&config(), disk(), origin(Arc::new(AtomicUsize::new(0))));

        assert_matches!(
            cache.get(&"missing-page".into()).peek(),
            Some(Outcome::Failure(Error::ValueNotInCache))
        );
    }

    #[test]
    fn test_data_cache_pools_concurrent_fetches() {
        let pending: Arc<Mutex<Vec<Promise<Bytes>>>> = Arc::default();
        let requests = Arc::clone(&pending);
        let fetcher = BasicFetcher::new(move |_: &String| {
            let promise = Promise::new();
            requests.lock().push(promise.clone());
            promise.future()
        });
        let cache = CacheProvider::data_cache_with_disk(&config(), disk(), fetcher);

        let first = cache.get(&"slow".into());
        let second = cache.get(&"slow".into());
        assert_eq!(pending.lock().len(), 1);

        let promise = pending.lock()[0].clone();
        promise.succeed(Bytes::from_static(b"done"));
        assert_matches!(first.peek(), Some(Outcome::Success(v)) if v == "done");
        assert_matches!(second.peek(), Some(Outcome::Success(v)) if v == "done");
    }

    #[test]
    fn test_data_cache_caps_fetcher() {
        let pending: Arc<Mutex<Vec<Promise<Bytes>>>> = Arc::default();
        let requests = Arc::clone(&pending);
        let fetcher = BasicFetcher::new(move |_: &String| {
            let promise = Promise::new();
            requests.lock().push(promise.clone());
            promise.future()
        });
        let config = CacheConfig {
            max_concurrent_requests: Some(1),
            ..config()
        };
        let cache = CacheProvider::data_cache_with_disk(&config, disk(), fetcher);

        let first = cache.get(&"a".into());
        let second = cache.get(&"b".into());
        assert_eq!(pending.lock().len(), 1);

        let promise = pending.lock()[0].clone();
        promise.succeed(Bytes::from_static(b"A"));
        assert_matches!(first.peek(), Some(Outcome::Success(_)));
        assert_eq!(pending.lock().len(), 2);
        assert!(second.is_pending());
    }

    #[tokio::test]
    async fn test_string_cache_on_filesystem() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = CacheConfig {
            disk: DiskCacheConfig {
                path: dir.path().join("strings"),
                capacity: 4096,
            },
            ..config()
        };
        let cache = CacheProvider::string_cache(&config, origin(Arc::new(AtomicUsize::new(0)))).unwrap();

        assert_matches!(cache.get(&"greeting".into()).await, Outcome::Success(v) if v == "body of greeting");
        assert_matches!(cache.set("overwritten".into(), &"greeting".into()).await, Outcome::Success(()));
        assert_matches!(cache.get(&"greeting".into()).await, Outcome::Success(v) if v == "overwritten");
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        age: u32,
    }

    #[tokio::test]
    async fn test_json_cache_decodes_fetched_documents() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = CacheConfig {
            disk: DiskCacheConfig {
                path: dir.path().join("json"),
                capacity: 4096,
            },
            ..config()
        };
        let fetcher = BasicFetcher::new(|key: &String| {
            AsyncResult::succeeded(Bytes::from(format!(r#"{{"name":"{key}","age":42}}"#)))
        });
        let cache = CacheProvider::json_cache::<Profile, _, _>(&config, fetcher).unwrap();

        assert_matches!(
            cache.get(&"ada".into()).await,
            Outcome::Success(profile) if profile == Profile { name: "ada".into(), age: 42 }
        );
    }

    #[test]
    fn test_shared_cache_builds_once() {
        static SHARED: SharedCache<BasicCache<String, Bytes>> = SharedCache::new();
        let builds = AtomicUsize::new(0);

        for _ in 0..3 {
            SHARED.get_or_init(|| {
                builds.fetch_add(1, Ordering::SeqCst);
                CacheProvider::data_cache_with_disk(&config(), disk(), origin(Arc::new(AtomicUsize::new(0))))
            });
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(SHARED.get().is_some());
    }

    #[test]
    fn test_shared_cache_retries_after_failed_build() {
        let shared: SharedCache<u32> = SharedCache::new();

        assert!(shared.get_or_try_init(|| Err(Error::custom("not yet"))).is_err());
        assert!(shared.get().is_none());
        assert_eq!(*shared.get_or_try_init(|| Ok(7)).unwrap(), 7);
    }
}
