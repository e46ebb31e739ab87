//! Property-Based Tests for Cache Levels
//!
//! # Test Properties
//!
//! 1. **Memory Bound**: total cost never exceeds capacity after a `set`
//! 2. **Disk Bound**: tracked bytes never exceed capacity after a `set`,
//!    and the index tracks exactly the files left in the store
//! 3. **Recency**: the value just written survives its own eviction pass
//!    whenever it fits on its own

#![cfg(test)]

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use proptest::prelude::*;

use super::{ByteStore, CacheLevel, DiskCacheLevel, InMemoryByteStore, MemoryCacheLevel};
use crate::config::{DiskCacheConfig, MemoryCacheConfig};
use crate::executor::ImmediateExecutor;

// =============================================================================
// Property Strategies
// =============================================================================

/// A sequence of writes as (key, value size) pairs.
fn writes() -> impl Strategy<Value = Vec<(u8, usize)>> {
    prop::collection::vec((0u8..24, 1usize..60), 1..80)
}

// =============================================================================
// Capacity Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: memory level stays within capacity and keeps fresh values.
    #[test]
    fn prop_memory_level_respects_capacity(capacity in 1u64..200, writes in writes()) {
        let level: MemoryCacheLevel<u8, Bytes> =
            MemoryCacheLevel::with_cost(MemoryCacheConfig { capacity }, |value: &Bytes| value.len() as u64);

        for (key, size) in writes {
            level.set(Bytes::from(vec![0u8; size]), &key);

            prop_assert!(level.size() <= capacity);
            prop_assert_eq!(level.contains(&key), size as u64 <= capacity);
        }
    }

    /// Property: disk level stays within capacity and its index matches the store.
    #[test]
    fn prop_disk_level_respects_capacity(capacity in 1u64..200, writes in writes()) {
        let store = Arc::new(InMemoryByteStore::new());
        let level: DiskCacheLevel<u8> = DiskCacheLevel::with_store(
            DiskCacheConfig { path: "/cache".into(), capacity },
            store.clone(),
            Arc::new(ImmediateExecutor),
        );

        for (key, size) in writes {
            level.set(Bytes::from(vec![0u8; size]), &key);

            prop_assert!(level.size() <= capacity);
            prop_assert_eq!(store.len(), level.len());
            prop_assert_eq!(store.contains(&level.path_for(&key)), size as u64 <= capacity);
        }

        prop_assert!(store.list(Path::new("/cache")).map(|files| files.len() == level.len()).unwrap_or(false));
    }
}
