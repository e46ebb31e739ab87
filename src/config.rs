//! Cache Configuration
//!
//! Plain structs with sensible defaults. Every struct deserializes with
//! `#[serde(default)]`, so a JSON document only needs the fields it changes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default memory level capacity (50 MiB of cost units)
pub const DEFAULT_MEMORY_CAPACITY: u64 = 50 * 1024 * 1024;

/// Default disk level capacity (100 MiB)
pub const DEFAULT_DISK_CAPACITY: u64 = 100 * 1024 * 1024;

/// Memory level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCacheConfig {
    /// Maximum total cost held before eviction
    pub capacity: u64,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

/// Disk level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskCacheConfig {
    /// Directory holding one file per cached value
    pub path: PathBuf,
    /// Maximum total bytes on disk before the least recently used files are removed
    pub capacity: u64,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            path: std::env::temp_dir().join("stratacache").join("default"),
            capacity: DEFAULT_DISK_CAPACITY,
        }
    }
}

/// Configuration of a full memory / disk / fetcher pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Memory level settings
    pub memory: MemoryCacheConfig,
    /// Disk level settings
    pub disk: DiskCacheConfig,
    /// Deduplicate concurrent requests for the same key below the memory level
    pub pool_requests: bool,
    /// Cap on concurrent requests reaching the fetcher
    pub max_concurrent_requests: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory: MemoryCacheConfig::default(),
            disk: DiskCacheConfig::default(),
            pool_requests: true,
            max_concurrent_requests: None,
        }
    }
}

impl CacheConfig {
    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
