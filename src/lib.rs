//! Stratacache - Composable Multi-Level Caching
//!
//! Independent cache levels (memory, disk, any remote fetcher) combined with
//! generic operators into one logical cache. A miss falls through to the next
//! level, and a value found lower down populates the levels above it.
//!
//! # Architecture
//!
//! ```text
//! client ─get/set─▶ operators (compose, pooled, capped, transform, ...) ─▶ levels
//!                                   │
//!                                   └─ every result is an AsyncResult<T>
//! ```
//!
//! Nothing blocks the caller. Work is observed through listeners on an
//! [`AsyncResult`], or awaited from async code.
//!
//! # Modules
//!
//! - [`future`] - `AsyncResult` / `Promise` and their combinators
//! - [`cache`] - Cache levels, operators, transformers and ready-made pipelines
//! - [`executor`] - Executors used for timers and disk I/O
//! - [`config`] - Serde-friendly level configuration
//! - [`logging`] - Tracing subscriber setup
//! - [`error`] - Error types

pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod future;
pub mod logging;

// Re-export commonly used types
pub use cache::{
    BasicCache, BasicFetcher, CacheLevel, CacheLevelExt, CacheProvider, DiskCacheLevel, Fetcher, FetcherExt,
    MemoryCacheLevel,
};
pub use config::{CacheConfig, DiskCacheConfig, MemoryCacheConfig};
pub use error::{Error, Result};
pub use executor::{Executor, ImmediateExecutor, SerialQueue, TokioExecutor};
pub use future::{AsyncResult, Outcome, Promise};
