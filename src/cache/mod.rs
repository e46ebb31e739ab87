//! Composable Cache Levels
//!
//! Independent levels (memory, disk, remote fetch) combined through generic
//! operators into one logical cache.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     BasicCache<K, V> (pipeline)                     │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  MemoryCacheLevel  ──compose──▶  DiskCacheLevel  ──compose──▶ Fetcher│
//! │  (DashMap, cost)                 (files + LRU index)   pooled/capped │
//! │         ▲                               ▲                     │      │
//! │         └──────── populate on hit ◀─────┴──── populate ◀──────┘      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Principles
//!
//! - Operators never mutate the wrapped level; they return a new level
//! - Nothing blocks: every operation returns an [`AsyncResult`]
//! - Failures of an earlier level fall through to the next one,
//!   cancellations don't

mod basic;
mod batch;
mod capped;
mod compose;
mod conditioned;
mod disk;
mod dispatched;
mod memory;
mod pooled;
mod post_process;
mod provider;
#[cfg(test)]
mod proptest;
mod switch;
mod transform;
pub mod transformer;

use std::sync::Arc;

pub use basic::{BasicCache, BasicFetcher};
pub use batch::{batch_get_some, BatchAllCache};
pub use capped::RequestCapperCache;
pub use compose::compose;
pub use conditioned::conditioned;
pub use disk::{file_name_for, ByteStore, DiskCacheLevel, DiskStats, FsByteStore, InMemoryByteStore, StoredFile};
pub use dispatched::dispatched;
pub use memory::{MemoryCacheLevel, MemoryStats};
pub use pooled::PoolCache;
pub use post_process::{conditioned_post_process, post_process};
pub use provider::{CacheProvider, SharedCache};
pub use switch::{switch_levels, Lane};
pub use transform::{conditioned_transform_values, transform_fetched_values, transform_keys, transform_values};
pub use transformer::{
    ConditionedOneWayTransformationBox, ConditionedOneWayTransformer, ConditionedTwoWayTransformationBox,
    ConditionedTwoWayTransformer, JsonTransformer, OneWayTransformationBox, OneWayTransformer,
    OneWayTransformerExt, StringTransformer, TwoWayTransformationBox, TwoWayTransformer, TwoWayTransformerExt,
};

use crate::executor::Executor;
use crate::future::{AsyncResult, Value};

/// A cache tier or operator: the uniform interface of every level
pub trait CacheLevel: Send + Sync + 'static {
    /// Key type the level is queried with
    type Key: Value;
    /// Value type the level stores and returns
    type Output: Value;

    /// Look up the value for `key`
    fn get(&self, key: &Self::Key) -> AsyncResult<Self::Output>;

    /// Store `value` for `key`
    fn set(&self, value: Self::Output, key: &Self::Key) -> AsyncResult<()>;

    /// Drop every stored value
    fn clear(&self);

    /// React to memory pressure signalled by the host process
    fn on_memory_warning(&self);
}

/// A read-only level: only fetching is mandatory
///
/// Every fetcher is a [`CacheLevel`] whose `set` succeeds without storing
/// anything and whose `clear` and `on_memory_warning` do nothing.
pub trait Fetcher: Send + Sync + 'static {
    type Key: Value;
    type Output: Value;

    /// Fetch the value for `key`
    fn fetch(&self, key: &Self::Key) -> AsyncResult<Self::Output>;
}

impl<F: Fetcher> CacheLevel for F {
    type Key = F::Key;
    type Output = F::Output;

    fn get(&self, key: &F::Key) -> AsyncResult<F::Output> {
        self.fetch(key)
    }

    fn set(&self, _value: F::Output, _key: &F::Key) -> AsyncResult<()> {
        AsyncResult::succeeded(())
    }

    fn clear(&self) {}

    fn on_memory_warning(&self) {}
}

impl<C: CacheLevel + ?Sized> CacheLevel for Arc<C> {
    type Key = C::Key;
    type Output = C::Output;

    fn get(&self, key: &C::Key) -> AsyncResult<C::Output> {
        (**self).get(key)
    }

    fn set(&self, value: C::Output, key: &C::Key) -> AsyncResult<()> {
        (**self).set(value, key)
    }

    fn clear(&self) {
        (**self).clear()
    }

    fn on_memory_warning(&self) {
        (**self).on_memory_warning()
    }
}

// =============================================================================
// Operators
// =============================================================================

/// Composition operators available on every [`CacheLevel`]
pub trait CacheLevelExt: CacheLevel + Sized {
    /// Fall back to `next` on a miss, populating this level with its value
    fn compose<B>(self, next: B) -> BasicCache<Self::Key, Self::Output>
    where
        B: CacheLevel<Key = Self::Key, Output = Self::Output>,
    {
        compose(self, next)
    }

    /// Expose values through `transformer`; writes run its inverse first
    fn transform_values<T>(self, transformer: T) -> BasicCache<Self::Key, T::Output>
    where
        T: TwoWayTransformer<Input = Self::Output>,
    {
        transform_values(self, transformer)
    }

    /// Accept keys of another type, converted by `transformer` before dispatch
    fn transform_keys<T>(self, transformer: T) -> BasicCache<T::Input, Self::Output>
    where
        T: OneWayTransformer<Output = Self::Key>,
    {
        transform_keys(self, transformer)
    }

    /// Gate every `get` behind `condition`
    fn conditioned<P>(self, condition: P) -> BasicCache<Self::Key, Self::Output>
    where
        P: Fn(&Self::Key) -> AsyncResult<bool> + Send + Sync + 'static,
    {
        conditioned(self, condition)
    }

    /// Post-process every successfully fetched value
    fn post_process<T>(self, transformer: T) -> BasicCache<Self::Key, Self::Output>
    where
        T: OneWayTransformer<Input = Self::Output, Output = Self::Output>,
    {
        post_process(self, transformer)
    }

    /// Post-process every successfully fetched value, seeing its key
    fn conditioned_post_process<T>(self, transformer: T) -> BasicCache<Self::Key, Self::Output>
    where
        T: ConditionedOneWayTransformer<Key = Self::Key, Input = Self::Output, Output = Self::Output>,
    {
        conditioned_post_process(self, transformer)
    }

    /// Like [`transform_values`](Self::transform_values) with a key-aware transformer
    fn conditioned_transform_values<T>(self, transformer: T) -> BasicCache<Self::Key, T::Output>
    where
        T: ConditionedTwoWayTransformer<Key = Self::Key, Input = Self::Output>,
    {
        conditioned_transform_values(self, transformer)
    }

    /// Share one inner `get` between concurrent requests for the same key
    fn pooled(self) -> PoolCache<Self>
    where
        Self::Key: Eq + std::hash::Hash,
    {
        PoolCache::new(self)
    }

    /// Allow at most `max_concurrent` inner `get`s in flight
    fn capped(self, max_concurrent: usize) -> RequestCapperCache<Self> {
        RequestCapperCache::new(self, max_concurrent)
    }

    /// Deliver every operation's completion on `executor`
    fn dispatched(self, executor: Arc<dyn Executor>) -> BasicCache<Self::Key, Self::Output> {
        dispatched(self, executor)
    }

    /// Accept key lists, failing the whole batch when any key fails
    fn all_batch(self) -> BatchAllCache<Self> {
        BatchAllCache::new(self)
    }

    /// Fetch every key, keeping only the values that were found
    fn batch_get_some(&self, keys: &[Self::Key]) -> AsyncResult<Vec<Self::Output>> {
        batch_get_some(self, keys)
    }

    /// Erase the concrete type into a cheap-to-clone handle
    fn normalize(self) -> BasicCache<Self::Key, Self::Output> {
        BasicCache::from_level(self)
    }
}

impl<C: CacheLevel> CacheLevelExt for C {}

/// Operators specific to read-only levels
pub trait FetcherExt: Fetcher + Sized {
    /// Expose fetched values through a one-way `transformer`
    fn transform_fetched_values<T>(self, transformer: T) -> BasicFetcher<Self::Key, T::Output>
    where
        T: OneWayTransformer<Input = Self::Output>,
    {
        transform_fetched_values(self, transformer)
    }
}

impl<F: Fetcher> FetcherExt for F {}

// =============================================================================
// Tests
// =============================================================================
