//! Key and value transformation of cache levels
//!
//! A transformation failure fails the operation; the wrapped level is never
//! retried.

use std::sync::Arc;

use super::{
    BasicCache, BasicFetcher, CacheLevel, ConditionedTwoWayTransformer, Fetcher, OneWayTransformer, TwoWayTransformer,
};

/// Expose `level`'s values through `transformer`
///
/// `get` transforms fetched values; `set` inverse-transforms before writing.
pub fn transform_values<C, T>(level: C, transformer: T) -> BasicCache<C::Key, T::Output>
where
    C: CacheLevel,
    T: TwoWayTransformer<Input = C::Output>,
{
    let level = Arc::new(level);
    let transformer = Arc::new(transformer);

    let get = {
        let (level, transformer) = (Arc::clone(&level), Arc::clone(&transformer));
        move |key: &C::Key| {
            let transformer = Arc::clone(&transformer);
            level.get(key).flat_map(move |stored| transformer.transform(stored))
        }
    };
    let set = {
        let level = Arc::clone(&level);
        move |value: T::Output, key: &C::Key| {
            let (level, key) = (Arc::clone(&level), key.clone());
            transformer
                .inverse_transform(value)
                .flat_map(move |stored| level.set(stored, &key))
        }
    };
    let clear = {
        let level = Arc::clone(&level);
        move || level.clear()
    };

    BasicCache::new(get, set, clear, move || level.on_memory_warning())
}

/// Like [`transform_values`], with a transformer that also sees the key
pub fn conditioned_transform_values<C, T>(level: C, transformer: T) -> BasicCache<C::Key, T::Output>
where
    C: CacheLevel,
    T: ConditionedTwoWayTransformer<Key = C::Key, Input = C::Output>,
{
    let level = Arc::new(level);
    let transformer = Arc::new(transformer);

    let get = {
        let (level, transformer) = (Arc::clone(&level), Arc::clone(&transformer));
        move |key: &C::Key| {
            let (transformer, owned) = (Arc::clone(&transformer), key.clone());
            level
                .get(key)
                .flat_map(move |stored| transformer.conditional_transform(&owned, stored))
        }
    };
    let set = {
        let level = Arc::clone(&level);
        move |value: T::Output, key: &C::Key| {
            let (level, owned) = (Arc::clone(&level), key.clone());
            transformer
                .conditional_inverse_transform(key, value)
                .flat_map(move |stored| level.set(stored, &owned))
        }
    };
    let clear = {
        let level = Arc::clone(&level);
        move || level.clear()
    };

    BasicCache::new(get, set, clear, move || level.on_memory_warning())
}

/// Accept keys of `transformer`'s input type
///
/// Both `get` and `set` convert the key first; a failed conversion surfaces
/// the transformer's error.
pub fn transform_keys<C, T>(level: C, transformer: T) -> BasicCache<T::Input, C::Output>
where
    C: CacheLevel,
    T: OneWayTransformer<Output = C::Key>,
{
    let level = Arc::new(level);
    let transformer = Arc::new(transformer);

    let get = {
        let (level, transformer) = (Arc::clone(&level), Arc::clone(&transformer));
        move |key: &T::Input| {
            let level = Arc::clone(&level);
            transformer.transform(key.clone()).flat_map(move |inner| level.get(&inner))
        }
    };
    let set = {
        let level = Arc::clone(&level);
        move |value: C::Output, key: &T::Input| {
            let level = Arc::clone(&level);
            transformer
                .transform(key.clone())
                .flat_map(move |inner| level.set(value, &inner))
        }
    };
    let clear = {
        let level = Arc::clone(&level);
        move || level.clear()
    };

    BasicCache::new(get, set, clear, move || level.on_memory_warning())
}

/// Expose a fetcher's values through a one-way `transformer`
pub fn transform_fetched_values<F, T>(fetcher: F, transformer: T) -> BasicFetcher<F::Key, T::Output>
where
    F: Fetcher,
    T: OneWayTransformer<Input = F::Output>,
{
    let transformer = Arc::new(transformer);
    BasicFetcher::new(move |key: &F::Key| {
        let transformer = Arc::clone(&transformer);
        fetcher.fetch(key).flat_map(move |fetched| transformer.transform(fetched))
    })
}

// =============================================================================
// Tests
// =============================================================================
