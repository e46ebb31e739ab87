//! Output post-processing

use std::sync::Arc;

use super::{BasicCache, CacheLevel, ConditionedOneWayTransformer, OneWayTransformer};
use crate::future::AsyncResult;

/// Run every successfully fetched value through `transformer`
///
/// Only `get` is affected.
pub fn post_process<C, T>(level: C, transformer: T) -> BasicCache<C::Key, C::Output>
where
    C: CacheLevel,
    T: OneWayTransformer<Input = C::Output, Output = C::Output>,
{
    let transformer = Arc::new(transformer);
    process_with(level, move |_, value| transformer.transform(value))
}

/// Like [`post_process`], with a transformer that also sees the key
pub fn conditioned_post_process<C, T>(level: C, transformer: T) -> BasicCache<C::Key, C::Output>
where
    C: CacheLevel,
    T: ConditionedOneWayTransformer<Key = C::Key, Input = C::Output, Output = C::Output>,
{
    let transformer = Arc::new(transformer);
    process_with(level, move |key, value| transformer.conditional_transform(key, value))
}

fn process_with<C, F>(level: C, process: F) -> BasicCache<C::Key, C::Output>
where
    C: CacheLevel,
    F: Fn(&C::Key, C::Output) -> AsyncResult<C::Output> + Send + Sync + 'static,
{
    let level = Arc::new(level);
    let process = Arc::new(process);

    let get = {
        let level = Arc::clone(&level);
        move |key: &C::Key| {
            let (process, owned) = (Arc::clone(&process), key.clone());
            level.get(key).flat_map(move |value| process(&owned, value))
        }
    };
    let set = {
        let level = Arc::clone(&level);
        move |value: C::Output, key: &C::Key| level.set(value, key)
    };
    let clear = {
        let level = Arc::clone(&level);
        move || level.clear()
    };

    BasicCache::new(get, set, clear, move || level.on_memory_warning())
}
