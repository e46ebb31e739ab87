//! Batch operations over many keys

use std::sync::Arc;

use tracing::debug;

use super::CacheLevel;
use crate::future::{merge_all, merge_some, AsyncResult};

/// Fetch every key in parallel, succeeding with the values that were found
///
/// Failed keys are dropped; values keep the order of `keys`.
pub fn batch_get_some<C>(level: &C, keys: &[C::Key]) -> AsyncResult<Vec<C::Output>>
where
    C: CacheLevel + ?Sized,
{
    merge_some(keys.iter().map(|key| level.get(key)))
}

/// A level over key lists, failing the whole batch when any key fails
///
/// `get` fetches every key in parallel and returns the values in key order.
/// `set` pairs values with keys and writes them one after the other.
pub struct BatchAllCache<C> {
    inner: Arc<C>,
}

impl<C: CacheLevel> BatchAllCache<C> {
    pub fn new(inner: C) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

impl<C: CacheLevel> CacheLevel for BatchAllCache<C> {
    type Key = Vec<C::Key>;
    type Output = Vec<C::Output>;

    fn get(&self, keys: &Vec<C::Key>) -> AsyncResult<Vec<C::Output>> {
        merge_all(keys.iter().map(|key| self.inner.get(key)))
    }

    fn set(&self, values: Vec<C::Output>, keys: &Vec<C::Key>) -> AsyncResult<()> {
        if values.len() != keys.len() {
            debug!(
                values = values.len(),
                keys = keys.len(),
                "Batch set with mismatched lengths, extra entries are ignored"
            );
        }

        values
            .into_iter()
            .zip(keys.iter().cloned())
            .fold(AsyncResult::succeeded(()), |previous, (value, key)| {
                let inner = Arc::clone(&self.inner);
                previous.flat_map(move |()| inner.set(value, &key))
            })
    }

    fn clear(&self) {
        self.inner.clear()
    }

    fn on_memory_warning(&self) {
        self.inner.on_memory_warning()
    }
}
