//! Closure-backed cache levels
//!
//! Every composition operator builds its result as a [`BasicCache`] whose
//! closures re-wire calls to the wrapped levels.

use std::fmt;
use std::sync::Arc;

use super::{CacheLevel, Fetcher};
use crate::future::{AsyncResult, Value};

type GetFn<K, V> = Arc<dyn Fn(&K) -> AsyncResult<V> + Send + Sync>;
type SetFn<K, V> = Arc<dyn Fn(V, &K) -> AsyncResult<()> + Send + Sync>;
type ActionFn = Arc<dyn Fn() + Send + Sync>;

/// A cache level made of four closures
///
/// Cheap to clone; clones share the same closures.
pub struct BasicCache<K, V> {
    get: GetFn<K, V>,
    set: SetFn<K, V>,
    clear: ActionFn,
    on_memory_warning: ActionFn,
}

impl<K, V> Clone for BasicCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
            clear: Arc::clone(&self.clear),
            on_memory_warning: Arc::clone(&self.on_memory_warning),
        }
    }
}

impl<K: Value, V: Value> BasicCache<K, V> {
    pub fn new(
        get: impl Fn(&K) -> AsyncResult<V> + Send + Sync + 'static,
        set: impl Fn(V, &K) -> AsyncResult<()> + Send + Sync + 'static,
        clear: impl Fn() + Send + Sync + 'static,
        on_memory_warning: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            get: Arc::new(get),
            set: Arc::new(set),
            clear: Arc::new(clear),
            on_memory_warning: Arc::new(on_memory_warning),
        }
    }

    /// Erase the concrete type of `level`
    pub fn from_level<C>(level: C) -> Self
    where
        C: CacheLevel<Key = K, Output = V>,
    {
        let level = Arc::new(level);
        let (getter, setter, clearer) = (Arc::clone(&level), Arc::clone(&level), Arc::clone(&level));
        Self::new(
            move |key| getter.get(key),
            move |value, key| setter.set(value, key),
            move || clearer.clear(),
            move || level.on_memory_warning(),
        )
    }
}

impl<K: Value, V: Value> CacheLevel for BasicCache<K, V> {
    type Key = K;
    type Output = V;

    fn get(&self, key: &K) -> AsyncResult<V> {
        (self.get)(key)
    }

    fn set(&self, value: V, key: &K) -> AsyncResult<()> {
        (self.set)(value, key)
    }

    fn clear(&self) {
        (self.clear)()
    }

    fn on_memory_warning(&self) {
        (self.on_memory_warning)()
    }
}

impl<K, V> fmt::Debug for BasicCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BasicCache")
    }
}

/// A read-only level made of a single closure
pub struct BasicFetcher<K, V> {
    get: GetFn<K, V>,
}

impl<K, V> Clone for BasicFetcher<K, V> {
    fn clone(&self) -> Self {
        Self {
            get: Arc::clone(&self.get),
        }
    }
}

impl<K: Value, V: Value> BasicFetcher<K, V> {
    pub fn new(get: impl Fn(&K) -> AsyncResult<V> + Send + Sync + 'static) -> Self {
        Self { get: Arc::new(get) }
    }
}

impl<K: Value, V: Value> Fetcher for BasicFetcher<K, V> {
    type Key = K;
    type Output = V;

    fn fetch(&self, key: &K) -> AsyncResult<V> {
        (self.get)(key)
    }
}

impl<K, V> fmt::Debug for BasicFetcher<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BasicFetcher")
    }
}
