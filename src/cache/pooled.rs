//! Request pooling
//!
//! Concurrent `get`s for the same key share one inner request. The registry
//! only holds requests that are still in flight.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::CacheLevel;
use crate::future::{AsyncResult, Promise};

/// A level deduplicating concurrent `get`s per key
///
/// All callers attached to one request observe the same outcome, including
/// cancellation requested by any of them. `set`, `clear` and
/// `on_memory_warning` are forwarded untouched.
pub struct PoolCache<C: CacheLevel> {
    inner: Arc<C>,
    pending: Arc<Mutex<HashMap<C::Key, AsyncResult<C::Output>>>>,
}

impl<C> PoolCache<C>
where
    C: CacheLevel,
    C::Key: Eq + Hash,
{
    pub fn new(inner: C) -> Self {
        Self {
            inner: Arc::new(inner),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of distinct keys currently in flight
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }
}

impl<C> CacheLevel for PoolCache<C>
where
    C: CacheLevel,
    C::Key: Eq + Hash,
{
    type Key = C::Key;
    type Output = C::Output;

    fn get(&self, key: &C::Key) -> AsyncResult<C::Output> {
        let promise = Promise::new();
        let shared = promise.future();
        {
            let mut pending = self.pending.lock();
            if let Some(existing) = pending.get(key) {
                trace!("Joining in-flight request");
                return existing.clone();
            }
            pending.insert(key.clone(), shared.clone());
        }

        // Registered before the inner call so a synchronous completion
        // still finds (and removes) its own entry.
        let registry = Arc::clone(&self.pending);
        let (owned, registered) = (key.clone(), shared.clone());
        shared.on_completion(move |_| {
            let mut pending = registry.lock();
            if pending.get(&owned).is_some_and(|current| current.ptr_eq(&registered)) {
                pending.remove(&owned);
            }
        });

        promise.follow(&self.inner.get(key));
        shared
    }

    fn set(&self, value: C::Output, key: &C::Key) -> AsyncResult<()> {
        self.inner.set(value, key)
    }

    fn clear(&self) {
        self.inner.clear()
    }

    fn on_memory_warning(&self) {
        self.inner.on_memory_warning()
    }
}

// =============================================================================
// Tests
// =============================================================================
