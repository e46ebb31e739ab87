//! Admission control for `get` requests

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::CacheLevel;
use crate::future::{AsyncResult, Promise};

struct Admission<K, V> {
    in_flight: usize,
    queue: VecDeque<(K, Promise<V>)>,
    /// Completions not yet turned into a started request or a freed slot
    released: usize,
    /// Set while one thread is draining `released`
    draining: bool,
}

struct Shared<C: CacheLevel> {
    inner: C,
    limit: usize,
    state: Mutex<Admission<C::Key, C::Output>>,
}

impl<C: CacheLevel> Shared<C> {
    /// Start `key` on the inner level; its completion releases the slot
    fn start(self: &Arc<Self>, key: &C::Key, promise: Promise<C::Output>) {
        let request = self.inner.get(key);
        let shared = Arc::clone(self);
        request.on_completion(move |_| shared.release());
        promise.follow(&request);
    }

    /// Hand the slot of a finished request to the next queued one
    ///
    /// Requests started here may complete inline and call back into
    /// `release`. Those nested calls only bump `released`; the outermost
    /// call drains them in a loop, so the stack stays flat however long the
    /// queue is.
    fn release(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.released += 1;
            if state.draining {
                return;
            }
            state.draining = true;
        }

        loop {
            let next = {
                let mut state = self.state.lock();
                if state.released == 0 {
                    state.draining = false;
                    return;
                }
                state.released -= 1;

                loop {
                    match state.queue.pop_front() {
                        // Cancelled while waiting: drop it without taking the slot.
                        Some((_, promise)) if !promise.is_pending() => {}
                        Some(next) => break Some(next),
                        None => {
                            state.in_flight = state.in_flight.saturating_sub(1);
                            break None;
                        }
                    }
                }
            };

            if let Some((key, promise)) = next {
                debug!(queued = self.queued(), "Releasing queued request");
                self.start(&key, promise);
            }
        }
    }

    fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }
}

/// A level letting at most `limit` inner `get`s run at once
///
/// Requests beyond the limit wait in FIFO order and start as slots free up.
/// A queued request that gets cancelled never reaches the inner level.
/// `set`, `clear` and `on_memory_warning` are never capped.
pub struct RequestCapperCache<C: CacheLevel> {
    shared: Arc<Shared<C>>,
}

impl<C: CacheLevel> RequestCapperCache<C> {
    /// A `limit` of zero is treated as one
    pub fn new(inner: C, limit: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner,
                limit: limit.max(1),
                state: Mutex::new(Admission {
                    in_flight: 0,
                    queue: VecDeque::new(),
                    released: 0,
                    draining: false,
                }),
            }),
        }
    }

    /// Maximum number of concurrent inner requests
    pub fn limit(&self) -> usize {
        self.shared.limit
    }

    /// Number of inner requests currently running
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight
    }

    /// Number of requests waiting for a slot
    pub fn queued(&self) -> usize {
        self.shared.queued()
    }
}

impl<C: CacheLevel> CacheLevel for RequestCapperCache<C> {
    type Key = C::Key;
    type Output = C::Output;

    fn get(&self, key: &C::Key) -> AsyncResult<C::Output> {
        let promise = Promise::new();
        let result = promise.future();

        let admitted = {
            let mut state = self.shared.state.lock();
            if state.in_flight < self.shared.limit {
                state.in_flight += 1;
                true
            } else {
                state.queue.push_back((key.clone(), promise.clone()));
                false
            }
        };

        if admitted {
            self.shared.start(key, promise);
        } else {
            info!(limit = self.shared.limit, "Request cap reached, queueing request");
        }
        result
    }

    fn set(&self, value: C::Output, key: &C::Key) -> AsyncResult<()> {
        self.shared.inner.set(value, key)
    }

    fn clear(&self) {
        self.shared.inner.clear()
    }

    fn on_memory_warning(&self) {
        self.shared.inner.on_memory_warning()
    }
}

// =============================================================================
// Tests
// =============================================================================
