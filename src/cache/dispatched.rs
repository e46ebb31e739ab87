//! Executor-dispatched cache levels

use std::sync::Arc;

use super::{BasicCache, CacheLevel};
use crate::executor::Executor;
use crate::future::{AsyncResult, Promise, Value};

/// Run every operation of `level` on `executor`
///
/// Requests are issued from an executor job, and their outcome is handed back
/// to the executor before it completes the returned result. Listeners run on
/// the executor even when the wrapped level completes on a thread of its own.
pub fn dispatched<C>(level: C, executor: Arc<dyn Executor>) -> BasicCache<C::Key, C::Output>
where
    C: CacheLevel,
{
    let level = Arc::new(level);

    let get = {
        let (level, executor) = (Arc::clone(&level), Arc::clone(&executor));
        move |key: &C::Key| {
            let (level, key) = (Arc::clone(&level), key.clone());
            on_executor(&executor, move || level.get(&key))
        }
    };
    let set = {
        let (level, executor) = (Arc::clone(&level), Arc::clone(&executor));
        move |value: C::Output, key: &C::Key| {
            let (level, key) = (Arc::clone(&level), key.clone());
            on_executor(&executor, move || level.set(value, &key))
        }
    };
    let clear = {
        let (level, executor) = (Arc::clone(&level), Arc::clone(&executor));
        move || {
            let level = Arc::clone(&level);
            executor.execute(Box::new(move || level.clear()));
        }
    };
    let on_memory_warning = move || {
        let level = Arc::clone(&level);
        executor.execute(Box::new(move || level.on_memory_warning()));
    };

    BasicCache::new(get, set, clear, on_memory_warning)
}

fn on_executor<T, F>(executor: &Arc<dyn Executor>, operation: F) -> AsyncResult<T>
where
    T: Value,
    F: FnOnce() -> AsyncResult<T> + Send + 'static,
{
    let promise = Promise::new();
    let dispatched = promise.clone();
    let delivery = Arc::clone(executor);
    executor.execute(Box::new(move || {
        if !dispatched.is_pending() {
            return;
        }

        let request = operation();
        let upstream = request.clone();
        dispatched.on_cancel(move || upstream.cancel());
        request.on_completion(move |outcome| {
            delivery.execute(Box::new(move || {
                dispatched.complete(outcome);
            }));
        });
    }));
    promise.future()
}
