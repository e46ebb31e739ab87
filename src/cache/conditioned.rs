//! Condition-gated cache levels

use std::sync::Arc;

use tracing::debug;

use super::{BasicCache, CacheLevel};
use crate::error::Error;
use crate::future::{AsyncResult, Outcome, Promise};

/// Evaluate `condition` before every `get`
///
/// A `false` answer or a failed condition fails the request with
/// [`Error::ConditionNotSatisfied`] and the inner level is not asked.
/// `set`, `clear` and `on_memory_warning` bypass the condition.
pub fn conditioned<C, P>(level: C, condition: P) -> BasicCache<C::Key, C::Output>
where
    C: CacheLevel,
    P: Fn(&C::Key) -> AsyncResult<bool> + Send + Sync + 'static,
{
    let level = Arc::new(level);

    let get = {
        let level = Arc::clone(&level);
        move |key: &C::Key| {
            let gated = Promise::new();
            let check = condition(key);
            {
                let check = check.clone();
                gated.on_cancel(move || check.cancel());
            }

            let (level, key, downstream) = (Arc::clone(&level), key.clone(), gated.clone());
            check.on_completion(move |outcome| match outcome {
                Outcome::Success(true) => {
                    downstream.follow(&level.get(&key));
                }
                Outcome::Success(false) => downstream.fail(Error::ConditionNotSatisfied),
                Outcome::Failure(error) => {
                    debug!(error = %error, "Cache condition failed");
                    downstream.fail(Error::ConditionNotSatisfied);
                }
                Outcome::Cancelled => downstream.cancel(),
            });
            gated.future()
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
