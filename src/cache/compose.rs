//! Fallback-with-populate composition

use std::sync::Arc;

use tracing::{debug, warn};

use super::{BasicCache, CacheLevel};
use crate::future::{AsyncResult, Outcome, Promise};

/// Chain two levels: `get` asks `first`, then `second` on failure
///
/// A value found in `second` is written back into `first` in the background;
/// the composed `get` does not wait for that write. A cancelled `first` get
/// cancels the composed get without consulting `second`.
///
/// `set` writes `first`, then `second` once the first write succeeded.
/// `clear` and `on_memory_warning` reach both levels, `first` first.
pub fn compose<A, B>(first: A, second: B) -> BasicCache<A::Key, A::Output>
where
    A: CacheLevel,
    B: CacheLevel<Key = A::Key, Output = A::Output>,
{
    let first = Arc::new(first);
    let second = Arc::new(second);

    let get = {
        let (first, second) = (Arc::clone(&first), Arc::clone(&second));
        move |key: &A::Key| get_with_fallback(&first, &second, key)
    };
    let set = {
        let (first, second) = (Arc::clone(&first), Arc::clone(&second));
        move |value: A::Output, key: &A::Key| {
            let second = Arc::clone(&second);
            let key = key.clone();
            first
                .set(value.clone(), &key)
                .flat_map(move |()| second.set(value, &key))
        }
    };
    let clear = {
        let (first, second) = (Arc::clone(&first), Arc::clone(&second));
        move || {
            first.clear();
            second.clear();
        }
    };
    let on_memory_warning = move || {
        first.on_memory_warning();
        second.on_memory_warning();
    };

    BasicCache::new(get, set, clear, on_memory_warning)
}

fn get_with_fallback<A, B>(first: &Arc<A>, second: &Arc<B>, key: &A::Key) -> AsyncResult<A::Output>
where
    A: CacheLevel,
    B: CacheLevel<Key = A::Key, Output = A::Output>,
{
    let composed = Promise::new();
    let primary = first.get(key);
    {
        let primary = primary.clone();
        composed.on_cancel(move || primary.cancel());
    }

    let (first, second, key) = (Arc::clone(first), Arc::clone(second), key.clone());
    let downstream = composed.clone();
    primary.on_completion(move |outcome| match outcome {
        Outcome::Success(value) => downstream.succeed(value),
        Outcome::Cancelled => downstream.cancel(),
        Outcome::Failure(error) => {
            debug!(error = %error, "First level missed, falling back");
            let secondary = second.get(&key);
            {
                let secondary = secondary.clone();
                downstream.on_cancel(move || secondary.cancel());
            }
            secondary.on_completion(move |outcome| match outcome {
                Outcome::Success(value) => {
                    first.set(value.clone(), &key).on_failure(|error| {
                        warn!(error = %error, "Failed to populate first level");
                    });
                    downstream.succeed(value);
                }
                Outcome::Failure(error) => downstream.fail(error),
                Outcome::Cancelled => downstream.cancel(),
            });
        }
    });

    composed.future()
}

// =============================================================================
// Tests
// =============================================================================
