//! Per-key routing between two levels

use std::sync::Arc;

use super::{BasicCache, CacheLevel};

/// Which of two switched levels serves a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    First,
    Second,
}

/// Route every `get` and `set` to the lane `selector` picks for its key
///
/// `clear` and `on_memory_warning` always reach both lanes.
pub fn switch_levels<A, B, S>(first: A, second: B, selector: S) -> BasicCache<A::Key, A::Output>
where
    A: CacheLevel,
    B: CacheLevel<Key = A::Key, Output = A::Output>,
    S: Fn(&A::Key) -> Lane + Send + Sync + 'static,
{
    let first = Arc::new(first);
    let second = Arc::new(second);
    let selector = Arc::new(selector);

    let get = {
        let (first, second, selector) = (Arc::clone(&first), Arc::clone(&second), Arc::clone(&selector));
        move |key: &A::Key| match selector(key) {
            Lane::First => first.get(key),
            Lane::Second => second.get(key),
        }
    };
    let set = {
        let (first, second) = (Arc::clone(&first), Arc::clone(&second));
        move |value: A::Output, key: &A::Key| match selector(key) {
            Lane::First => first.set(value, key),
            Lane::Second => second.set(value, key),
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
