//! Sequence combinators over collections of results
//!
//! Every input runs independently; values are combined strictly in input
//! index order as soon as the next index becomes available, so the final
//! value never depends on completion timing.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{AsyncResult, Outcome, Promise, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFailure {
    /// Fail the whole fold and cancel the remaining inputs
    Abort,
    /// Leave the failed input out of the fold
    Skip,
}

enum Slot<T> {
    Pending,
    Ready(T),
    Skipped,
}

struct Fold<T, U, F> {
    slots: Vec<Slot<T>>,
    next: usize,
    accumulator: Option<U>,
    combine: F,
}

impl<T, U, F> Fold<T, U, F>
where
    F: FnMut(U, T) -> U,
{
    /// Combine every contiguous ready slot; returns the final value once the
    /// last index has been folded in
    fn advance(&mut self) -> Option<U> {
        while self.next < self.slots.len() {
            match std::mem::replace(&mut self.slots[self.next], Slot::Pending) {
                Slot::Ready(value) => {
                    if let Some(accumulator) = self.accumulator.take() {
                        self.accumulator = Some((self.combine)(accumulator, value));
                    }
                }
                Slot::Skipped => {}
                Slot::Pending => return None,
            }
            self.next += 1;
        }
        self.accumulator.take()
    }
}

fn fold_ordered<T, U, F>(results: Vec<AsyncResult<T>>, initial: U, policy: OnFailure, combine: F) -> AsyncResult<U>
where
    T: Value,
    U: Value,
    F: FnMut(U, T) -> U + Send + 'static,
{
    if results.is_empty() {
        return AsyncResult::succeeded(initial);
    }

    let folded = Promise::new();
    let siblings = Arc::new(results);
    let fold = Arc::new(Mutex::new(Fold {
        slots: siblings.iter().map(|_| Slot::Pending).collect(),
        next: 0,
        accumulator: Some(initial),
        combine,
    }));

    {
        let siblings = Arc::clone(&siblings);
        folded.on_cancel(move || siblings.iter().for_each(AsyncResult::cancel));
    }

    for (index, result) in siblings.iter().enumerate() {
        let folded = folded.clone();
        let fold = Arc::clone(&fold);
        let others = Arc::clone(&siblings);
        result.on_completion(move |outcome| {
            let slot = match outcome {
                Outcome::Success(value) => Slot::Ready(value),
                Outcome::Failure(_) if policy == OnFailure::Skip => Slot::Skipped,
                Outcome::Failure(error) => {
                    folded.fail(error);
                    others.iter().for_each(AsyncResult::cancel);
                    return;
                }
                Outcome::Cancelled => {
                    folded.cancel();
                    return;
                }
            };

            let finished = {
                let mut fold = fold.lock();
                fold.slots[index] = slot;
                fold.advance()
            };
            if let Some(value) = finished {
                folded.succeed(value);
            }
        });
    }

    folded.future()
}

/// Fold `results` into one value, combining in input order
///
/// The first failure fails the fold and cancels the inputs still running.
/// An empty input succeeds with `initial`.
pub fn reduce<T, U, I, F>(results: I, initial: U, combine: F) -> AsyncResult<U>
where
    T: Value,
    U: Value,
    I: IntoIterator<Item = AsyncResult<T>>,
    F: FnMut(U, T) -> U + Send + 'static,
{
    fold_ordered(results.into_iter().collect(), initial, OnFailure::Abort, combine)
}

/// Collect every value in input order, failing fast on the first failure
pub fn merge_all<T, I>(results: I) -> AsyncResult<Vec<T>>
where
    T: Value,
    I: IntoIterator<Item = AsyncResult<T>>,
{
    let results: Vec<_> = results.into_iter().collect();
    let capacity = results.len();
    fold_ordered(results, Vec::with_capacity(capacity), OnFailure::Abort, |mut values, value| {
        values.push(value);
        values
    })
}

/// Collect the values that succeed, in input order, skipping failures
///
/// Cancellation of any input still cancels the merged result.
pub fn merge_some<T, I>(results: I) -> AsyncResult<Vec<T>>
where
    T: Value,
    I: IntoIterator<Item = AsyncResult<T>>,
{
    let results: Vec<_> = results.into_iter().collect();
    let capacity = results.len();
    fold_ordered(results, Vec::with_capacity(capacity), OnFailure::Skip, |mut values, value| {
        values.push(value);
        values
    })
}

/// Map every item to a result with `generator`, then [`merge_all`]
pub fn traverse<I, T, G>(items: I, generator: G) -> AsyncResult<Vec<T>>
where
    I: IntoIterator,
    T: Value,
    G: FnMut(I::Item) -> AsyncResult<T>,
{
    merge_all(items.into_iter().map(generator))
}

/// Race `results`; the first outcome of any member wins
///
/// Cancelling the race cancels every member. An empty race is cancelled.
pub fn first_completed<T, I>(results: I) -> AsyncResult<T>
where
    T: Value,
    I: IntoIterator<Item = AsyncResult<T>>,
{
    let members: Arc<Vec<AsyncResult<T>>> = Arc::new(results.into_iter().collect());
    if members.is_empty() {
        return AsyncResult::cancelled();
    }

    let race = Promise::new();
    for member in members.iter() {
        race.mimic(member);
    }

    let members = Arc::clone(&members);
    race.on_cancel(move || members.iter().for_each(AsyncResult::cancel));
    race.future()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;

    fn pending<T: Value>(n: usize) -> Vec<Promise<T>> {
        (0..n).map(|_| Promise::new()).collect()
    }

    fn futures<T: Value>(promises: &[Promise<T>]) -> Vec<AsyncResult<T>> {
        promises.iter().map(Promise::future).collect()
    }

    #[test]
    fn test_reduce_combines_in_index_order() {
        let promises = pending::<i32>(3);
        let reduced = reduce(futures(&promises), 5, |acc, v| acc + v);

        promises[2].succeed(3);
        promises[0].succeed(1);
        assert!(reduced.is_pending());
        promises[1].succeed(2);

        assert_matches!(reduced.peek(), Some(Outcome::Success(11)));
    }

    #[test]
    fn test_reduce_is_order_sensitive_to_index_not_completion() {
        let promises = pending::<&'static str>(3);
        let joined = reduce(futures(&promises), String::new(), |mut acc, v| {
            acc.push_str(v);
            acc
        });

        promises[1].succeed("b");
        promises[2].succeed("c");
        promises[0].succeed("a");

        assert_matches!(joined.peek(), Some(Outcome::Success(s)) if s == "abc");
    }

    #[test]
    fn test_reduce_empty_succeeds_with_initial() {
        let reduced = reduce(Vec::<AsyncResult<i32>>::new(), 9, |acc, v| acc + v);
        assert_matches!(reduced.peek(), Some(Outcome::Success(9)));
    }

    #[test]
    fn test_merge_all_fails_fast_and_cancels_rest() {
        let promises = pending::<i32>(3);
        let merged = merge_all(futures(&promises));

        promises[0].succeed(1);
        promises[1].fail(Error::InvalidCachedData);

        assert_matches!(merged.peek(), Some(Outcome::Failure(Error::InvalidCachedData)));
        assert_matches!(promises[2].future().peek(), Some(Outcome::Cancelled));
    }

    #[test]
    fn test_merge_all_failure_wins_regardless_of_timing() {
        let promises = pending::<i32>(2);
        let merged = merge_all(futures(&promises));

        promises[1].fail(Error::Timeout);
        promises[0].succeed(1);

        assert_matches!(merged.peek(), Some(Outcome::Failure(Error::Timeout)));
    }

    #[test]
    fn test_merge_all_keeps_input_order() {
        let promises = pending::<u8>(4);
        let merged = merge_all(futures(&promises));

        for i in [3usize, 1, 0, 2] {
            promises[i].succeed(i as u8);
        }

        assert_matches!(merged.peek(), Some(Outcome::Success(v)) if v == vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_cancelling_merge_cancels_members() {
        let promises = pending::<i32>(2);
        let merged = merge_all(futures(&promises));

        merged.cancel();

        assert!(promises.iter().all(|p| !p.is_pending()));
        assert_matches!(promises[0].future().peek(), Some(Outcome::Cancelled));
    }

    #[test]
    fn test_member_cancellation_cancels_merge() {
        let promises = pending::<i32>(2);
        let merged = merge_all(futures(&promises));

        promises[0].cancel();

        assert_matches!(merged.peek(), Some(Outcome::Cancelled));
        assert_matches!(promises[1].future().peek(), Some(Outcome::Cancelled));
    }

    #[test]
    fn test_merge_some_skips_failures() {
        let promises = pending::<i32>(4);
        let merged = merge_some(futures(&promises));

        promises[3].succeed(4);
        promises[0].fail(Error::ValueNotInCache);
        promises[2].fail(Error::ValueNotInCache);
        promises[1].succeed(2);

        assert_matches!(merged.peek(), Some(Outcome::Success(v)) if v == vec![2, 4]);
    }

    #[test]
    fn test_merge_some_all_failed_is_empty_success() {
        let merged = merge_some(vec![
            AsyncResult::<u8>::failed(Error::InvalidKey),
            AsyncResult::failed(Error::InvalidKey),
        ]);
        assert_matches!(merged.peek(), Some(Outcome::Success(v)) if v.is_empty());
    }

    #[test]
    fn test_traverse() {
        let doubled = traverse(1..=3, |n: i32| AsyncResult::succeeded(n * 2));
        assert_matches!(doubled.peek(), Some(Outcome::Success(v)) if v == vec![2, 4, 6]);
    }

    #[test]
    fn test_first_completed_mirrors_winner() {
        let promises = pending::<&'static str>(3);
        let race = first_completed(futures(&promises));

        promises[1].succeed("second");
        promises[0].fail(Error::Timeout);

        assert_matches!(race.peek(), Some(Outcome::Success("second")));
        assert!(promises[2].is_pending());
    }

    #[test]
    fn test_first_completed_failure_can_win() {
        let promises = pending::<u8>(2);
        let race = first_completed(futures(&promises));

        promises[0].fail(Error::InvalidKey);
        promises[1].succeed(1);

        assert_matches!(race.peek(), Some(Outcome::Failure(Error::InvalidKey)));
    }

    #[test]
    fn test_cancelling_race_cancels_all_members() {
        let promises = pending::<u8>(3);
        let race = first_completed(futures(&promises));

        race.cancel();

        for promise in &promises {
            assert_matches!(promise.future().peek(), Some(Outcome::Cancelled));
        }
    }

    #[test]
    fn test_first_completed_empty_is_cancelled() {
        let race = first_completed(Vec::<AsyncResult<u8>>::new());
        assert_matches!(race.peek(), Some(Outcome::Cancelled));
    }

    #[test]
    fn test_concurrent_completion_keeps_order() {
        let promises = pending::<usize>(64);
        let merged = merge_all(futures(&promises));

        let handles: Vec<_> = promises
            .into_iter()
            .enumerate()
            .map(|(i, promise)| std::thread::spawn(move || promise.succeed(i)))
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_matches!(merged.peek(), Some(Outcome::Success(v)) if v == (0..64).collect::<Vec<_>>());
    }
}
