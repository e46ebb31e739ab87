//! Property-Based Tests for Sequence Combinators
//!
//! # Test Properties
//!
//! 1. **Index Order**: `merge_all` yields values in input order for any
//!    completion order
//! 2. **Fold Order**: `reduce` combines in input order for any completion order
//! 3. **Tolerance**: `merge_some` keeps exactly the successful inputs, in order

#![cfg(test)]

use proptest::prelude::*;

use super::{merge_all, merge_some, reduce, Outcome, Promise};
use crate::error::Error;

// =============================================================================
// Property Strategies
// =============================================================================

/// Values paired with a random completion order over their indices.
fn values_with_completion_order() -> impl Strategy<Value = (Vec<u16>, Vec<usize>)> {
    prop::collection::vec(any::<u16>(), 1..40).prop_flat_map(|values| {
        let order: Vec<usize> = (0..values.len()).collect();
        (Just(values), Just(order).prop_shuffle())
    })
}

/// Per-input success flags paired with a random completion order.
fn flags_with_completion_order() -> impl Strategy<Value = (Vec<bool>, Vec<usize>)> {
    prop::collection::vec(any::<bool>(), 1..40).prop_flat_map(|flags| {
        let order: Vec<usize> = (0..flags.len()).collect();
        (Just(flags), Just(order).prop_shuffle())
    })
}

// =============================================================================
// Ordering Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: merge_all output order equals input order.
    #[test]
    fn prop_merge_all_preserves_index_order((values, order) in values_with_completion_order()) {
        let promises: Vec<Promise<u16>> = values.iter().map(|_| Promise::new()).collect();
        let merged = merge_all(promises.iter().map(Promise::future));

        for index in order {
            promises[index].succeed(values[index]);
        }

        match merged.peek() {
            Some(Outcome::Success(merged)) => prop_assert_eq!(merged, values),
            other => prop_assert!(false, "unexpected outcome {:?}", other.map(|o| o.is_success())),
        }
    }

    /// Property: reduce folds in index order, so a non-commutative fold
    /// matches the sequential fold of the inputs.
    #[test]
    fn prop_reduce_matches_sequential_fold((values, order) in values_with_completion_order()) {
        let promises: Vec<Promise<u16>> = values.iter().map(|_| Promise::new()).collect();
        let reduced = reduce(promises.iter().map(Promise::future), Vec::new(), |mut acc, v| {
            acc.push(v);
            acc
        });

        for index in order {
            promises[index].succeed(values[index]);
        }

        let expected: u64 = values.iter().fold(7u64, |acc, v| acc.wrapping_mul(31).wrapping_add(u64::from(*v)));
        let folded = reduced.peek().and_then(Outcome::value).map(|seen: Vec<u16>| {
            seen.iter().fold(7u64, |acc, v| acc.wrapping_mul(31).wrapping_add(u64::from(*v)))
        });
        prop_assert_eq!(folded, Some(expected));
    }

    /// Property: merge_some keeps the successful inputs in order.
    #[test]
    fn prop_merge_some_keeps_successes((flags, order) in flags_with_completion_order()) {
        let promises: Vec<Promise<usize>> = flags.iter().map(|_| Promise::new()).collect();
        let merged = merge_some(promises.iter().map(Promise::future));

        for index in order {
            if flags[index] {
                promises[index].succeed(index);
            } else {
                promises[index].fail(Error::ValueNotInCache);
            }
        }

        let expected: Vec<usize> = flags
            .iter()
            .enumerate()
            .filter(|(_, ok)| **ok)
            .map(|(index, _)| index)
            .collect();
        prop_assert_eq!(merged.peek().and_then(Outcome::value), Some(expected));
    }
}
