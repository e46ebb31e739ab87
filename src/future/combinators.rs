//! Value combinators: map, flat_map, filter, recover, zip
//!
//! Every derived result cancels its source when it is cancelled, and mirrors
//! the source's failure or cancellation without running the user closure.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{AsyncResult, Outcome, Promise, Value};
use crate::error::{Error, Result};

impl<T: Value> AsyncResult<T> {
    /// Derive a new result that only runs `handler` on success
    fn derive<U, F>(&self, handler: F) -> AsyncResult<U>
    where
        U: Value,
        F: FnOnce(T, Promise<U>) + Send + 'static,
    {
        let derived = Promise::new();
        let downstream = derived.clone();
        self.on_completion(move |outcome| match outcome {
            Outcome::Success(value) => handler(value, downstream),
            Outcome::Failure(error) => downstream.fail(error),
            Outcome::Cancelled => downstream.cancel(),
        });

        let upstream = self.clone();
        derived.on_cancel(move || upstream.cancel());
        derived.future()
    }

    /// Derive a new result that only runs `handler` on failure
    fn intercept_failure<F>(&self, handler: F) -> AsyncResult<T>
    where
        F: FnOnce(Error, Promise<T>) + Send + 'static,
    {
        let recovered = Promise::new();
        let downstream = recovered.clone();
        self.on_completion(move |outcome| match outcome {
            Outcome::Success(value) => downstream.succeed(value),
            Outcome::Failure(error) => handler(error, downstream),
            Outcome::Cancelled => downstream.cancel(),
        });

        let upstream = self.clone();
        recovered.on_cancel(move || upstream.cancel());
        recovered.future()
    }

    // =========================================================================
    // Map
    // =========================================================================

    /// Transform the success value
    pub fn map<U, F>(&self, f: F) -> AsyncResult<U>
    where
        U: Value,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.derive(move |value, mapped| mapped.succeed(f(value)))
    }

    /// Transform the success value with a fallible closure; an `Err` fails
    /// the mapped result
    pub fn try_map<U, F>(&self, f: F) -> AsyncResult<U>
    where
        U: Value,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        self.derive(move |value, mapped| mapped.complete_with(f(value)))
    }

    // =========================================================================
    // FlatMap
    // =========================================================================

    /// Chain an asynchronous continuation
    pub fn flat_map<U, F>(&self, f: F) -> AsyncResult<U>
    where
        U: Value,
        F: FnOnce(T) -> AsyncResult<U> + Send + 'static,
    {
        self.derive(move |value, mapped| {
            mapped.follow(&f(value));
        })
    }

    /// Chain a continuation producing an [`Outcome`]
    pub fn flat_map_outcome<U, F>(&self, f: F) -> AsyncResult<U>
    where
        U: Value,
        F: FnOnce(T) -> Outcome<U> + Send + 'static,
    {
        self.derive(move |value, mapped| {
            mapped.complete(f(value));
        })
    }

    /// Chain a continuation producing an `Option`; `None` fails with
    /// [`Error::CantMapValue`]
    pub fn flat_map_option<U, F>(&self, f: F) -> AsyncResult<U>
    where
        U: Value,
        F: FnOnce(T) -> Option<U> + Send + 'static,
    {
        self.derive(move |value, mapped| match f(value) {
            Some(value) => mapped.succeed(value),
            None => mapped.fail(Error::CantMapValue),
        })
    }

    // =========================================================================
    // Filter
    // =========================================================================

    /// Keep the value only if `predicate` holds, otherwise fail with
    /// [`Error::FilterConditionUnsatisfied`]
    pub fn filter<F>(&self, predicate: F) -> AsyncResult<T>
    where
        F: FnOnce(&T) -> bool + Send + 'static,
    {
        self.derive(move |value, filtered| {
            if predicate(&value) {
                filtered.succeed(value);
            } else {
                filtered.fail(Error::FilterConditionUnsatisfied);
            }
        })
    }

    /// Like [`filter`](Self::filter) with an asynchronous predicate; a failed
    /// or cancelled predicate fails or cancels the filtered result
    pub fn filter_async<F>(&self, predicate: F) -> AsyncResult<T>
    where
        F: FnOnce(&T) -> AsyncResult<bool> + Send + 'static,
    {
        self.derive(move |value, filtered| {
            let condition = predicate(&value);
            let pending = condition.clone();
            filtered.on_cancel(move || pending.cancel());
            condition.on_completion(move |outcome| match outcome {
                Outcome::Success(true) => filtered.succeed(value),
                Outcome::Success(false) => filtered.fail(Error::FilterConditionUnsatisfied),
                Outcome::Failure(error) => filtered.fail(error),
                Outcome::Cancelled => filtered.cancel(),
            });
        })
    }

    // =========================================================================
    // Recover
    // =========================================================================

    /// Succeed with `value` if this result fails; cancellation passes through
    pub fn recover(&self, value: T) -> AsyncResult<T> {
        self.intercept_failure(move |_, recovered| recovered.succeed(value))
    }

    /// Succeed with the value computed from the error if this result fails
    pub fn recover_with<F>(&self, f: F) -> AsyncResult<T>
    where
        F: FnOnce(Error) -> T + Send + 'static,
    {
        self.intercept_failure(move |error, recovered| recovered.succeed(f(error)))
    }

    /// Mirror the result returned by `f` if this result fails
    pub fn recover_async<F>(&self, f: F) -> AsyncResult<T>
    where
        F: FnOnce(Error) -> AsyncResult<T> + Send + 'static,
    {
        self.intercept_failure(move |error, recovered| {
            recovered.follow(&f(error));
        })
    }

    /// Mirror the `Result` returned by `f` if this result fails
    pub fn recover_result<F>(&self, f: F) -> AsyncResult<T>
    where
        F: FnOnce(Error) -> Result<T> + Send + 'static,
    {
        self.intercept_failure(move |error, recovered| recovered.complete_with(f(error)))
    }

    // =========================================================================
    // Zip
    // =========================================================================

    /// Pair this value with `other`'s
    ///
    /// Both sides run independently; the first failure or cancellation on
    /// either side decides the outcome. Cancelling the pair cancels both sides.
    pub fn zip<U: Value>(&self, other: &AsyncResult<U>) -> AsyncResult<(T, U)> {
        let zipped = Promise::new();
        let slots = Arc::new(Mutex::new((None::<T>, None::<U>)));

        {
            let zipped = zipped.clone();
            let slots = Arc::clone(&slots);
            self.on_completion(move |outcome| match outcome {
                Outcome::Success(value) => {
                    let pair = {
                        let mut slots = slots.lock();
                        slots.0 = Some(value);
                        take_pair(&mut slots)
                    };
                    if let Some(pair) = pair {
                        zipped.succeed(pair);
                    }
                }
                Outcome::Failure(error) => zipped.fail(error),
                Outcome::Cancelled => zipped.cancel(),
            });
        }
        {
            let zipped = zipped.clone();
            other.on_completion(move |outcome| match outcome {
                Outcome::Success(value) => {
                    let pair = {
                        let mut slots = slots.lock();
                        slots.1 = Some(value);
                        take_pair(&mut slots)
                    };
                    if let Some(pair) = pair {
                        zipped.succeed(pair);
                    }
                }
                Outcome::Failure(error) => zipped.fail(error),
                Outcome::Cancelled => zipped.cancel(),
            });
        }

        let left = self.clone();
        let right = other.clone();
        zipped.on_cancel(move || {
            left.cancel();
            right.cancel();
        });
        zipped.future()
    }

    /// Pair this value with an already known `Result`
    pub fn zip_result<U: Value>(&self, other: Result<U>) -> AsyncResult<(T, U)> {
        self.zip(&AsyncResult::from_result(other))
    }
}

fn take_pair<T, U>(slots: &mut (Option<T>, Option<U>)) -> Option<(T, U)> {
    match (slots.0.take(), slots.1.take()) {
        (Some(left), Some(right)) => Some((left, right)),
        (left, right) => {
            slots.0 = left;
            slots.1 = right;
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
