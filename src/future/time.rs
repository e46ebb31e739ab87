//! Time-based combinators: delay, timeout, snooze, retry

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::{AsyncResult, Outcome, Promise, Value};
use crate::error::Error;
use crate::executor::Executor;

/// A result that succeeds with `()` once `after` has elapsed
pub fn delay<E: Executor + ?Sized>(after: Duration, executor: &E) -> AsyncResult<()> {
    let promise = Promise::new();
    let timer = promise.clone();
    executor.execute_after(after, Box::new(move || timer.succeed(())));
    promise.future()
}

impl<T: Value> AsyncResult<T> {
    /// Fail with [`Error::Timeout`] unless this result completes within `after`
    ///
    /// The original computation keeps running when the timeout fires.
    pub fn timeout<E: Executor + ?Sized>(&self, after: Duration, executor: &E) -> AsyncResult<T> {
        let guarded = Promise::new();
        guarded.follow(self);

        let timer = guarded.clone();
        executor.execute_after(
            after,
            Box::new(move || {
                if timer.complete(Outcome::Failure(Error::Timeout)) {
                    debug!(?after, "Async result timed out");
                }
            }),
        );
        guarded.future()
    }

    /// Deliver this result's outcome `duration` after it happens
    pub fn snooze<E: Executor + 'static>(&self, duration: Duration, executor: E) -> AsyncResult<T> {
        let snoozed = Promise::new();
        let target = snoozed.clone();
        self.on_completion(move |outcome| {
            executor.execute_after(
                duration,
                Box::new(move || {
                    target.complete(outcome);
                }),
            );
        });

        let upstream = self.clone();
        snoozed.on_cancel(move || upstream.cancel());
        snoozed.future()
    }
}

struct Retry<T, E, F> {
    every: Duration,
    executor: E,
    producer: F,
    result: Promise<T>,
    current: Mutex<Option<AsyncResult<T>>>,
}

impl<T, E, F> Retry<T, E, F>
where
    T: Value,
    E: Executor + 'static,
    F: Fn() -> AsyncResult<T> + Send + Sync + 'static,
{
    fn attempt(self: &Arc<Self>, remaining: usize) {
        if !self.result.is_pending() {
            return;
        }

        let current = (self.producer)();
        *self.current.lock() = Some(current.clone());
        // The retried result may have been cancelled while we swapped attempts.
        if !self.result.is_pending() {
            current.cancel();
            return;
        }

        let state = Arc::clone(self);
        current.on_completion(move |outcome| match outcome {
            Outcome::Failure(error) if remaining > 0 => {
                debug!(remaining, error = %error, "Attempt failed, retrying");
                let next = Arc::clone(&state);
                state
                    .executor
                    .execute_after(state.every, Box::new(move || next.attempt(remaining - 1)));
            }
            outcome => {
                state.result.complete(outcome);
            }
        });
    }
}

/// Run `producer` until it succeeds, at most `count` extra times
///
/// Each retry waits `every` first. Once every attempt has failed, the last
/// failure is returned. A cancelled attempt is not retried, and cancelling the
/// returned result cancels the attempt in flight.
pub fn retry<T, E, F>(count: usize, every: Duration, executor: E, producer: F) -> AsyncResult<T>
where
    T: Value,
    E: Executor + 'static,
    F: Fn() -> AsyncResult<T> + Send + Sync + 'static,
{
    let state = Arc::new(Retry {
        every,
        executor,
        producer,
        result: Promise::new(),
        current: Mutex::new(None),
    });

    {
        let state = Arc::clone(&state);
        state.result.clone().on_cancel(move || {
            let current = state.current.lock().take();
            if let Some(current) = current {
                current.cancel();
            }
        });
    }

    state.attempt(count);
    state.result.future()
}

// =============================================================================
// Tests
// =============================================================================
