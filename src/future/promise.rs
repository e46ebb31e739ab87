//! Promise / AsyncResult core
//!
//! # Design
//!
//! - The terminal outcome lives in a `OnceLock`: setting it is the single
//!   linearization point, so at most one of value / error / cancellation is
//!   ever stored.
//! - Pending listeners sit behind a `Mutex` (they are `Send` closures, not
//!   `Sync`). Registration and completion both take it, which makes "check
//!   terminal, else enqueue" atomic with respect to "publish terminal, then
//!   drain".
//!   A reader-writer lock would buy nothing here: every access either
//!   pushes or drains, and a `Vec` of non-`Sync` closures cannot be shared
//!   with readers anyway.
//! - Listeners are invoked after the lock is released, in registration order,
//!   so they may freely register more listeners or complete other promises.

use std::fmt;
use std::future::IntoFuture;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::FutureExt;
use parking_lot::Mutex;

use super::Outcome;
use crate::error::{Error, Result};

/// Bound shared by every value flowing through an [`AsyncResult`]
///
/// One outcome is handed to any number of listeners on any thread, hence
/// `Clone + Send + Sync`.
pub trait Value: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Value for T {}

enum Listener<T> {
    Success(Box<dyn FnOnce(T) + Send>),
    Failure(Box<dyn FnOnce(Error) + Send>),
    Cancel(Box<dyn FnOnce() + Send>),
    Completion(Box<dyn FnOnce(Outcome<T>) + Send>),
}

impl<T: Value> Listener<T> {
    fn notify(self, outcome: &Outcome<T>) {
        match (self, outcome) {
            (Listener::Success(f), Outcome::Success(value)) => f(value.clone()),
            (Listener::Failure(f), Outcome::Failure(error)) => f(error.clone()),
            (Listener::Cancel(f), Outcome::Cancelled) => f(),
            (Listener::Completion(f), outcome) => f(outcome.clone()),
            _ => {}
        }
    }
}

struct State<T> {
    outcome: OnceLock<Outcome<T>>,
    listeners: Mutex<Vec<Listener<T>>>,
}

impl<T: Value> State<T> {
    fn new() -> Self {
        Self {
            outcome: OnceLock::new(),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn complete(&self, outcome: Outcome<T>) -> bool {
        // Held across the set so a concurrent registration either lands in the
        // drained list or observes the terminal state.
        let mut guard = self.listeners.lock();
        if self.outcome.set(outcome).is_err() {
            return false;
        }
        let listeners = std::mem::take(&mut *guard);
        drop(guard);

        if let Some(outcome) = self.outcome.get() {
            for listener in listeners {
                listener.notify(outcome);
            }
        }
        true
    }

    fn register(&self, listener: Listener<T>) {
        {
            let mut guard = self.listeners.lock();
            if self.outcome.get().is_none() {
                guard.push(listener);
                return;
            }
        }
        if let Some(outcome) = self.outcome.get() {
            listener.notify(outcome);
        }
    }

    fn pending_listeners(&self) -> usize {
        self.listeners.lock().len()
    }
}

// =============================================================================
// Promise
// =============================================================================

/// Producer half of an [`AsyncResult`]
///
/// Clones share the same state; whichever clone completes first wins and every
/// later `succeed`/`fail`/`cancel` is a no-op.
pub struct Promise<T> {
    state: Arc<State<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Value> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Value> Promise<T> {
    /// Create a new pending promise
    pub fn new() -> Self {
        Self {
            state: Arc::new(State::new()),
        }
    }

    /// The read-only view handed to consumers
    pub fn future(&self) -> AsyncResult<T> {
        AsyncResult {
            state: Arc::clone(&self.state),
        }
    }

    /// Complete with a value
    pub fn succeed(&self, value: T) {
        self.state.complete(Outcome::Success(value));
    }

    /// Complete with an error
    pub fn fail(&self, error: Error) {
        self.state.complete(Outcome::Failure(error));
    }

    /// Complete as cancelled; only cancel listeners are notified
    pub fn cancel(&self) {
        self.state.complete(Outcome::Cancelled);
    }

    /// Complete with an arbitrary outcome, returning whether this call won
    pub fn complete(&self, outcome: Outcome<T>) -> bool {
        self.state.complete(outcome)
    }

    /// Complete from a `Result`
    pub fn complete_with(&self, result: Result<T>) {
        self.state.complete(result.into());
    }

    /// Whether no outcome has been set yet
    pub fn is_pending(&self) -> bool {
        self.state.outcome.get().is_none()
    }

    /// Adopt the outcome of `source` once it completes, cancellation included
    pub fn mimic(&self, source: &AsyncResult<T>) -> &Self {
        let target = self.clone();
        source.on_completion(move |outcome| {
            target.complete(outcome);
        });
        self
    }

    /// Like [`mimic`](Self::mimic), and also cancels `source` when this
    /// promise is cancelled first
    pub(crate) fn follow(&self, source: &AsyncResult<T>) -> &Self {
        self.mimic(source);
        let upstream = source.clone();
        self.on_cancel(move || upstream.cancel());
        self
    }

    /// Register a listener for cancellation, typically requested by a consumer
    pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) -> &Self {
        self.state.register(Listener::Cancel(Box::new(callback)));
        self
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &state_name(self.state.outcome.get()))
            .finish()
    }
}

// =============================================================================
// AsyncResult
// =============================================================================

/// Read-only handle to an eventual success, failure or cancellation
///
/// Cheap to clone; all clones observe the same outcome.
pub struct AsyncResult<T> {
    state: Arc<State<T>>,
}

impl<T> Clone for AsyncResult<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Value> AsyncResult<T> {
    /// An already succeeded result
    pub fn succeeded(value: T) -> Self {
        let promise = Promise::new();
        promise.succeed(value);
        promise.future()
    }

    /// An already failed result
    pub fn failed(error: Error) -> Self {
        let promise = Promise::new();
        promise.fail(error);
        promise.future()
    }

    /// An already cancelled result
    pub fn cancelled() -> Self {
        let promise = Promise::new();
        promise.cancel();
        promise.future()
    }

    /// An already completed result mirroring `result`
    pub fn from_result(result: Result<T>) -> Self {
        let promise = Promise::new();
        promise.complete_with(result);
        promise.future()
    }

    /// Run `closure` on `executor`, failing with
    /// [`Error::ClosureReturnedNone`] when it yields nothing
    pub fn background<E, F>(executor: &E, closure: F) -> Self
    where
        E: crate::executor::Executor + ?Sized,
        F: FnOnce() -> Option<T> + Send + 'static,
    {
        let promise = Promise::new();
        let producer = promise.clone();
        executor.execute(Box::new(move || {
            if !producer.is_pending() {
                return;
            }
            match closure() {
                Some(value) => producer.succeed(value),
                None => producer.fail(Error::ClosureReturnedNone),
            }
        }));
        promise.future()
    }

    /// Request cancellation; a no-op once terminal
    pub fn cancel(&self) {
        self.state.complete(Outcome::Cancelled);
    }

    /// Register a success listener
    pub fn on_success(&self, callback: impl FnOnce(T) + Send + 'static) -> &Self {
        self.state.register(Listener::Success(Box::new(callback)));
        self
    }

    /// Register a failure listener
    pub fn on_failure(&self, callback: impl FnOnce(Error) + Send + 'static) -> &Self {
        self.state.register(Listener::Failure(Box::new(callback)));
        self
    }

    /// Register a cancellation listener
    pub fn on_cancel(&self, callback: impl FnOnce() + Send + 'static) -> &Self {
        self.state.register(Listener::Cancel(Box::new(callback)));
        self
    }

    /// Register a listener receiving whichever outcome happens
    pub fn on_completion(&self, callback: impl FnOnce(Outcome<T>) + Send + 'static) -> &Self {
        self.state.register(Listener::Completion(Box::new(callback)));
        self
    }

    /// The terminal outcome, if reached
    pub fn peek(&self) -> Option<Outcome<T>> {
        self.state.outcome.get().cloned()
    }

    /// Whether no outcome has been reached yet
    pub fn is_pending(&self) -> bool {
        self.state.outcome.get().is_none()
    }

    /// Number of listeners still waiting for an outcome
    pub fn pending_listeners(&self) -> usize {
        self.state.pending_listeners()
    }

    /// Whether both handles observe the same underlying promise
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl<T> fmt::Debug for AsyncResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncResult")
            .field("state", &state_name(self.state.outcome.get()))
            .finish()
    }
}

fn state_name<T>(outcome: Option<&Outcome<T>>) -> &'static str {
    match outcome {
        None => "pending",
        Some(Outcome::Success(_)) => "succeeded",
        Some(Outcome::Failure(_)) => "failed",
        Some(Outcome::Cancelled) => "cancelled",
    }
}

// =============================================================================
// Await Bridge
// =============================================================================

/// `std::future::Future` adapter returned by `AsyncResult::into_future`
///
/// Resolves to [`Outcome::Cancelled`] if every producer handle is dropped
/// without completing.
pub struct Awaiting<T> {
    receiver: oneshot::Receiver<Outcome<T>>,
}

impl<T> std::future::Future for Awaiting<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.receiver.poll_unpin(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Outcome::Cancelled),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T: Value> IntoFuture for AsyncResult<T> {
    type Output = Outcome<T>;
    type IntoFuture = Awaiting<T>;

    fn into_future(self) -> Self::IntoFuture {
        let (sender, receiver) = oneshot::channel();
        self.on_completion(move |outcome| {
            let _ = sender.send(outcome);
        });
        Awaiting { receiver }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_listeners_fire_on_success() {
        let promise = Promise::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = Arc::clone(&seen);
        let f = Arc::clone(&seen);
        let c = Arc::clone(&seen);
        promise
            .future()
            .on_success(move |v: i32| s.lock().push(format!("success {v}")))
            .on_failure(move |_| f.lock().push("failure".into()))
            .on_cancel(move || c.lock().push("cancel".into()));

        promise.succeed(7);

        assert_eq!(*seen.lock(), vec!["success 7".to_string()]);
    }

    #[test]
    fn test_completion_is_exactly_once() {
        let promise = Promise::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        promise.future().on_completion(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(promise.complete(Outcome::Success(1)));
        promise.fail(Error::Timeout);
        promise.cancel();
        assert!(!promise.complete(Outcome::Success(2)));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_matches!(promise.future().peek(), Some(Outcome::Success(1)));
    }

    #[test]
    fn test_late_registration_fires_immediately() {
        let result = AsyncResult::<u8>::failed(Error::InvalidKey);
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        result.on_failure(move |err| {
            assert_matches!(err, Error::InvalidKey);
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(result.pending_listeners(), 0);
    }

    #[test]
    fn test_cancel_only_notifies_cancel_listeners() {
        let promise = Promise::<i32>::new();
        let result = promise.future();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let f = Arc::clone(&seen);
        let c = Arc::clone(&seen);
        result
            .on_failure(move |_| f.lock().push("failure"))
            .on_cancel(move || c.lock().push("cancel"));

        result.cancel();
        promise.succeed(3);

        assert_eq!(*seen.lock(), vec!["cancel"]);
        assert!(!promise.is_pending());
    }

    #[test]
    fn test_listener_order_is_registration_order() {
        let promise = Promise::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = Arc::clone(&order);
            promise.future().on_success(move |_: ()| order.lock().push(i));
        }
        promise.succeed(());

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_listeners_are_released_after_completion() {
        let promise = Promise::new();
        promise.future().on_success(|_: u8| {});
        promise.future().on_failure(|_| {});
        assert_eq!(promise.future().pending_listeners(), 2);

        promise.fail(Error::ValueNotInCache);
        assert_eq!(promise.future().pending_listeners(), 0);
    }

    #[test]
    fn test_mimic_forwards_cancellation() {
        let source = Promise::<u8>::new();
        let copy = Promise::new();
        copy.mimic(&source.future());

        source.cancel();
        assert_matches!(copy.future().peek(), Some(Outcome::Cancelled));
    }

    #[test]
    fn test_concurrent_completion_has_single_winner() {
        let promise = Promise::new();
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let promise = promise.clone();
                let wins = Arc::clone(&wins);
                std::thread::spawn(move || {
                    if promise.complete(Outcome::Success(i)) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert!(promise.future().peek().unwrap().is_success());
    }

    #[test]
    fn test_concurrent_registration_never_loses_listeners() {
        let promise = Promise::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let registrars: Vec<_> = (0..4)
            .map(|_| {
                let result = promise.future();
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        let calls = Arc::clone(&calls);
                        result.on_success(move |_: u32| {
                            calls.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        promise.succeed(1);
        for handle in registrars {
            handle.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1000);
    }

    #[test]
    fn test_await_bridge() {
        let promise = Promise::new();
        let mut awaiting = tokio_test::task::spawn(promise.future().into_future());
        tokio_test::assert_pending!(awaiting.poll());

        promise.succeed("done");

        assert!(awaiting.is_woken());
        assert_matches!(tokio_test::assert_ready!(awaiting.poll()), Outcome::Success("done"));
    }

    #[test]
    fn test_await_resolves_cancelled_when_producer_dropped() {
        let promise = Promise::<u8>::new();
        let awaiting = promise.future().into_future();
        drop(promise);

        assert_matches!(futures::executor::block_on(awaiting), Outcome::Cancelled);
    }

    #[test]
    fn test_background_closure_returning_none_fails() {
        let executor = crate::executor::ImmediateExecutor;

        let some = AsyncResult::background(&executor, || Some(5));
        let none = AsyncResult::<i32>::background(&executor, || None);

        assert_matches!(some.peek(), Some(Outcome::Success(5)));
        assert_matches!(none.peek(), Some(Outcome::Failure(Error::ClosureReturnedNone)));
    }
}
