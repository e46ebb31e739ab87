//! Async Result Primitive
//!
//! A callback-based future/promise pair with exactly-once completion and a
//! three-way outcome (success, failure, cancellation).
//!
//! # Design
//!
//! ```text
//!   Promise<T> ──(succeed / fail / cancel)──▶ shared state ◀──(on_* / cancel)── AsyncResult<T>
//!                                             │
//!                                             └─ listeners run once, on the completing thread
//! ```
//!
//! - The promise owns completion; an [`AsyncResult`] is only a read view that
//!   may additionally request (advisory) cancellation.
//! - Listeners registered after completion run immediately on the caller's
//!   thread and are never stored.
//! - Derived results (`map`, `flat_map`, `recover`, ...) cancel their source
//!   when they are cancelled, so producers owning resources can stop early.
//! - Nothing here blocks. Async code can still `.await` a result through its
//!   [`IntoFuture`](std::future::IntoFuture) implementation.

mod combinators;
mod outcome;
mod promise;
mod sequence;
mod time;

#[cfg(test)]
mod proptest;

pub use outcome::Outcome;
pub use promise::{AsyncResult, Awaiting, Promise, Value};
pub use sequence::{first_completed, merge_all, merge_some, reduce, traverse};
pub use time::{delay, retry};
