//! Terminal outcome of an async result

use crate::error::{Error, Result};

/// The terminal state of an [`AsyncResult`](super::AsyncResult)
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The computation produced a value
    Success(T),
    /// The computation failed
    Failure(Error),
    /// The computation was cancelled before producing a value
    Cancelled,
}

impl<T> Outcome<T> {
    /// Returns true for [`Outcome::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Returns true for [`Outcome::Failure`]
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// Returns true for [`Outcome::Cancelled`]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// The success value, if any
    pub fn value(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    /// The failure, if any
    pub fn error(&self) -> Option<&Error> {
        match self {
            Outcome::Failure(error) => Some(error),
            _ => None,
        }
    }

    /// Converts into a `Result`, or `None` when cancelled
    pub fn into_result(self) -> Option<Result<T>> {
        match self {
            Outcome::Success(value) => Some(Ok(value)),
            Outcome::Failure(error) => Some(Err(error)),
            Outcome::Cancelled => None,
        }
    }

    /// Transforms the success value, leaving failure and cancellation untouched
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Failure(error) => Outcome::Failure(error),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    /// Chains a fallible continuation on the success value
    pub fn flat_map<U>(self, f: impl FnOnce(T) -> Outcome<U>) -> Outcome<U> {
        match self {
            Outcome::Success(value) => f(value),
            Outcome::Failure(error) => Outcome::Failure(error),
            Outcome::Cancelled => Outcome::Cancelled,
        }
    }

    /// Keeps the value only if it satisfies `predicate`
    pub fn filter(self, predicate: impl FnOnce(&T) -> bool) -> Outcome<T> {
        match self {
            Outcome::Success(value) if predicate(&value) => Outcome::Success(value),
            Outcome::Success(_) => Outcome::Failure(Error::FilterConditionUnsatisfied),
            other => other,
        }
    }
}

impl<T> From<Result<T>> for Outcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(error) => Outcome::Failure(error),
        }
    }
}
