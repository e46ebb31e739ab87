//! Error types for the cache engine

use std::sync::Arc;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while fetching, storing or combining cached values
///
/// Every outcome of an [`AsyncResult`](crate::future::AsyncResult) is delivered to
/// all of its listeners, so the error is cheap to clone: foreign sources are
/// kept behind an [`Arc`].
#[derive(Error, Debug, Clone)]
pub enum Error {
    // =========================================================================
    // Cache Errors
    // =========================================================================
    /// A cache level doesn't hold a value for the requested key
    #[error("value not in cache")]
    ValueNotInCache,

    /// No cache level in a pipeline could produce the value
    #[error("no cache levels remaining")]
    NoCacheLevelsRemaining,

    /// The key can't be used by the cache level
    #[error("invalid key")]
    InvalidKey,

    /// The stored bytes could not be turned back into a value
    #[error("invalid cached data")]
    InvalidCachedData,

    /// The key didn't pass the condition of a conditioned cache or transformer
    #[error("condition not satisfied")]
    ConditionNotSatisfied,

    /// A key transformer couldn't convert the key
    #[error("key transformation failed")]
    KeyTransformationFailed,

    /// A value transformer couldn't convert the value
    #[error("value transformation failed")]
    ValueTransformationFailed,

    // =========================================================================
    // Combinator Errors
    // =========================================================================
    /// A `flat_map_option` closure returned `None`
    #[error("cannot map value")]
    CantMapValue,

    /// A `filter` predicate rejected the value
    #[error("filter condition unsatisfied")]
    FilterConditionUnsatisfied,

    /// The result didn't complete before its deadline
    #[error("operation timed out")]
    Timeout,

    /// A background closure produced no value
    #[error("closure returned no value")]
    ClosureReturnedNone,

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// I/O error surfaced by a byte store
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// JSON encoding or decoding failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Caller-defined failure
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Build a caller-defined error
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
