//! Value and key transformers
//!
//! A transformer converts between the type a level stores and the type a
//! pipeline works with. One-way transformers only convert forward; two-way
//! transformers can also convert back, which is what writes need.
//!
//! Keyed ("conditioned") transformers additionally see the key of the request
//! they run for, so they can decide per key whether to convert at all.

use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::Error;
use crate::future::{AsyncResult, Value};

/// Converts values of `Input` into values of `Output`
pub trait OneWayTransformer: Send + Sync + 'static {
    /// Type accepted by [`transform`](Self::transform)
    type Input: Value;
    /// Type produced by [`transform`](Self::transform)
    type Output: Value;

    /// Convert a value
    fn transform(&self, input: Self::Input) -> AsyncResult<Self::Output>;
}

/// A [`OneWayTransformer`] that can also convert back
pub trait TwoWayTransformer: OneWayTransformer {
    /// Convert a transformed value back to its input type
    fn inverse_transform(&self, output: Self::Output) -> AsyncResult<Self::Input>;
}

/// A one-way transformer that also sees the key of the request
pub trait ConditionedOneWayTransformer: Send + Sync + 'static {
    /// Key type of the request being served
    type Key: Value;
    /// Type accepted by [`conditional_transform`](Self::conditional_transform)
    type Input: Value;
    /// Type produced by [`conditional_transform`](Self::conditional_transform)
    type Output: Value;

    /// Convert a value fetched for `key`
    fn conditional_transform(&self, key: &Self::Key, input: Self::Input) -> AsyncResult<Self::Output>;
}

/// A keyed transformer that can also convert back
pub trait ConditionedTwoWayTransformer: ConditionedOneWayTransformer {
    /// Convert a value back before it is stored for `key`
    fn conditional_inverse_transform(&self, key: &Self::Key, output: Self::Output) -> AsyncResult<Self::Input>;
}

// =============================================================================
// Closure Boxes
// =============================================================================

type TransformFn<I, O> = Arc<dyn Fn(I) -> AsyncResult<O> + Send + Sync>;
type KeyedTransformFn<K, I, O> = Arc<dyn Fn(&K, I) -> AsyncResult<O> + Send + Sync>;

/// A [`OneWayTransformer`] backed by a closure
pub struct OneWayTransformationBox<I, O> {
    transform: TransformFn<I, O>,
}

impl<I, O> Clone for OneWayTransformationBox<I, O> {
    fn clone(&self) -> Self {
        Self {
            transform: Arc::clone(&self.transform),
        }
    }
}

impl<I: Value, O: Value> OneWayTransformationBox<I, O> {
    pub fn new(transform: impl Fn(I) -> AsyncResult<O> + Send + Sync + 'static) -> Self {
        Self {
            transform: Arc::new(transform),
        }
    }
}

impl<I: Value, O: Value> OneWayTransformer for OneWayTransformationBox<I, O> {
    type Input = I;
    type Output = O;

    fn transform(&self, input: I) -> AsyncResult<O> {
        (self.transform)(input)
    }
}

/// A [`TwoWayTransformer`] backed by a pair of closures
pub struct TwoWayTransformationBox<I, O> {
    transform: TransformFn<I, O>,
    inverse: TransformFn<O, I>,
}

impl<I, O> Clone for TwoWayTransformationBox<I, O> {
    fn clone(&self) -> Self {
        Self {
            transform: Arc::clone(&self.transform),
            inverse: Arc::clone(&self.inverse),
        }
    }
}

impl<I: Value, O: Value> TwoWayTransformationBox<I, O> {
    pub fn new(
        transform: impl Fn(I) -> AsyncResult<O> + Send + Sync + 'static,
        inverse: impl Fn(O) -> AsyncResult<I> + Send + Sync + 'static,
    ) -> Self {
        Self {
            transform: Arc::new(transform),
            inverse: Arc::new(inverse),
        }
    }
}

impl<I: Value, O: Value> OneWayTransformer for TwoWayTransformationBox<I, O> {
    type Input = I;
    type Output = O;

    fn transform(&self, input: I) -> AsyncResult<O> {
        (self.transform)(input)
    }
}

impl<I: Value, O: Value> TwoWayTransformer for TwoWayTransformationBox<I, O> {
    fn inverse_transform(&self, output: O) -> AsyncResult<I> {
        (self.inverse)(output)
    }
}

/// A [`ConditionedOneWayTransformer`] backed by a closure
pub struct ConditionedOneWayTransformationBox<K, I, O> {
    transform: KeyedTransformFn<K, I, O>,
}

impl<K, I, O> Clone for ConditionedOneWayTransformationBox<K, I, O> {
    fn clone(&self) -> Self {
        Self {
            transform: Arc::clone(&self.transform),
        }
    }
}

impl<K: Value, I: Value, O: Value> ConditionedOneWayTransformationBox<K, I, O> {
    pub fn new(transform: impl Fn(&K, I) -> AsyncResult<O> + Send + Sync + 'static) -> Self {
        Self {
            transform: Arc::new(transform),
        }
    }

    /// Wrap a plain transformer, ignoring the key
    pub fn from_transformer<T>(transformer: T) -> Self
    where
        T: OneWayTransformer<Input = I, Output = O>,
    {
        Self::new(move |_, input| transformer.transform(input))
    }
}

impl<K: Value, I: Value, O: Value> ConditionedOneWayTransformer for ConditionedOneWayTransformationBox<K, I, O> {
    type Key = K;
    type Input = I;
    type Output = O;

    fn conditional_transform(&self, key: &K, input: I) -> AsyncResult<O> {
        (self.transform)(key, input)
    }
}

/// A [`ConditionedTwoWayTransformer`] backed by a pair of closures
pub struct ConditionedTwoWayTransformationBox<K, I, O> {
    transform: KeyedTransformFn<K, I, O>,
    inverse: KeyedTransformFn<K, O, I>,
}

impl<K, I, O> Clone for ConditionedTwoWayTransformationBox<K, I, O> {
    fn clone(&self) -> Self {
        Self {
            transform: Arc::clone(&self.transform),
            inverse: Arc::clone(&self.inverse),
        }
    }
}

impl<K: Value, I: Value, O: Value> ConditionedTwoWayTransformationBox<K, I, O> {
    pub fn new(
        transform: impl Fn(&K, I) -> AsyncResult<O> + Send + Sync + 'static,
        inverse: impl Fn(&K, O) -> AsyncResult<I> + Send + Sync + 'static,
    ) -> Self {
        Self {
            transform: Arc::new(transform),
            inverse: Arc::new(inverse),
        }
    }

    /// Wrap a plain two-way transformer, ignoring the key
    pub fn from_transformer<T>(transformer: T) -> Self
    where
        T: TwoWayTransformer<Input = I, Output = O>,
    {
        let transformer = Arc::new(transformer);
        let inverse = Arc::clone(&transformer);
        Self::new(
            move |_, input| transformer.transform(input),
            move |_, output| inverse.inverse_transform(output),
        )
    }

    /// Swap the two directions, keeping the key handling
    pub fn invert(self) -> ConditionedTwoWayTransformationBox<K, O, I> {
        ConditionedTwoWayTransformationBox {
            transform: self.inverse,
            inverse: self.transform,
        }
    }
}

impl<K: Value, I: Value, O: Value> ConditionedOneWayTransformer for ConditionedTwoWayTransformationBox<K, I, O> {
    type Key = K;
    type Input = I;
    type Output = O;

    fn conditional_transform(&self, key: &K, input: I) -> AsyncResult<O> {
        (self.transform)(key, input)
    }
}

impl<K: Value, I: Value, O: Value> ConditionedTwoWayTransformer for ConditionedTwoWayTransformationBox<K, I, O> {
    fn conditional_inverse_transform(&self, key: &K, output: O) -> AsyncResult<I> {
        (self.inverse)(key, output)
    }
}

// =============================================================================
// Combinators
// =============================================================================

/// Swaps the directions of a two-way transformer
#[derive(Debug, Clone)]
pub struct Inverted<T> {
    inner: T,
}

impl<T: TwoWayTransformer> OneWayTransformer for Inverted<T> {
    type Input = T::Output;
    type Output = T::Input;

    fn transform(&self, input: T::Output) -> AsyncResult<T::Input> {
        self.inner.inverse_transform(input)
    }
}

impl<T: TwoWayTransformer> TwoWayTransformer for Inverted<T> {
    fn inverse_transform(&self, output: T::Input) -> AsyncResult<T::Output> {
        self.inner.transform(output)
    }
}

/// Runs `first`, then feeds its output to `second`
///
/// The inverse direction runs `second`'s inverse first.
#[derive(Debug, Clone)]
pub struct ComposedTransformer<A, B> {
    first: Arc<A>,
    second: Arc<B>,
}

impl<A, B> OneWayTransformer for ComposedTransformer<A, B>
where
    A: OneWayTransformer,
    B: OneWayTransformer<Input = A::Output>,
{
    type Input = A::Input;
    type Output = B::Output;

    fn transform(&self, input: A::Input) -> AsyncResult<B::Output> {
        let second = Arc::clone(&self.second);
        self.first.transform(input).flat_map(move |middle| second.transform(middle))
    }
}

impl<A, B> TwoWayTransformer for ComposedTransformer<A, B>
where
    A: TwoWayTransformer,
    B: TwoWayTransformer<Input = A::Output>,
{
    fn inverse_transform(&self, output: B::Output) -> AsyncResult<A::Input> {
        let first = Arc::clone(&self.first);
        self.second
            .inverse_transform(output)
            .flat_map(move |middle| first.inverse_transform(middle))
    }
}

/// Only transforms inputs accepted by an asynchronous condition
pub struct ConditionedTransformer<T, P> {
    inner: Arc<T>,
    condition: P,
}

impl<T, P> OneWayTransformer for ConditionedTransformer<T, P>
where
    T: OneWayTransformer,
    P: Fn(&T::Input) -> AsyncResult<bool> + Send + Sync + 'static,
{
    type Input = T::Input;
    type Output = T::Output;

    fn transform(&self, input: T::Input) -> AsyncResult<T::Output> {
        let inner = Arc::clone(&self.inner);
        (self.condition)(&input).flat_map(move |passed| {
            if passed {
                inner.transform(input)
            } else {
                AsyncResult::failed(Error::ConditionNotSatisfied)
            }
        })
    }
}

/// Combinators available on every one-way transformer
pub trait OneWayTransformerExt: OneWayTransformer + Sized {
    /// Chain `next` after this transformer
    fn compose<B>(self, next: B) -> ComposedTransformer<Self, B>
    where
        B: OneWayTransformer<Input = Self::Output>,
    {
        ComposedTransformer {
            first: Arc::new(self),
            second: Arc::new(next),
        }
    }

    /// Only transform inputs for which `condition` succeeds with `true`;
    /// others fail with [`Error::ConditionNotSatisfied`]
    fn conditioned<P>(self, condition: P) -> ConditionedTransformer<Self, P>
    where
        P: Fn(&Self::Input) -> AsyncResult<bool> + Send + Sync + 'static,
    {
        ConditionedTransformer {
            inner: Arc::new(self),
            condition,
        }
    }
}

impl<T: OneWayTransformer> OneWayTransformerExt for T {}

/// Combinators available on every two-way transformer
pub trait TwoWayTransformerExt: TwoWayTransformer + Sized {
    /// Swap the transform and inverse directions
    fn invert(self) -> Inverted<Self> {
        Inverted { inner: self }
    }
}

impl<T: TwoWayTransformer> TwoWayTransformerExt for T {}

// =============================================================================
// Concrete Transformers
// =============================================================================

/// Converts UTF-8 bytes into strings and back
#[derive(Debug, Clone, Copy, Default)]
pub struct StringTransformer;

impl OneWayTransformer for StringTransformer {
    type Input = Bytes;
    type Output = String;

    fn transform(&self, input: Bytes) -> AsyncResult<String> {
        match String::from_utf8(input.to_vec()) {
            Ok(string) => AsyncResult::succeeded(string),
            Err(e) => {
                debug!(error = %e, "Cached bytes are not valid UTF-8");
                AsyncResult::failed(Error::ValueTransformationFailed)
            }
        }
    }
}

impl TwoWayTransformer for StringTransformer {
    fn inverse_transform(&self, output: String) -> AsyncResult<Bytes> {
        AsyncResult::succeeded(Bytes::from(output))
    }
}

/// Converts JSON bytes into `T` and back through `serde_json`
pub struct JsonTransformer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonTransformer<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for JsonTransformer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonTransformer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonTransformer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonTransformer")
    }
}

impl<T> OneWayTransformer for JsonTransformer<T>
where
    T: Value + Serialize + DeserializeOwned,
{
    type Input = Bytes;
    type Output = T;

    fn transform(&self, input: Bytes) -> AsyncResult<T> {
        AsyncResult::from_result(serde_json::from_slice(&input).map_err(Error::from))
    }
}

impl<T> TwoWayTransformer for JsonTransformer<T>
where
    T: Value + Serialize + DeserializeOwned,
{
    fn inverse_transform(&self, output: T) -> AsyncResult<Bytes> {
        AsyncResult::from_result(serde_json::to_vec(&output).map(Bytes::from).map_err(Error::from))
    }
}

// =============================================================================
// Tests
// =============================================================================
