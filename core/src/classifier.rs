//! Failure classification
//!
//! A classifier decides whether an error raised by the guarded operation is
//! *expected* (it counts toward opening the circuit) or *unexpected* (it is
//! handed back to the caller and the breaker ignores it). Keeping programming
//! errors out of the expected set stops them from tripping the circuit.

use std::any::{Any, TypeId};
use std::time::Duration;

/// Context provided to failure classifiers for error evaluation
#[derive(Debug)]
pub struct FailureContext<'a> {
    /// Circuit name
    pub circuit_name: &'a str,
    /// The error that occurred (can be downcast to specific types)
    pub error: &'a dyn Any,
    /// How long the failed call ran
    pub duration: Duration,
}

/// Decides which errors count toward the failure threshold
///
/// # Examples
///
/// ```rust
/// use circuit_gate::{FailureClassifier, FailureContext};
///
/// #[derive(Debug)]
/// enum ApiError {
///     BadRequest,
///     Unavailable,
/// }
///
/// #[derive(Debug)]
/// struct OnlyUnavailable;
///
/// impl FailureClassifier for OnlyUnavailable {
///     fn is_expected(&self, ctx: &FailureContext<'_>) -> bool {
///         matches!(ctx.error.downcast_ref::<ApiError>(), Some(ApiError::Unavailable))
///     }
/// }
/// ```
pub trait FailureClassifier: Send + Sync + std::fmt::Debug {
    /// Returns `true` if the error should count as a circuit failure
    fn is_expected(&self, ctx: &FailureContext<'_>) -> bool;
}

/// Treats every error as expected
#[derive(Debug, Clone, Copy, Default)]
pub struct CatchAll;

impl FailureClassifier for CatchAll {
    fn is_expected(&self, _ctx: &FailureContext<'_>) -> bool {
        true
    }
}

/// Predicate-based classifier using a closure
pub struct PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    predicate: F,
}

impl<F> PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<F> FailureClassifier for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn is_expected(&self, ctx: &FailureContext<'_>) -> bool {
        (self.predicate)(ctx)
    }
}

impl<F> std::fmt::Debug for PredicateClassifier<F>
where
    F: Fn(&FailureContext<'_>) -> bool + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredicateClassifier")
            .field("predicate", &"<closure>")
            .finish()
    }
}

/// Matches errors by concrete type
///
/// Any of the registered types counts as expected; everything else does not.
///
/// ```rust
/// use circuit_gate::TypeClassifier;
///
/// let classifier = TypeClassifier::new()
///     .matching::<std::io::Error>()
///     .matching::<std::fmt::Error>();
/// assert_eq!(classifier.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TypeClassifier {
    types: Vec<(TypeId, &'static str)>,
}

impl TypeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `E` to the set of expected error types
    pub fn matching<E: Any>(mut self) -> Self {
        let id = TypeId::of::<E>();
        if !self.types.iter().any(|(known, _)| *known == id) {
            self.types.push((id, std::any::type_name::<E>()));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl FailureClassifier for TypeClassifier {
    fn is_expected(&self, ctx: &FailureContext<'_>) -> bool {
        let id = Any::type_id(ctx.error);
        self.types.iter().any(|(known, _)| *known == id)
    }
}
