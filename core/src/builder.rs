//! Builder API for ergonomic circuit breaker configuration

use crate::{
    callbacks::Callbacks,
    circuit::CircuitBreaker,
    classifier::{CatchAll, FailureClassifier, TypeClassifier},
    config::Config,
    guarded::Guarded,
};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
///
/// Builders are `Clone`, so a partially configured builder doubles as a
/// preset that several breakers can start from:
///
/// ```rust
/// use circuit_gate::CircuitBreaker;
/// use std::time::Duration;
///
/// let upstream = CircuitBreaker::builder("")
///     .failure_threshold(3)
///     .recovery_timeout(Duration::from_secs(5))
///     .expect_error::<std::io::Error>();
///
/// let search = upstream.clone().name("search").build();
/// let billing = upstream.name("billing").build();
/// assert_eq!(search.config(), billing.config());
/// ```
#[derive(Clone, Default)]
pub struct CircuitBuilder {
    name: String,
    config: Config,
    failure_classifier: Option<Arc<dyn FailureClassifier>>,
    expected_types: TypeClassifier,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    ///
    /// An empty name is filled in from the first wrapped operation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the whole configuration, e.g. with a shared preset
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the number of consecutive expected failures that opens the circuit
    pub fn failure_threshold(mut self, threshold: usize) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open before a trial call
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.config.recovery_timeout = timeout;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Count errors of type `E` as expected failures
    ///
    /// May be called repeatedly to accept several error types. Without any
    /// `expect_error` or [`failure_classifier`](Self::failure_classifier),
    /// every error counts.
    pub fn expect_error<E: Any>(mut self) -> Self {
        self.expected_types = self.expected_types.matching::<E>();
        self
    }

    /// Set a failure classifier to decide which errors count toward the threshold
    ///
    /// Takes precedence over [`expect_error`](Self::expect_error).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use circuit_gate::{CircuitBreaker, PredicateClassifier};
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let circuit = CircuitBreaker::builder("api")
    ///     .failure_classifier(Arc::new(PredicateClassifier::new(|ctx| {
    ///         // Only slow errors say anything about the dependency's health
    ///         ctx.duration > Duration::from_secs(1)
    ///     })))
    ///     .build();
    /// ```
    pub fn failure_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.failure_classifier = Some(classifier);
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Build the circuit breaker
    pub fn build(self) -> CircuitBreaker {
        let classifier: Arc<dyn FailureClassifier> = match self.failure_classifier {
            Some(classifier) => classifier,
            None if !self.expected_types.is_empty() => Arc::new(self.expected_types),
            None => Arc::new(CatchAll),
        };

        CircuitBreaker::from_parts(self.name, self.config, classifier, self.callbacks)
    }

    /// Build a breaker ready to be shared between call sites
    pub fn build_shared(self) -> Arc<CircuitBreaker> {
        Arc::new(self.build())
    }

    /// Build a breaker and wrap `operation` with it in one step
    pub fn wrap<F>(self, operation: F) -> Guarded<F> {
        self.build_shared().wrap(operation)
    }
}

impl std::fmt::Debug for CircuitBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBuilder")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("failure_classifier", &self.failure_classifier)
            .field("expected_types", &self.expected_types)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::State;

    #[test]
    fn test_builder_defaults() {
        let circuit = CircuitBuilder::new("test").build();

        assert_eq!(circuit.name(), "test");
        assert_eq!(*circuit.config(), Config::default());
        assert_eq!(circuit.state(), State::Closed);
    }

    #[test]
    fn test_builder_custom_config() {
        let circuit = CircuitBuilder::new("test")
            .failure_threshold(10)
            .recovery_timeout(Duration::from_secs(60))
            .jitter_factor(3.0)
            .build();

        assert_eq!(circuit.config().failure_threshold, 10);
        assert_eq!(circuit.config().recovery_timeout, Duration::from_secs(60));
        assert_eq!(circuit.config().jitter_factor, 1.0);
        assert!(circuit.is_closed());
    }

    #[test]
    fn test_preset_config_is_shared() {
        const PRESET: Config = Config::new(2, Duration::from_secs(1));

        let a = CircuitBuilder::new("a").config(PRESET).build();
        let b = CircuitBuilder::new("b").config(PRESET).build();

        assert_eq!(a.config(), b.config());
        assert_eq!(a.config().failure_threshold, 2);
    }

    #[test]
    fn test_empty_name_stays_unset_until_wrap() {
        let circuit = CircuitBuilder::default().build();
        assert_eq!(circuit.name(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_classifier_overrides_expected_types() {
        use crate::PredicateClassifier;

        let circuit = CircuitBuilder::new("test")
            .failure_threshold(1)
            .expect_error::<std::io::Error>()
            .failure_classifier(Arc::new(PredicateClassifier::new(|_| false)))
            .build();

        let _ = circuit
            .call(|| async { Err::<(), _>(std::io::Error::other("down")) })
            .await;
        assert!(circuit.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_builder_with_callbacks() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let opened = Arc::new(AtomicBool::new(false));
        let opened_clone = opened.clone();

        let circuit = CircuitBuilder::new("test")
            .failure_threshold(2)
            .on_open(move |_name| {
                opened_clone.store(true, Ordering::SeqCst);
            })
            .build();

        let _ = circuit.call(|| async { Err::<(), _>("error 1") }).await;
        let _ = circuit.call(|| async { Err::<(), _>("error 2") }).await;

        assert!(opened.load(Ordering::SeqCst));
    }
}
