//! Guarded operations: an async operation bundled with its breaker
//!
//! [`CircuitBreaker::wrap`] turns `Fn(A) -> impl Future<Output = Result<T, E>>`
//! into a [`Guarded`] whose [`call`](Guarded::call) takes the same `A` and
//! resolves to `Result<T, CircuitError<E>>`. Multiple arguments travel as a
//! tuple.

use crate::{circuit::CircuitBreaker, errors::CircuitError};
use std::fmt;
use std::future::{Future, Ready};
use std::sync::Arc;

/// Substitute for the operation while the circuit is open
pub trait Fallback<A, T, E> {
    type Future: Future<Output = Result<T, E>>;

    /// Produce the substitute future, or `None` to reject the call
    fn invoke(&self, args: A) -> Option<Self::Future>;
}

/// No fallback: short-circuited calls fail with [`CircuitError::Open`]
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFallback;

impl<A, T, E> Fallback<A, T, E> for NoFallback {
    type Future = Ready<Result<T, E>>;

    fn invoke(&self, _args: A) -> Option<Self::Future> {
        None
    }
}

/// Fallback backed by a function with the operation's signature
#[derive(Clone, Copy)]
pub struct FallbackFn<G>(G);

impl<A, T, E, G, Fut> Fallback<A, T, E> for FallbackFn<G>
where
    G: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    type Future = Fut;

    fn invoke(&self, args: A) -> Option<Fut> {
        Some((self.0)(args))
    }
}

impl<G> fmt::Debug for FallbackFn<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(std::any::type_name::<G>())
    }
}

/// An operation whose invocations are gated by a [`CircuitBreaker`]
///
/// ```rust
/// use circuit_gate::{CircuitBreaker, CircuitError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// async fn fetch_quote(symbol: &'static str) -> Result<u32, std::io::Error> {
///     Ok(if symbol == "ACME" { 42 } else { 0 })
/// }
///
/// let quotes = CircuitBreaker::builder("quotes")
///     .failure_threshold(3)
///     .wrap(fetch_quote)
///     .with_fallback(|_symbol| async { Ok::<_, std::io::Error>(0) });
///
/// assert_eq!(quotes.call("ACME").await.ok(), Some(42));
/// # }
/// ```
pub struct Guarded<F, Fb = NoFallback> {
    breaker: Arc<CircuitBreaker>,
    operation: F,
    fallback: Fb,
}

impl<F> Guarded<F> {
    pub(crate) fn new(breaker: Arc<CircuitBreaker>, operation: F) -> Self {
        Self {
            breaker,
            operation,
            fallback: NoFallback,
        }
    }
}

impl<F, Fb> Guarded<F, Fb> {
    /// Serve short-circuited calls from `fallback` instead of failing
    ///
    /// The fallback receives the arguments the operation would have received.
    pub fn with_fallback<G>(self, fallback: G) -> Guarded<F, FallbackFn<G>> {
        Guarded {
            breaker: self.breaker,
            operation: self.operation,
            fallback: FallbackFn(fallback),
        }
    }

    /// The breaker gating this operation
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Invoke the operation through the breaker
    pub async fn call<A, Fut, T, E>(&self, args: A) -> Result<T, CircuitError<E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        Fb: Fallback<A, T, E>,
        E: fmt::Debug + 'static,
    {
        self.breaker
            .execute(
                args,
                |args| (self.operation)(args),
                |args| self.fallback.invoke(args),
            )
            .await
    }
}

impl<F: Clone, Fb: Clone> Clone for Guarded<F, Fb> {
    fn clone(&self) -> Self {
        Self {
            breaker: Arc::clone(&self.breaker),
            operation: self.operation.clone(),
            fallback: self.fallback.clone(),
        }
    }
}

impl<F, Fb: fmt::Debug> fmt::Debug for Guarded<F, Fb> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded")
            .field("breaker", &self.breaker)
            .field("operation", &std::any::type_name::<F>())
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Guard `operation` with a fresh breaker using the default configuration
///
/// The breaker is named after the operation.
pub fn circuit<F>(operation: F) -> Guarded<F> {
    Arc::new(CircuitBreaker::default()).wrap(operation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, State};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::advance;

    async fn pseudo_remote_call(healthy: bool) -> Result<bool, std::io::Error> {
        if healthy {
            Ok(true)
        } else {
            Err(std::io::Error::other("Connection refused"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pass_through() {
        let guarded = circuit(pseudo_remote_call);

        assert_eq!(guarded.call(true).await.ok(), Some(true));
        assert!(guarded.breaker().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bare_wrap_uses_defaults_and_operation_name() {
        let guarded = circuit(pseudo_remote_call);
        let breaker = guarded.breaker();

        assert_eq!(*breaker.config(), Config::default());
        assert!(
            breaker.name().ends_with("pseudo_remote_call"),
            "unexpected name {}",
            breaker.name()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_name_survives_wrap() {
        let guarded = CircuitBreaker::builder("remote").wrap(pseudo_remote_call);
        assert_eq!(guarded.breaker().name(), "remote");
    }

    #[tokio::test(start_paused = true)]
    async fn test_threshold_hit_prevents_consequent_calls() {
        let calls = AtomicUsize::new(0);
        let guarded = CircuitBreaker::builder("threshold_1")
            .failure_threshold(1)
            .wrap(|healthy: bool| {
                calls.fetch_add(1, Ordering::SeqCst);
                pseudo_remote_call(healthy)
            });

        assert!(guarded.call(false).await.is_err_and(|e| !e.is_open()));
        assert!(guarded.breaker().is_open());

        assert!(guarded.call(true).await.is_err_and(|e| e.is_open()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_receives_arguments() {
        let guarded = CircuitBreaker::builder("with_fallback")
            .failure_threshold(1)
            .wrap(|(user, page): (&'static str, u32)| async move {
                Err::<String, _>(std::io::Error::other(format!("{user}:{page} unavailable")))
            })
            .with_fallback(|(user, page): (&'static str, u32)| async move {
                Ok::<_, std::io::Error>(format!("cached {user}:{page}"))
            });

        let first = guarded.call(("test2", 1)).await;
        assert!(first.is_err_and(|e| e.execution().is_some()));
        assert!(guarded.breaker().is_open());

        let second = guarded.call(("test2", 2)).await;
        assert_eq!(second.ok().as_deref(), Some("cached test2:2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_the_breaker() {
        let guarded = CircuitBreaker::builder("shared")
            .failure_threshold(2)
            .wrap(pseudo_remote_call);
        let twin = guarded.clone();

        let _ = guarded.call(false).await;
        let _ = twin.call(false).await;

        assert!(Arc::ptr_eq(guarded.breaker(), twin.breaker()));
        assert!(guarded.breaker().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_breaker_guards_several_operations() {
        let breaker = CircuitBreaker::builder("backend").failure_threshold(2).build_shared();
        let read = breaker.wrap(pseudo_remote_call);
        let write = breaker.wrap(|payload: u8| async move {
            Err::<u8, _>(std::io::Error::other(format!("write {payload} failed")))
        });

        let _ = read.call(false).await;
        let _ = write.call(9).await;

        assert!(breaker.is_open());
        assert!(read.call(true).await.is_err_and(|e| e.is_open()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_timeout() {
        let guarded = CircuitBreaker::builder("threshold_2")
            .failure_threshold(2)
            .recovery_timeout(Duration::from_secs(1))
            .wrap(pseudo_remote_call);
        let breaker = guarded.breaker();

        assert!(guarded.call(true).await.is_ok());
        let _ = guarded.call(false).await;
        let _ = guarded.call(false).await;
        assert_eq!(breaker.state(), State::Open);

        assert!(guarded.call(true).await.is_err_and(|e| e.is_open()));

        advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.state(), State::HalfOpen);

        assert_eq!(guarded.call(true).await.ok(), Some(true));
        assert_eq!(breaker.state(), State::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }
}
