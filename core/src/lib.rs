//! circuit-gate - async circuit breaker
//!
//! A [`CircuitBreaker`] sits in front of a fallible async operation and
//! decides, per call, whether to run it:
//! - Closed: calls run; consecutive expected failures are counted
//! - Open: once the count reaches the threshold, calls are short-circuited
//!   (fallback or [`CircuitError::Open`]) without touching the dependency
//! - HalfOpen: after the recovery timeout a single trial call decides
//!   between closing again and reopening
//!
//! Which errors count is up to a [`FailureClassifier`]; anything else is
//! returned to the caller and ignored by the breaker.
//!
//! # Example
//!
//! ```rust
//! use circuit_gate::{CircuitBreaker, CircuitError};
//! use std::time::Duration;
//!
//! async fn charge(amount: u64) -> Result<String, std::io::Error> {
//!     Err(std::io::Error::other(format!("gateway refused {amount}")))
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let payments = CircuitBreaker::builder("payments")
//!     .failure_threshold(2)
//!     .recovery_timeout(Duration::from_secs(30))
//!     .expect_error::<std::io::Error>()
//!     .on_open(|name| eprintln!("circuit {name} opened"))
//!     .wrap(charge);
//!
//! for _ in 0..2 {
//!     assert!(matches!(payments.call(100).await, Err(CircuitError::Execution(_))));
//! }
//!
//! // Open now: the gateway is not called at all
//! assert!(matches!(payments.call(100).await, Err(CircuitError::Open(_))));
//! # }
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod guarded;
pub mod ledger;
pub mod state;

pub use builder::CircuitBuilder;
pub use circuit::CircuitBreaker;
pub use classifier::{CatchAll, FailureClassifier, FailureContext, PredicateClassifier, TypeClassifier};
pub use config::Config;
pub use errors::{CircuitError, CircuitOpenError};
pub use guarded::{Fallback, FallbackFn, Guarded, NoFallback, circuit};
pub use state::State;
