//! Breaker configuration and reusable presets

use std::time::Duration;

/// Circuit breaker configuration
///
/// A `Config` is fixed for the lifetime of a breaker. Named presets are just
/// `Config` values shared between breakers:
///
/// ```rust
/// use circuit_gate::{CircuitBreaker, Config};
/// use std::time::Duration;
///
/// const FLAKY_UPSTREAM: Config = Config::new(2, Duration::from_secs(10));
///
/// let payments = CircuitBreaker::builder("payments").config(FLAKY_UPSTREAM).build();
/// let ledger = CircuitBreaker::builder("ledger").config(FLAKY_UPSTREAM).build();
/// assert_eq!(payments.config(), ledger.config());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize, serde::Serialize),
    serde(default, deny_unknown_fields)
)]
pub struct Config {
    /// Consecutive expected failures tolerated before the circuit opens.
    /// Values below 1 are treated as 1.
    pub failure_threshold: usize,

    /// How long the circuit stays open after the last failure before a
    /// trial call is let through
    #[cfg_attr(
        feature = "serde",
        serde(rename = "recovery_timeout_secs", with = "secs_f64")
    )]
    pub recovery_timeout: Duration,

    /// Jitter factor for the recovery timeout (0.0 = none, 1.0 = full).
    /// The effective timeout lands in `[timeout * (1 - jitter), timeout]`.
    pub jitter_factor: f64,
}

impl Config {
    /// Default number of consecutive failures before opening
    pub const DEFAULT_FAILURE_THRESHOLD: usize = 5;

    /// Default time spent open before probing
    pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

    /// Create a configuration without jitter
    pub const fn new(failure_threshold: usize, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            jitter_factor: 0.0,
        }
    }

    /// Threshold actually enforced by the breaker
    pub(crate) fn effective_threshold(&self) -> usize {
        self.failure_threshold.max(1)
    }

    /// Recovery timeout for one opening of the circuit, with jitter applied
    pub(crate) fn draw_recovery_timeout(&self) -> Duration {
        if self.jitter_factor <= 0.0 {
            return self.recovery_timeout;
        }

        let base_ms = u64::try_from(self.recovery_timeout.as_millis()).unwrap_or(u64::MAX);
        let policy = chrono_machines::Policy {
            max_attempts: 1,
            base_delay_ms: base_ms,
            multiplier: 1.0,
            max_delay_ms: base_ms,
        };
        let jitter = self.jitter_factor.min(1.0);
        Duration::from_millis(policy.calculate_delay(1, jitter))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::DEFAULT_FAILURE_THRESHOLD, Self::DEFAULT_RECOVERY_TIMEOUT)
    }
}

#[cfg(feature = "serde")]
mod secs_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
