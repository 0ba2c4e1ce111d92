//! Error types for guarded calls

use std::time::Duration;

/// A call was short-circuited because the circuit is open
///
/// Its message never depends on the operation's error type, so it can be
/// rendered even when `E` has no `Display` impl.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "circuit \"{circuit}\" is open ({failures} failures, {} sec remaining)",
    .remaining.as_secs()
)]
pub struct CircuitOpenError {
    pub circuit: String,
    pub failures: usize,
    pub remaining: Duration,
    /// Debug rendering of the failure that kept the circuit open
    pub last_failure: Option<String>,
}

/// Outcome of a guarded call that did not produce a value
///
/// `Open` is synthesized by the breaker; `Execution` carries the operation's
/// (or the fallback's) own error untouched.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// Circuit is open; the operation was not invoked
    #[error(transparent)]
    Open(CircuitOpenError),
    /// The wrapped operation failed
    #[error("circuit execution failed: {0}")]
    Execution(#[source] E),
}

impl<E> CircuitError<E> {
    /// `true` if the call was short-circuited
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open(_))
    }

    /// Details of the rejection, if the call was short-circuited
    pub fn as_open(&self) -> Option<&CircuitOpenError> {
        match self {
            CircuitError::Open(open) => Some(open),
            CircuitError::Execution(_) => None,
        }
    }

    /// The operation's error, if the operation ran
    pub fn execution(&self) -> Option<&E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            CircuitError::Open(_) => None,
        }
    }

    /// Unwrap into the operation's error, if the operation ran
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            CircuitError::Open(_) => None,
        }
    }
}

impl<E> From<CircuitOpenError> for CircuitError<E> {
    fn from(open: CircuitOpenError) -> Self {
        CircuitError::Open(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_open_message_names_the_circuit() {
        let err: CircuitError<std::io::Error> = CircuitOpenError {
            circuit: "Foobar".to_string(),
            failures: 3,
            remaining: Duration::from_millis(29_600),
            last_failure: Some("Custom { kind: Other, error: \"boom\" }".to_string()),
        }
        .into();

        assert_eq!(
            err.to_string(),
            "circuit \"Foobar\" is open (3 failures, 29 sec remaining)"
        );
        assert!(err.is_open());
        assert!(err.source().is_none());
    }

    #[test]
    fn test_execution_keeps_the_error_untouched() {
        let err = CircuitError::Execution(std::io::Error::other("refused"));

        assert!(!err.is_open());
        assert_eq!(err.to_string(), "circuit execution failed: refused");
        assert!(err.source().is_some());
        assert_eq!(err.into_execution().map(|e| e.kind()), Some(std::io::ErrorKind::Other));
    }

    #[test]
    fn test_open_message_without_displayable_error() {
        #[derive(Debug)]
        struct Opaque;

        let err: CircuitError<Opaque> = CircuitError::Open(CircuitOpenError {
            circuit: "opaque".to_string(),
            failures: 1,
            remaining: Duration::from_secs(5),
            last_failure: Some("Opaque".to_string()),
        });

        let open = err.as_open().expect("short-circuited");
        assert_eq!(open.to_string(), "circuit \"opaque\" is open (1 failures, 5 sec remaining)");
        assert!(err.execution().is_none());
    }
}
