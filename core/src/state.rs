//! Public view of the breaker's lifecycle state

use std::fmt;

/// Circuit breaker state as observed by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Calls flow through; expected failures are counted
    Closed,
    /// Calls are short-circuited until the recovery timeout elapses
    Open,
    /// A single trial call decides whether the circuit closes again
    HalfOpen,
}

impl State {
    /// Stable lowercase name, suitable for logs and metrics labels
    pub fn as_str(self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half_open",
        }
    }

    pub(crate) fn from_machine(name: &str) -> Self {
        match name {
            "Open" => State::Open,
            "HalfOpen" => State::HalfOpen,
            _ => State::Closed,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_names_map_to_states() {
        assert_eq!(State::from_machine("Closed"), State::Closed);
        assert_eq!(State::from_machine("Open"), State::Open);
        assert_eq!(State::from_machine("HalfOpen"), State::HalfOpen);
    }

    #[test]
    fn test_display_uses_snake_case() {
        assert_eq!(State::HalfOpen.to_string(), "half_open");
        assert_eq!(State::Closed.to_string(), "closed");
    }
}
