//! Listeners for state transitions

use crate::State;
use std::sync::Arc;

/// Transition listener, called with the circuit name
pub type Listener = Arc<dyn Fn(&str) + Send + Sync>;

/// Per-state transition listeners; each receives the circuit name
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_open: Option<Listener>,
    pub on_close: Option<Listener>,
    pub on_half_open: Option<Listener>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the listener for the state the circuit just entered
    pub fn notify(&self, circuit: &str, entered: State) {
        let listener = match entered {
            State::Open => &self.on_open,
            State::Closed => &self.on_close,
            State::HalfOpen => &self.on_half_open,
        };
        if let Some(listener) = listener {
            listener(circuit);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_half_open", &self.on_half_open.is_some())
            .finish()
    }
}
