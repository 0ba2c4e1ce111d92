//! Circuit breaker implementation using state machines
//!
//! The breaker owns a [`state_machines`] dynamic machine behind a mutex. The
//! lock is taken twice per guarded call: once to decide whether the call may
//! run, once to record its outcome. It is never held while the operation is
//! awaited, so concurrent calls through a closed circuit run in parallel.

use crate::{
    State,
    builder::CircuitBuilder,
    callbacks::Callbacks,
    classifier::{CatchAll, FailureClassifier, FailureContext},
    config::Config,
    errors::{CircuitError, CircuitOpenError},
    guarded::Guarded,
    ledger::FailureLedger,
};
use parking_lot::Mutex;
use state_machines::state_machine;
use std::any::Any;
use std::fmt;
use std::future::{Future, Ready};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker context - shared data visible to the transition guards
#[derive(Debug, Clone, Default)]
pub struct CircuitContext {
    pub config: Config,
    pub ledger: Arc<FailureLedger>,
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    pub opened_at: Option<Instant>,
    /// Recovery timeout drawn for this opening (jitter already applied)
    pub retry_after: Duration,
}

impl OpenData {
    /// Time left before a trial call is allowed, measured from the last failure
    fn remaining(&self, ledger: &FailureLedger) -> Duration {
        let elapsed = ledger.since_last_failure().unwrap_or(self.retry_after);
        self.retry_after.saturating_sub(elapsed)
    }
}

/// Data specific to the HalfOpen state
#[derive(Debug, Clone, Default)]
pub struct HalfOpenData {
    /// Sequence number of the trial call currently in flight, if any
    pub trial: Option<u64>,
}

state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen(HalfOpenData),
    ],
    events {
        trip {
            guards: [threshold_reached],
            transition: { from: Closed, to: Open }
        }
        reopen {
            transition: { from: HalfOpen, to: Open }
        }
        force_open {
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [recovery_due],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            transition: { from: [Open, HalfOpen], to: Closed }
        }
    }
}

impl Circuit<Closed> {
    /// Consecutive expected failures reached the configured threshold
    fn threshold_reached(&self, ctx: &CircuitContext) -> bool {
        ctx.ledger.failure_count() >= ctx.config.effective_threshold()
    }
}

impl Circuit<Open> {
    /// Recovery timeout elapsed since the last failure
    fn recovery_due(&self, ctx: &CircuitContext) -> bool {
        self.state_data_open()
            .is_some_and(|data| data.remaining(&ctx.ledger).is_zero())
    }
}

/// A state change to report once the machine lock is released
#[derive(Debug, Clone, Copy)]
enum Transition {
    Opened { retry_after: Duration },
    HalfOpened,
    Closed,
}

enum Admission<'a> {
    Permitted(Permit<'a>),
    Rejected,
}

/// Admission ticket for one guarded call.
///
/// A trial permit that is dropped without a counted outcome (the future was
/// cancelled, or the error was not an expected one) frees the half-open slot,
/// but only if the slot still belongs to its trial.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: Option<u64>,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: Option<u64>) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    fn fail<E: fmt::Debug + Any>(mut self, error: &E, duration: Duration) {
        if self.breaker.is_expected(error, duration) {
            self.settled = true;
            self.breaker.count_failure(error);
        } else {
            tracing::trace!(
                circuit = self.breaker.name(),
                error = ?error,
                "unexpected error, not counted"
            );
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if let (Some(trial), false) = (self.trial, self.settled) {
            self.breaker.release_trial(trial);
        }
    }
}

/// Async circuit breaker
///
/// Share it behind an [`Arc`] between every call site that talks to the same
/// dependency. See [`CircuitBreaker::call`] for the gating protocol.
pub struct CircuitBreaker {
    name: OnceLock<String>,
    context: CircuitContext,
    machine: Mutex<DynamicCircuit>,
    trials: AtomicU64,
    classifier: Arc<dyn FailureClassifier>,
    callbacks: Callbacks,
}

impl CircuitBreaker {
    /// Create a new circuit breaker (use builder() for more options)
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        Self::from_parts(name.into(), config, Arc::new(CatchAll), Callbacks::new())
    }

    pub(crate) fn from_parts(
        name: String,
        config: Config,
        classifier: Arc<dyn FailureClassifier>,
        callbacks: Callbacks,
    ) -> Self {
        let context = CircuitContext {
            config,
            ledger: Arc::new(FailureLedger::new()),
        };
        let machine = DynamicCircuit::new(context.clone());

        let slot = OnceLock::new();
        if !name.is_empty() {
            let _ = slot.set(name);
        }

        Self {
            name: slot,
            context,
            machine: Mutex::new(machine),
            trials: AtomicU64::new(0),
            classifier,
            callbacks,
        }
    }

    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> CircuitBuilder {
        CircuitBuilder::new(name)
    }

    /// Wrap `operation` so every invocation goes through this breaker
    ///
    /// An unnamed breaker takes the operation's type name.
    pub fn wrap<F>(self: &Arc<Self>, operation: F) -> Guarded<F> {
        self.name
            .get_or_init(|| std::any::type_name::<F>().to_string());
        Guarded::new(Arc::clone(self), operation)
    }

    /// Run `operation` under circuit protection
    ///
    /// - Open and not yet due for recovery: the operation is skipped and
    ///   [`CircuitError::Open`] is returned.
    /// - Open and due: the circuit goes half-open and this call is the trial.
    /// - Half-open with a trial already running: rejected like Open.
    /// - Otherwise the operation runs. Success resets the failure streak and
    ///   closes a half-open circuit. An expected error is counted and may open
    ///   the circuit; an unexpected one is returned without touching state.
    ///   Either way the error comes back as [`CircuitError::Execution`].
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Debug + 'static,
    {
        self.execute((), |()| operation(), |()| None::<Ready<Result<T, E>>>)
            .await
    }

    /// Like [`call`](Self::call), but a short-circuited call runs `fallback`
    /// instead of failing with [`CircuitError::Open`]
    pub async fn call_with_fallback<F, Fut, G, GFut, T, E>(
        &self,
        operation: F,
        fallback: G,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: fmt::Debug + 'static,
    {
        self.execute((), |()| operation(), |()| Some(fallback()))
            .await
    }

    pub(crate) async fn execute<A, F, Fut, G, GFut, T, E>(
        &self,
        args: A,
        operation: F,
        fallback: G,
    ) -> Result<T, CircuitError<E>>
    where
        F: FnOnce(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce(A) -> Option<GFut>,
        GFut: Future<Output = Result<T, E>>,
        E: fmt::Debug + 'static,
    {
        let permit = match self.admit() {
            Admission::Permitted(permit) => permit,
            Admission::Rejected => {
                return match fallback(args) {
                    Some(substitute) => {
                        tracing::debug!(circuit = self.name(), "circuit open, serving fallback");
                        substitute.await.map_err(CircuitError::Execution)
                    }
                    None => {
                        tracing::debug!(circuit = self.name(), "circuit open, rejecting call");
                        Err(self.open_error())
                    }
                };
            }
        };

        let started = Instant::now();
        match operation(args).await {
            Ok(value) => {
                permit.succeed();
                Ok(value)
            }
            Err(error) => {
                permit.fail(&error, started.elapsed());
                Err(CircuitError::Execution(error))
            }
        }
    }

    /// Record a success for work run outside [`call`](Self::call)
    pub fn record_success(&self) {
        let closed = {
            let mut machine = self.machine.lock();
            self.context.ledger.record_success();
            machine.current_state() == "HalfOpen" && machine.handle(CircuitEvent::Close).is_ok()
        };

        if closed {
            self.announce(Transition::Closed);
        }
    }

    /// Record a failure for work run outside [`call`](Self::call)
    ///
    /// Returns `false` when the classifier does not consider `error` expected;
    /// nothing is recorded in that case.
    pub fn record_failure<E: fmt::Debug + Any>(&self, error: &E) -> bool {
        if !self.is_expected(error, Duration::ZERO) {
            return false;
        }
        self.count_failure(error);
        true
    }

    /// Force the circuit open, as if a failure had just happened
    pub fn open(&self) {
        let (transition, was_open) = {
            let mut machine = self.machine.lock();
            self.context.ledger.touch();
            let was_open = machine.current_state() == "Open";
            if !was_open {
                let _ = machine.handle(CircuitEvent::ForceOpen);
            }
            (self.mark_open(&mut machine), was_open)
        };

        if !was_open {
            self.announce(transition);
        }
    }

    /// Force the circuit closed and clear the failure streak
    pub fn close(&self) {
        self.force_close(false);
    }

    /// Close the circuit and forget all failure history
    pub fn reset(&self) {
        self.force_close(true);
    }

    /// Current state
    ///
    /// An open circuit whose recovery timeout has elapsed reports
    /// [`State::HalfOpen`]: the next call will be let through as a trial.
    pub fn state(&self) -> State {
        let machine = self.machine.lock();
        match State::from_machine(machine.current_state()) {
            State::Open if self.recovery_due(&machine) => State::HalfOpen,
            state => state,
        }
    }

    /// Check if circuit is open
    pub fn is_open(&self) -> bool {
        self.state() == State::Open
    }

    /// Check if circuit is closed
    pub fn is_closed(&self) -> bool {
        self.state() == State::Closed
    }

    pub fn name(&self) -> &str {
        self.name.get().map_or("", String::as_str)
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// Consecutive expected failures since the last success or close
    pub fn failure_count(&self) -> usize {
        self.context.ledger.failure_count()
    }

    /// Debug rendering of the most recent expected failure, cleared by a success
    pub fn last_failure(&self) -> Option<String> {
        self.context.ledger.last_failure()
    }

    /// When the circuit last opened; `None` unless it is open
    pub fn opened_at(&self) -> Option<Instant> {
        self.machine.lock().open_data()?.opened_at
    }

    /// When an open circuit will let the next trial call through
    ///
    /// `None` when the circuit is not open, or when the recovery timeout is
    /// too large to be represented as an instant.
    pub fn open_until(&self) -> Option<Instant> {
        let machine = self.machine.lock();
        let data = machine.open_data()?;
        let last = self.context.ledger.last_failure_at()?;
        last.checked_add(data.retry_after)
    }

    /// Time left in the open state; zero unless the circuit is open
    pub fn open_remaining(&self) -> Duration {
        let machine = self.machine.lock();
        machine
            .open_data()
            .map_or(Duration::ZERO, |data| data.remaining(&self.context.ledger))
    }

    fn admit(&self) -> Admission<'_> {
        let (admission, entered) = {
            let mut machine = self.machine.lock();
            match State::from_machine(machine.current_state()) {
                State::Closed => (Admission::Permitted(Permit::new(self, None)), None),
                State::Open => {
                    if machine.handle(CircuitEvent::AttemptReset).is_ok() {
                        let trial = self.next_trial();
                        if let Some(data) = machine.half_open_data_mut() {
                            data.trial = Some(trial);
                        }
                        let permit = Permit::new(self, Some(trial));
                        (Admission::Permitted(permit), Some(Transition::HalfOpened))
                    } else {
                        (Admission::Rejected, None)
                    }
                }
                State::HalfOpen => match machine.half_open_data_mut() {
                    Some(data) if data.trial.is_none() => {
                        let trial = self.next_trial();
                        data.trial = Some(trial);
                        (Admission::Permitted(Permit::new(self, Some(trial))), None)
                    }
                    _ => (Admission::Rejected, None),
                },
            }
        };

        if let Some(transition) = entered {
            self.announce(transition);
        }
        admission
    }

    fn is_expected<E: Any>(&self, error: &E, duration: Duration) -> bool {
        let ctx = FailureContext {
            circuit_name: self.name(),
            error,
            duration,
        };
        self.classifier.is_expected(&ctx)
    }

    fn count_failure<E: fmt::Debug>(&self, error: &E) {
        let opened = {
            let mut machine = self.machine.lock();
            self.context.ledger.record_failure(format!("{error:?}"));

            let tripped = match State::from_machine(machine.current_state()) {
                State::HalfOpen => machine.handle(CircuitEvent::Reopen).is_ok(),
                State::Closed => machine.handle(CircuitEvent::Trip).is_ok(),
                State::Open => false,
            };
            tripped.then(|| self.mark_open(&mut machine))
        };

        if let Some(transition) = opened {
            self.announce(transition);
        }
    }

    fn next_trial(&self) -> u64 {
        self.trials.fetch_add(1, Ordering::Relaxed)
    }

    /// Free the half-open slot if `trial` still holds it
    fn release_trial(&self, trial: u64) {
        let mut machine = self.machine.lock();
        if let Some(data) = machine.half_open_data_mut() {
            if data.trial == Some(trial) {
                data.trial = None;
                tracing::debug!(circuit = self.name(), trial, "trial call ended uncounted, slot released");
            }
        }
    }

    fn force_close(&self, forget_history: bool) {
        let closed = {
            let mut machine = self.machine.lock();
            if forget_history {
                self.context.ledger.clear();
            } else {
                self.context.ledger.reset_count();
            }
            machine.current_state() != "Closed" && machine.handle(CircuitEvent::Close).is_ok()
        };

        if closed {
            self.announce(Transition::Closed);
        }
    }

    /// Apply Open-state bookkeeping (timestamp + drawn recovery timeout)
    fn mark_open(&self, machine: &mut DynamicCircuit) -> Transition {
        let retry_after = self.context.config.draw_recovery_timeout();
        if let Some(data) = machine.open_data_mut() {
            data.opened_at = Some(Instant::now());
            data.retry_after = retry_after;
        }
        Transition::Opened { retry_after }
    }

    fn recovery_due(&self, machine: &DynamicCircuit) -> bool {
        machine
            .open_data()
            .is_some_and(|data| data.remaining(&self.context.ledger).is_zero())
    }

    fn open_error<E>(&self) -> CircuitError<E> {
        CircuitError::Open(CircuitOpenError {
            circuit: self.name().to_string(),
            failures: self.failure_count(),
            remaining: self.open_remaining(),
            last_failure: self.last_failure(),
        })
    }

    fn announce(&self, transition: Transition) {
        let circuit = self.name();
        let entered = match transition {
            Transition::Opened { retry_after } => {
                tracing::warn!(
                    circuit,
                    failures = self.failure_count(),
                    retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX),
                    "circuit opened"
                );
                State::Open
            }
            Transition::HalfOpened => {
                tracing::info!(circuit, "circuit half-open, letting a trial call through");
                State::HalfOpen
            }
            Transition::Closed => {
                tracing::info!(circuit, "circuit closed");
                State::Closed
            }
        };
        self.callbacks.notify(circuit, entered);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(String::new(), Config::default())
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("failure_count", &self.failure_count())
            .field("config", &self.context.config)
            .field("classifier", &self.classifier)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
