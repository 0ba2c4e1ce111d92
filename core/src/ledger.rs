//! Consecutive-failure bookkeeping shared between the breaker and its state machine
//!
//! The breaker needs three facts: how many expected failures happened in a
//! row, when the last one happened, and what it looked like.
//!
//! Time is monotonic (`tokio::time::Instant`), so a paused tokio clock drives
//! it in tests.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct LastFailure {
    at: Option<Instant>,
    rendered: Option<String>,
}

/// Thread-safe failure ledger for one circuit
#[derive(Debug, Default)]
pub struct FailureLedger {
    failures: AtomicUsize,
    last: Mutex<LastFailure>,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an expected failure and return the new consecutive count
    pub fn record_failure(&self, rendered: String) -> usize {
        let mut last = self.last.lock();
        last.at = Some(Instant::now());
        last.rendered = Some(rendered);
        self.failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// A success breaks the streak and forgets the last error
    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
        self.last.lock().rendered = None;
    }

    /// Stamp "now" as the last failure time without counting a failure
    pub fn touch(&self) {
        self.last.lock().at = Some(Instant::now());
    }

    pub fn reset_count(&self) {
        self.failures.store(0, Ordering::Release);
    }

    /// Forget everything, including when the last failure happened
    pub fn clear(&self) {
        self.failures.store(0, Ordering::Release);
        *self.last.lock() = LastFailure::default();
    }

    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }

    pub fn last_failure(&self) -> Option<String> {
        self.last.lock().rendered.clone()
    }

    pub fn last_failure_at(&self) -> Option<Instant> {
        self.last.lock().at
    }

    /// Time since the last failure; `None` when nothing failed yet
    pub fn since_last_failure(&self) -> Option<Duration> {
        self.last_failure_at().map(|at| at.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_accumulate_until_success() {
        let ledger = FailureLedger::new();

        assert_eq!(ledger.record_failure("e1".into()), 1);
        assert_eq!(ledger.record_failure("e2".into()), 2);
        assert_eq!(ledger.failure_count(), 2);
        assert_eq!(ledger.last_failure().as_deref(), Some("e2"));

        ledger.record_success();
        assert_eq!(ledger.failure_count(), 0);
        assert_eq!(ledger.last_failure(), None);
        assert!(ledger.last_failure_at().is_some(), "success keeps the timestamp");
    }

    #[test]
    fn test_clear_forgets_timestamp() {
        let ledger = FailureLedger::new();
        ledger.record_failure("boom".into());
        ledger.clear();

        assert_eq!(ledger.failure_count(), 0);
        assert!(ledger.since_last_failure().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_since_last_failure_follows_the_clock() {
        let ledger = FailureLedger::new();
        ledger.record_failure("boom".into());

        tokio::time::advance(Duration::from_millis(750)).await;
        assert_eq!(ledger.since_last_failure(), Some(Duration::from_millis(750)));

        ledger.touch();
        assert_eq!(ledger.since_last_failure(), Some(Duration::ZERO));
        assert_eq!(ledger.failure_count(), 1);
    }
}
