//! Circuit breaker for session-store calls
//!
//! Tracks consecutive failures of session checks and suppresses further
//! network calls for a cooldown window. Owned exclusively by the session
//! client and guarded by its state lock, so the struct itself carries no
//! locking.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics;

/// Breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through normally
    Closed,
    /// Calls are short-circuited until the cooldown elapses
    Open,
    /// One probe call is allowed through
    HalfOpen,
}

impl BreakerState {
    /// Stable label form
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Consecutive-failure circuit breaker.
///
/// Invariants: `failure_count` resets to 0 on every transition to CLOSED;
/// OPEN persists exactly `cooldown` from the last failure before a HALF_OPEN
/// probe is allowed. In HALF_OPEN the caller's in-flight deduplication
/// guarantees a single probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `threshold` consecutive failures
    /// and stays open for `cooldown`.
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            last_failure: None,
            threshold,
            cooldown,
        }
    }

    /// Whether a real call may go out right now.
    ///
    /// Advances OPEN to HALF_OPEN once the cooldown has elapsed, so a `true`
    /// return from an OPEN breaker means "probe allowed".
    pub fn allow_request(&mut self) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let cooled_down = self
                    .last_failure
                    .map(|at| at.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if cooled_down {
                    self.transition(BreakerState::HalfOpen);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call; resets the breaker to CLOSED.
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.last_failure = None;
        if self.state != BreakerState::Closed {
            self.transition(BreakerState::Closed);
        }
    }

    /// Record a failed call.
    ///
    /// Opens the breaker when the threshold is reached, or immediately when
    /// a HALF_OPEN probe fails.
    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure = Some(Instant::now());

        let should_open = match self.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => self.failure_count >= self.threshold,
            BreakerState::Open => false,
        };
        if should_open {
            self.transition(BreakerState::Open);
        }
    }

    /// Open immediately regardless of the failure count.
    ///
    /// Used for connectivity-class failures where further calls would only
    /// thrash. Still counts as a failure.
    pub fn force_open(&mut self) {
        self.failure_count += 1;
        self.last_failure = Some(Instant::now());
        if self.state != BreakerState::Open {
            self.transition(BreakerState::Open);
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Consecutive failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Time left before an OPEN breaker allows a probe, if any.
    #[must_use]
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        if self.state != BreakerState::Open {
            return None;
        }
        let last = self.last_failure?;
        self.cooldown.checked_sub(last.elapsed())
    }

    fn transition(&mut self, next: BreakerState) {
        if next == BreakerState::Closed {
            self.failure_count = 0;
            self.last_failure = None;
        }
        match next {
            BreakerState::Open => warn!(
                failures = self.failure_count,
                cooldown_secs = self.cooldown.as_secs(),
                "session circuit breaker opened"
            ),
            _ => debug!(from = %self.state, to = %next, "circuit breaker transition"),
        }
        metrics::record_breaker_transition(next.as_str());
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(5, Duration::from_secs(30))
    }

    #[test]
    fn starts_closed_and_allows_requests() {
        let mut b = breaker();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.allow_request());
        assert_eq!(b.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn opens_at_threshold() {
        let mut b = breaker();
        for _ in 0..4 {
            b.record_failure();
            assert_eq!(b.state(), BreakerState::Closed);
        }
        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert_eq!(b.failure_count(), 5);
        assert!(!b.allow_request());
    }

    #[tokio::test(start_paused = true)]
    async fn open_allows_probe_after_cooldown() {
        let mut b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        assert!(!b.allow_request());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!b.allow_request());
        assert_eq!(b.state(), BreakerState::Open);

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(b.allow_request());
        assert_eq!(b.state(), BreakerState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens_with_fresh_cooldown() {
        let mut b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(b.allow_request());

        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);
        assert!(!b.allow_request());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!b.allow_request());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(b.allow_request());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_success_closes_and_resets_count() {
        let mut b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(b.allow_request());
        assert_eq!(b.state(), BreakerState::HalfOpen);

        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.failure_count(), 0);
        assert!(b.allow_request());
    }

    #[test]
    fn success_while_closed_clears_accumulated_failures() {
        let mut b = breaker();
        b.record_failure();
        b.record_failure();
        assert_eq!(b.failure_count(), 2);

        b.record_success();
        assert_eq!(b.failure_count(), 0);
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn force_open_skips_the_threshold() {
        let mut b = breaker();
        b.force_open();
        assert_eq!(b.state(), BreakerState::Open);
        assert_eq!(b.failure_count(), 1);
        assert!(!b.allow_request());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(b.allow_request());
        assert_eq!(b.state(), BreakerState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_remaining_reports_open_window() {
        let mut b = breaker();
        assert_eq!(b.cooldown_remaining(), None);

        b.force_open();
        tokio::time::advance(Duration::from_secs(10)).await;
        let remaining = b.cooldown_remaining().unwrap();
        assert_eq!(remaining, Duration::from_secs(20));

        tokio::time::advance(Duration::from_secs(25)).await;
        assert_eq!(b.cooldown_remaining(), None);
    }
}
