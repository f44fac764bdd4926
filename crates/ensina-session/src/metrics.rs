//! Session SDK metrics for observability.
//!
//! # Metrics
//!
//! - `ensina_session_operations_total` - Counter of session operations by operation, status
//! - `ensina_session_operation_duration_seconds` - Histogram of operation latencies
//! - `ensina_session_short_circuits_total` - Counter of session checks answered from cache, by gate
//! - `ensina_session_breaker_transitions_total` - Counter of circuit breaker transitions by state
//! - `ensina_consistency_runs_total` - Counter of validation runs by result
//! - `ensina_consistency_corrections_total` - Counter of correction attempts by strategy, outcome
//! - `ensina_monitor_cycles_total` - Counter of monitor cycles by outcome
//!
//! # Usage
//!
//! Metrics are recorded automatically if a `metrics`-compatible recorder is
//! installed; without one the calls are no-ops.

use std::time::Instant;

use metrics::{counter, histogram};

/// Metric name for total session operations.
pub const OPERATIONS_TOTAL: &str = "ensina_session_operations_total";

/// Metric name for the operation duration histogram.
pub const OPERATION_DURATION_SECONDS: &str = "ensina_session_operation_duration_seconds";

/// Metric name for session checks answered without a network call.
pub const SHORT_CIRCUITS_TOTAL: &str = "ensina_session_short_circuits_total";

/// Metric name for circuit breaker transitions.
pub const BREAKER_TRANSITIONS_TOTAL: &str = "ensina_session_breaker_transitions_total";

/// Metric name for consistency validation runs.
pub const CONSISTENCY_RUNS_TOTAL: &str = "ensina_consistency_runs_total";

/// Metric name for correction attempts.
pub const CORRECTIONS_TOTAL: &str = "ensina_consistency_corrections_total";

/// Metric name for monitor cycles.
pub const MONITOR_CYCLES_TOTAL: &str = "ensina_monitor_cycles_total";

/// Session operations for metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SignIn,
    SignUp,
    SignOut,
    CheckSession,
    Refresh,
}

impl Operation {
    /// Get the operation name as a string for metric labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignIn => "sign_in",
            Self::SignUp => "sign_up",
            Self::SignOut => "sign_out",
            Self::CheckSession => "check_session",
            Self::Refresh => "refresh",
        }
    }
}

/// Operation result for metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Unauthenticated,
    Error,
    Cancelled,
}

impl Status {
    /// Get the status as a string for metric labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Unauthenticated => "unauthenticated",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Record a completed session operation.
pub fn record_operation(operation: Operation, status: Status, duration_seconds: f64) {
    counter!(
        OPERATIONS_TOTAL,
        "operation" => operation.as_str(),
        "status" => status.as_str()
    )
    .increment(1);

    histogram!(
        OPERATION_DURATION_SECONDS,
        "operation" => operation.as_str()
    )
    .record(duration_seconds);
}

/// Record a session check answered from cache.
///
/// `gate` names the short-circuit that fired: "breaker_open", "debounced",
/// "cache_valid", or "coalesced".
pub fn record_short_circuit(gate: &'static str) {
    counter!(SHORT_CIRCUITS_TOTAL, "gate" => gate).increment(1);
}

/// Record a circuit breaker transition into the given state.
pub fn record_breaker_transition(state: &'static str) {
    counter!(BREAKER_TRANSITIONS_TOTAL, "state" => state).increment(1);
}

/// Record a consistency validation run.
///
/// `result` is "consistent", "inconsistent", or "error".
pub fn record_consistency_run(result: &'static str) {
    counter!(CONSISTENCY_RUNS_TOTAL, "result" => result).increment(1);
}

/// Record a correction attempt for a strategy.
pub fn record_correction(strategy: &'static str, outcome: &'static str) {
    counter!(
        CORRECTIONS_TOTAL,
        "strategy" => strategy,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a monitor cycle.
///
/// `outcome` is "skipped_logged_out", "skipped_offline", "consistent",
/// "inconsistent", "repaired", "error", or "escalated".
pub fn record_monitor_cycle(outcome: &'static str) {
    counter!(MONITOR_CYCLES_TOTAL, "outcome" => outcome).increment(1);
}

/// Timer guard for recording operation duration.
///
/// Records the duration when dropped.
///
/// # Example
///
/// ```ignore
/// let timer = OperationTimer::start(Operation::SignIn);
/// let result = store.sign_in(&credentials).await;
/// timer.success();
/// ```
#[must_use]
pub struct OperationTimer {
    operation: Operation,
    start: Instant,
    recorded: bool,
}

impl OperationTimer {
    /// Start a new operation timer.
    pub fn start(operation: Operation) -> Self {
        Self {
            operation,
            start: Instant::now(),
            recorded: false,
        }
    }

    /// Record success and return the duration.
    pub fn success(mut self) -> std::time::Duration {
        let duration = self.start.elapsed();
        record_operation(self.operation, Status::Success, duration.as_secs_f64());
        self.recorded = true;
        duration
    }

    /// Record a clean unauthenticated result and return the duration.
    pub fn unauthenticated(mut self) -> std::time::Duration {
        let duration = self.start.elapsed();
        record_operation(
            self.operation,
            Status::Unauthenticated,
            duration.as_secs_f64(),
        );
        self.recorded = true;
        duration
    }

    /// Record an error and return the duration.
    pub fn error(mut self) -> std::time::Duration {
        let duration = self.start.elapsed();
        record_operation(self.operation, Status::Error, duration.as_secs_f64());
        self.recorded = true;
        duration
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        // Not explicitly recorded means the future was dropped mid-flight
        if !self.recorded {
            let duration = self.start.elapsed();
            record_operation(self.operation, Status::Cancelled, duration.as_secs_f64());
        }
    }
}

/// Describe all metrics for registration with a recorder.
///
/// Call this during application startup to register metric descriptions.
pub fn describe_metrics() {
    use metrics::{describe_counter, describe_histogram, Unit};

    describe_counter!(
        OPERATIONS_TOTAL,
        Unit::Count,
        "Total number of session operations performed by the Ensina SDK"
    );

    describe_histogram!(
        OPERATION_DURATION_SECONDS,
        Unit::Seconds,
        "Duration of session operations in seconds"
    );

    describe_counter!(
        SHORT_CIRCUITS_TOTAL,
        Unit::Count,
        "Session checks answered from cache without a network call"
    );

    describe_counter!(
        BREAKER_TRANSITIONS_TOTAL,
        Unit::Count,
        "Circuit breaker state transitions"
    );

    describe_counter!(
        CONSISTENCY_RUNS_TOTAL,
        Unit::Count,
        "Consistency validation runs"
    );

    describe_counter!(
        CORRECTIONS_TOTAL,
        Unit::Count,
        "Correction attempts by strategy and outcome"
    );

    describe_counter!(MONITOR_CYCLES_TOTAL, Unit::Count, "Health monitor cycles");
}
