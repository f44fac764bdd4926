//! Aggregated diagnostics
//!
//! A serializable snapshot across the session client, circuit breaker,
//! validator, and monitor, for support tooling and structured log dumps.
//! Capturing one never mutates any component.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::consistency::{ConsistencyReport, ConsistencyValidator};
use crate::monitor::{ConsistencyMonitor, MonitorStatus};
use crate::session::SessionClient;

/// Auth state as seen by the client.
#[derive(Debug, Clone, Serialize)]
pub struct AuthDiagnostics {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub authenticated: bool,
    pub loading: bool,
    pub error: Option<String>,
}

/// Circuit breaker internals.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerDiagnostics {
    pub state: &'static str,
    pub failure_count: u32,
    pub cooldown_remaining_ms: Option<u64>,
}

/// Validator activity.
#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyDiagnostics {
    pub last_report: Option<ConsistencyReport>,
    pub inconsistencies_recorded: usize,
}

/// Point-in-time view across the whole stack.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub captured_at: DateTime<Utc>,
    pub auth: AuthDiagnostics,
    pub breaker: BreakerDiagnostics,
    pub consistency: ConsistencyDiagnostics,
    pub monitor: MonitorStatus,
}

/// Capture the current state of every component.
pub fn capture(
    client: &SessionClient,
    validator: &ConsistencyValidator,
    monitor: &ConsistencyMonitor,
) -> DiagnosticsReport {
    let snapshot = client.snapshot();
    DiagnosticsReport {
        captured_at: Utc::now(),
        auth: AuthDiagnostics {
            user_id: snapshot.user.as_ref().map(|u| u.id.clone()),
            email: snapshot.user.as_ref().map(|u| u.email.clone()),
            authenticated: snapshot.is_authenticated,
            loading: snapshot.is_loading,
            error: snapshot.error.as_ref().map(|e| e.to_string()),
        },
        breaker: BreakerDiagnostics {
            state: client.breaker_state().as_str(),
            failure_count: client.breaker_failure_count(),
            cooldown_remaining_ms: client
                .breaker_cooldown_remaining()
                .map(|d| d.as_millis() as u64),
        },
        consistency: ConsistencyDiagnostics {
            last_report: validator.last_report(),
            inconsistencies_recorded: validator.inconsistency_history().len(),
        },
        monitor: monitor.status(),
    }
}
