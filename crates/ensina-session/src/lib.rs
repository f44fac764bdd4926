//! Ensina Session - client-side session state and consistency
//!
//! Keeps a signed-in user's state coherent across the in-memory cache, the
//! subscriber broadcast, and the server record: cached session checks behind
//! a circuit breaker, drift detection with graded reports, automated
//! correction, and a periodic background monitor.

pub mod breaker;
pub mod config;
pub mod consistency;
pub mod diagnostics;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod notify;
pub mod retry;
pub mod session;
pub mod transport;

pub use breaker::{BreakerState, CircuitBreaker};
pub use config::{MonitorConfig, SessionConfig, ValidatorConfig};
pub use consistency::{
    ConsistencyReport, ConsistencyValidator, CorrectionOutcome, CorrectionStrategy, Discrepancy,
    Recommendation, Severity,
};
pub use diagnostics::DiagnosticsReport;
pub use error::{AuthError, ErrorKind};
pub use monitor::{ConsistencyMonitor, MonitorStatus, SkipReason};
pub use retry::RetryConfig;
pub use session::{AuthSnapshot, AuthWatcher, SessionClient, SessionSync, UserSource};
pub use transport::{HttpSessionStore, SessionStore};
