//! Periodic background consistency monitoring
//!
//! Runs a validation cycle on a fixed interval while a user is signed in and
//! the store is reachable. Repeated inconsistency escalates from automated
//! correction to a manual-intervention alert; a clean cycle de-escalates.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::consistency::ConsistencyValidator;
use crate::error::AuthError;
use crate::metrics;
use crate::session::SessionClient;

/// Why a cycle did not validate anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Nobody is signed in; there is no state to compare.
    LoggedOut,
    /// The store is unreachable; validation would only report phantom drift.
    ConnectivityDown,
}

/// Observable monitor state, updated after every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MonitorStatus {
    /// Not running, or running but no cycle has completed yet
    Idle,
    /// Last cycle found the sources in agreement
    Healthy,
    /// Last cycle was skipped
    Skipped { reason: SkipReason },
    /// Sources disagree; automated correction is still in play
    Inconsistent { consecutive: u32 },
    /// Disagreement outlasted the escalation threshold
    ManualInterventionRequired,
}

const RUN_IDLE: u8 = 0;
const RUN_ACTIVE: u8 = 1;

/// Background monitor over a session client and its validator.
///
/// `start` and `stop` are idempotent; the polling task never outlives a
/// dropped monitor.
pub struct ConsistencyMonitor {
    client: Arc<SessionClient>,
    validator: Arc<ConsistencyValidator>,
    config: MonitorConfig,
    run_state: AtomicU8,
    handle: Mutex<Option<JoinHandle<()>>>,
    cancel: Mutex<Option<CancellationToken>>,
    status_tx: Arc<watch::Sender<MonitorStatus>>,
    status_rx: watch::Receiver<MonitorStatus>,
}

impl ConsistencyMonitor {
    pub fn new(
        client: Arc<SessionClient>,
        validator: Arc<ConsistencyValidator>,
        config: MonitorConfig,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        let (status_tx, status_rx) = watch::channel(MonitorStatus::Idle);
        Ok(Self {
            client,
            validator,
            config,
            run_state: AtomicU8::new(RUN_IDLE),
            handle: Mutex::new(None),
            cancel: Mutex::new(None),
            status_tx: Arc::new(status_tx),
            status_rx,
        })
    }

    /// Start the polling loop. A second call while running is a no-op.
    ///
    /// The first cycle runs one full interval after start, matching the
    /// polling cadence rather than firing immediately.
    pub fn start(&self) {
        let cas = self.run_state.compare_exchange(
            RUN_IDLE,
            RUN_ACTIVE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if cas.is_err() {
            debug!("consistency monitor already running");
            return;
        }

        let token = CancellationToken::new();
        {
            let mut cancel = self.cancel.lock();
            *cancel = Some(token.clone());
        }

        let mut driver = CycleDriver {
            client: Arc::clone(&self.client),
            validator: Arc::clone(&self.validator),
            max_consecutive: self.config.max_consecutive_inconsistencies,
            status: Arc::clone(&self.status_tx),
            consecutive: 0,
        };
        let interval = self.config.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => driver.tick().await,
                }
            }
            debug!("consistency monitor loop exited");
        });
        {
            let mut slot = self.handle.lock();
            *slot = Some(handle);
        }

        info!(
            interval_secs = self.config.interval.as_secs(),
            "consistency monitor started"
        );
    }

    /// Stop the polling loop and wait for the task to finish. A call while
    /// stopped is a no-op.
    pub async fn stop(&self) {
        let cas = self.run_state.compare_exchange(
            RUN_ACTIVE,
            RUN_IDLE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if cas.is_err() {
            debug!("consistency monitor not running");
            return;
        }

        let token = self.cancel.lock().take();
        if let Some(token) = token {
            token.cancel();
        }
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "consistency monitor task ended abnormally");
            }
        }

        self.status_tx.send_replace(MonitorStatus::Idle);
        info!("consistency monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.run_state.load(Ordering::Acquire) == RUN_ACTIVE
    }

    /// State after the most recent cycle.
    pub fn status(&self) -> MonitorStatus {
        *self.status_rx.borrow()
    }

    /// Watch status transitions as they happen.
    pub fn watch_status(&self) -> watch::Receiver<MonitorStatus> {
        self.status_rx.clone()
    }
}

impl Drop for ConsistencyMonitor {
    fn drop(&mut self) {
        // The task holds no reference back to the monitor; cancelling the
        // token is enough to wind it down.
        if let Some(token) = self.cancel.lock().take() {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for ConsistencyMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyMonitor")
            .field("running", &self.is_running())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

struct CycleDriver {
    client: Arc<SessionClient>,
    validator: Arc<ConsistencyValidator>,
    max_consecutive: u32,
    status: Arc<watch::Sender<MonitorStatus>>,
    consecutive: u32,
}

impl CycleDriver {
    async fn tick(&mut self) {
        if self.client.current_user().is_none() {
            metrics::record_monitor_cycle("skipped_logged_out");
            debug!("skipping consistency cycle, nobody signed in");
            self.status.send_replace(MonitorStatus::Skipped {
                reason: SkipReason::LoggedOut,
            });
            return;
        }

        if !self.client.connectivity().await {
            metrics::record_monitor_cycle("skipped_offline");
            debug!("skipping consistency cycle, store unreachable");
            self.status.send_replace(MonitorStatus::Skipped {
                reason: SkipReason::ConnectivityDown,
            });
            return;
        }

        match self.validator.validate_consistency().await {
            Ok(report) if report.is_consistent => {
                metrics::record_monitor_cycle("consistent");
                self.mark_restored();
            }
            Ok(report) => {
                metrics::record_monitor_cycle("inconsistent");
                self.consecutive += 1;
                if self.consecutive > self.max_consecutive {
                    self.escalate();
                    return;
                }
                self.status.send_replace(MonitorStatus::Inconsistent {
                    consecutive: self.consecutive,
                });

                if !self.validator.auto_fix_enabled() {
                    return;
                }
                match self.validator.auto_correct(&report).await {
                    Ok(outcome) if outcome.repaired() => {
                        metrics::record_monitor_cycle("repaired");
                        self.mark_restored();
                    }
                    Ok(outcome) => {
                        debug!(outcome = ?outcome, "correction did not restore agreement");
                    }
                    Err(err) => {
                        warn!(error = %err, "automated correction errored");
                    }
                }
            }
            Err(err) => {
                // No report to act on; counts against the streak but there
                // is nothing to correct.
                metrics::record_monitor_cycle("error");
                warn!(error = %err, "consistency validation failed");
                self.consecutive += 1;
                if self.consecutive > self.max_consecutive {
                    self.escalate();
                } else {
                    self.status.send_replace(MonitorStatus::Inconsistent {
                        consecutive: self.consecutive,
                    });
                }
            }
        }
    }

    fn mark_restored(&mut self) {
        if self.consecutive > 0 {
            info!(
                after_cycles = self.consecutive,
                "consistency restored, counter reset"
            );
        }
        self.consecutive = 0;
        self.status.send_replace(MonitorStatus::Healthy);
    }

    fn escalate(&mut self) {
        error!(
            consecutive = self.consecutive,
            "manual intervention required, automated correction suspended"
        );
        metrics::record_monitor_cycle("escalated");
        self.status
            .send_replace(MonitorStatus::ManualInterventionRequired);
    }
}
