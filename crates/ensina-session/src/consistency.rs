//! Cross-source consistency validation and correction
//!
//! Compares the user as seen by every registered [`UserSource`] (cache,
//! broadcast snapshot, server record), grades each disagreement, and drives
//! resynchronization through the [`SessionSync`] capability when sources
//! drift apart.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use ensina_types::User;

use crate::config::ValidatorConfig;
use crate::error::{AuthError, ErrorKind};
use crate::metrics;
use crate::retry::{with_retry, RetryableError};
use crate::session::{SessionSync, UserSource};

/// How much a disagreement matters. Ordered, so the worst discrepancy in a
/// report is `discrepancies.iter().map(|d| d.severity).max()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Cosmetic field drift (avatar, phone, bio)
    Info,
    /// Profile field drift (name, role, email)
    Warning,
    /// Identity drift (id mismatch, or user missing on one side)
    Critical,
}

/// One field disagreement between two named sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    /// Field that disagrees, or `"user_existence"` when one side has no user
    pub field: String,
    pub left_source: String,
    pub right_source: String,
    pub left: Option<String>,
    pub right: Option<String>,
    pub severity: Severity,
    pub description: String,
}

/// What the caller should do about a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Minor drift, a background resync is enough
    Sync,
    /// Identity-level drift, reload session state from the server
    Reload,
    /// Too many disagreements to trust automation
    ManualCheck,
}

/// Outcome of one validation pass over all sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub is_consistent: bool,
    pub discrepancies: Vec<Discrepancy>,
    pub checked_at: DateTime<Utc>,
    pub recommendation: Recommendation,
    /// Source names consulted, in registration order
    pub sources: Vec<String>,
}

impl ConsistencyReport {
    /// Worst severity present, if any.
    pub fn worst_severity(&self) -> Option<Severity> {
        self.discrepancies.iter().map(|d| d.severity).max()
    }

    fn count(&self, severity: Severity) -> usize {
        self.discrepancies
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Correction strategies, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStrategy {
    /// Refetch from the server and overwrite local state
    ServerPriority,
    /// Drop the cache entry, then refetch
    CacheInvalidation,
    /// Clear all local auth state, then refetch
    CompleteReload,
    /// No automated strategy applies
    ManualIntervention,
}

impl CorrectionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionStrategy::ServerPriority => "server_priority",
            CorrectionStrategy::CacheInvalidation => "cache_invalidation",
            CorrectionStrategy::CompleteReload => "complete_reload",
            CorrectionStrategy::ManualIntervention => "manual_intervention",
        }
    }
}

impl std::fmt::Display for CorrectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What [`ConsistencyValidator::auto_correct`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CorrectionOutcome {
    /// The report had no discrepancies; nothing was done.
    AlreadyConsistent,
    /// Resynchronization restored agreement.
    Repaired {
        strategy: CorrectionStrategy,
        attempts: u32,
    },
    /// All attempts ran and the sources still disagree.
    Failed {
        strategy: CorrectionStrategy,
        attempts: u32,
    },
    /// The discrepancy pattern is outside what automation should touch.
    ManualInterventionRequired,
}

impl CorrectionOutcome {
    /// True when the sources agree after the call.
    pub fn repaired(&self) -> bool {
        matches!(
            self,
            CorrectionOutcome::AlreadyConsistent | CorrectionOutcome::Repaired { .. }
        )
    }
}

/// Field existence marker used when one side has no user at all.
pub const FIELD_USER_EXISTENCE: &str = "user_existence";

// Compared fields with their severities. Timestamps are deliberately not
// compared; they differ between a cached record and a fresh fetch.
fn field_values(user: &User) -> [(&'static str, Option<String>, Severity); 7] {
    [
        ("id", Some(user.id.clone()), Severity::Critical),
        ("name", Some(user.name.clone()), Severity::Warning),
        ("role", Some(user.role.as_str().to_string()), Severity::Warning),
        ("email", Some(user.email.clone()), Severity::Warning),
        ("avatar_path", user.avatar_path.clone(), Severity::Info),
        ("phone", user.phone.clone(), Severity::Info),
        ("bio", user.bio.clone(), Severity::Info),
    ]
}

/// Compare two source views field by field.
///
/// Two absent users agree. A user present on one side only is a single
/// critical discrepancy; there is nothing meaningful to compare field-wise.
pub fn detect_discrepancies(
    left_name: &str,
    left: Option<&User>,
    right_name: &str,
    right: Option<&User>,
) -> Vec<Discrepancy> {
    match (left, right) {
        (None, None) => Vec::new(),
        (Some(user), None) => vec![Discrepancy {
            field: FIELD_USER_EXISTENCE.to_string(),
            left_source: left_name.to_string(),
            right_source: right_name.to_string(),
            left: Some(user.id.clone()),
            right: None,
            severity: Severity::Critical,
            description: format!("user present in {left_name} but missing in {right_name}"),
        }],
        (None, Some(user)) => vec![Discrepancy {
            field: FIELD_USER_EXISTENCE.to_string(),
            left_source: left_name.to_string(),
            right_source: right_name.to_string(),
            left: None,
            right: Some(user.id.clone()),
            severity: Severity::Critical,
            description: format!("user present in {right_name} but missing in {left_name}"),
        }],
        (Some(a), Some(b)) => {
            let mut discrepancies = Vec::new();
            for ((field, left_value, severity), (_, right_value, _)) in
                field_values(a).into_iter().zip(field_values(b))
            {
                if left_value != right_value {
                    discrepancies.push(Discrepancy {
                        field: field.to_string(),
                        left_source: left_name.to_string(),
                        right_source: right_name.to_string(),
                        left: left_value,
                        right: right_value,
                        severity,
                        description: format!("{left_name} and {right_name} disagree on {field}"),
                    });
                }
            }
            discrepancies
        }
    }
}

/// Recommendation policy over a discrepancy set.
///
/// Any critical finding outranks volume; volume above three outranks routine
/// sync.
pub fn recommend(discrepancies: &[Discrepancy]) -> Recommendation {
    if discrepancies
        .iter()
        .any(|d| d.severity == Severity::Critical)
    {
        Recommendation::Reload
    } else if discrepancies.len() > 3 {
        Recommendation::ManualCheck
    } else {
        Recommendation::Sync
    }
}

/// Strategy selection, in priority order.
pub fn select_strategy(discrepancies: &[Discrepancy]) -> CorrectionStrategy {
    let critical_on_id = discrepancies
        .iter()
        .any(|d| d.severity == Severity::Critical && d.field == "id");
    if critical_on_id {
        return CorrectionStrategy::CompleteReload;
    }
    if discrepancies
        .iter()
        .any(|d| d.severity == Severity::Critical)
    {
        return CorrectionStrategy::ServerPriority;
    }
    let warnings = discrepancies
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .count();
    if warnings > 2 {
        return CorrectionStrategy::CacheInvalidation;
    }
    if discrepancies.len() <= 2 {
        return CorrectionStrategy::ServerPriority;
    }
    CorrectionStrategy::ManualIntervention
}

#[derive(Debug, thiserror::Error)]
enum CorrectionError {
    #[error("resynchronization failed: {0}")]
    Resync(#[from] AuthError),
    #[error("sources still disagree after resynchronization ({0} discrepancies)")]
    StillInconsistent(usize),
}

impl RetryableError for CorrectionError {
    fn is_retryable(&self) -> bool {
        match self {
            // Unlike the session client, the executor also retries backend
            // failures; its whole job is to outlast transient server trouble.
            CorrectionError::Resync(err) => {
                err.is_retryable() || err.kind() == ErrorKind::Server
            }
            CorrectionError::StillInconsistent(_) => true,
        }
    }
}

/// Validates agreement between user sources and repairs drift.
///
/// Sources and the sync capability are injected; the validator never reaches
/// into client internals.
pub struct ConsistencyValidator {
    sources: Vec<Arc<dyn UserSource>>,
    sync: Arc<dyn SessionSync>,
    config: ValidatorConfig,
    history: Mutex<VecDeque<ConsistencyReport>>,
    last_report: Mutex<Option<ConsistencyReport>>,
}

impl ConsistencyValidator {
    pub fn new(
        sources: Vec<Arc<dyn UserSource>>,
        sync: Arc<dyn SessionSync>,
        config: ValidatorConfig,
    ) -> Result<Self, AuthError> {
        config.validate()?;
        if sources.len() < 2 {
            return Err(AuthError::Config(
                "consistency validation needs at least two sources".to_string(),
            ));
        }
        Ok(Self {
            sources,
            sync,
            config,
            history: Mutex::new(VecDeque::new()),
            last_report: Mutex::new(None),
        })
    }

    /// Whether callers running on a schedule should correct automatically.
    pub fn auto_fix_enabled(&self) -> bool {
        self.config.auto_fix
    }

    /// Compare every pair of sources and produce a graded report.
    ///
    /// A source that cannot answer aborts the run; a partial comparison
    /// would report phantom discrepancies.
    #[instrument(skip(self), level = "debug")]
    pub async fn validate_consistency(&self) -> Result<ConsistencyReport, AuthError> {
        let mut views: Vec<(&'static str, Option<User>)> = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let user = match source.current_user().await {
                Ok(user) => user,
                Err(err) => {
                    metrics::record_consistency_run("error");
                    warn!(source = source.name(), error = %err, "source unavailable, aborting validation");
                    return Err(err);
                }
            };
            views.push((source.name(), user));
        }

        let mut discrepancies = Vec::new();
        for i in 0..views.len() {
            for j in (i + 1)..views.len() {
                let (left_name, left) = &views[i];
                let (right_name, right) = &views[j];
                discrepancies.extend(detect_discrepancies(
                    left_name,
                    left.as_ref(),
                    right_name,
                    right.as_ref(),
                ));
            }
        }

        let report = ConsistencyReport {
            is_consistent: discrepancies.is_empty(),
            recommendation: recommend(&discrepancies),
            discrepancies,
            checked_at: Utc::now(),
            sources: views.iter().map(|(name, _)| name.to_string()).collect(),
        };

        if report.is_consistent {
            metrics::record_consistency_run("consistent");
            debug!(sources = report.sources.len(), "sources agree");
        } else {
            metrics::record_consistency_run("inconsistent");
            warn!(
                discrepancies = report.discrepancies.len(),
                critical = report.count(Severity::Critical),
                warning = report.count(Severity::Warning),
                recommendation = ?report.recommendation,
                "sources disagree"
            );
            let mut history = self.history.lock();
            if history.len() == self.config.history_capacity {
                history.pop_front();
            }
            history.push_back(report.clone());
        }
        *self.last_report.lock() = Some(report.clone());

        Ok(report)
    }

    /// Pick a strategy for the report and resynchronize until the sources
    /// agree or attempts run out.
    ///
    /// Each attempt re-validates; backoff between attempts follows the
    /// retry configuration. A transport failure during resynchronization is
    /// returned as an error rather than counted as a failed repair.
    #[instrument(skip(self, report), level = "debug")]
    pub async fn auto_correct(
        &self,
        report: &ConsistencyReport,
    ) -> Result<CorrectionOutcome, AuthError> {
        if report.is_consistent {
            return Ok(CorrectionOutcome::AlreadyConsistent);
        }

        let strategy = select_strategy(&report.discrepancies);
        if strategy == CorrectionStrategy::ManualIntervention {
            warn!(
                discrepancies = report.discrepancies.len(),
                "no automated correction applies"
            );
            metrics::record_correction(strategy.as_str(), "manual");
            return Ok(CorrectionOutcome::ManualInterventionRequired);
        }

        info!(%strategy, discrepancies = report.discrepancies.len(), "correcting drift");

        let mut attempts = 0u32;
        let result = with_retry(self.config.retry.clone(), || {
            attempts += 1;
            self.correction_attempt(strategy)
        })
        .await;

        match result {
            Ok(()) => {
                metrics::record_correction(strategy.as_str(), "repaired");
                info!(%strategy, attempts, "sources agree after correction");
                Ok(CorrectionOutcome::Repaired { strategy, attempts })
            }
            Err(CorrectionError::StillInconsistent(remaining)) => {
                metrics::record_correction(strategy.as_str(), "failed");
                warn!(%strategy, attempts, remaining, "correction attempts exhausted");
                Ok(CorrectionOutcome::Failed { strategy, attempts })
            }
            Err(CorrectionError::Resync(err)) => {
                metrics::record_correction(strategy.as_str(), "errored");
                Err(err)
            }
        }
    }

    /// Resynchronize with the server unconditionally, then report.
    ///
    /// The escape hatch when automated correction has given up.
    #[instrument(skip(self), level = "debug")]
    pub async fn force_synchronization(&self) -> Result<ConsistencyReport, AuthError> {
        info!("forcing resynchronization from the server");
        self.sync.refresh().await?;
        let report = self.validate_consistency().await?;
        metrics::record_correction(
            "forced_sync",
            if report.is_consistent {
                "repaired"
            } else {
                "failed"
            },
        );
        Ok(report)
    }

    /// Inconsistent reports observed so far, oldest first, capped at the
    /// configured capacity.
    pub fn inconsistency_history(&self) -> Vec<ConsistencyReport> {
        self.history.lock().iter().cloned().collect()
    }

    /// The most recent report, consistent or not.
    pub fn last_report(&self) -> Option<ConsistencyReport> {
        self.last_report.lock().clone()
    }

    async fn correction_attempt(&self, strategy: CorrectionStrategy) -> Result<(), CorrectionError> {
        self.resync(strategy).await?;
        let report = self.validate_consistency().await.map_err(CorrectionError::Resync)?;
        if report.is_consistent {
            Ok(())
        } else {
            Err(CorrectionError::StillInconsistent(
                report.discrepancies.len(),
            ))
        }
    }

    // All strategies funnel into refresh; they differ in how much local
    // state is discarded first.
    async fn resync(&self, strategy: CorrectionStrategy) -> Result<(), AuthError> {
        match strategy {
            CorrectionStrategy::ServerPriority => {}
            CorrectionStrategy::CacheInvalidation => self.sync.invalidate(),
            CorrectionStrategy::CompleteReload => self.sync.reset(),
            CorrectionStrategy::ManualIntervention => return Ok(()),
        }
        self.sync.refresh().await?;
        Ok(())
    }
}

impl std::fmt::Debug for ConsistencyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyValidator")
            .field("sources", &self.sources.len())
            .field("auto_fix", &self.config.auto_fix)
            .finish_non_exhaustive()
    }
}
