//! Prometheus adapter for reconciliation and log refresh counters.
//!
//! Reconciliations and challenge batches share one `sync_jobs_total` family
//! labelled by job type, so dashboards can chart every background job with a
//! single query. Invariant violations and log ingestion have their own
//! families.

use async_trait::async_trait;
use prometheus::{CounterVec, IntCounterVec, Opts, Registry};

use crate::domain::InvariantViolation;
use crate::domain::ports::{
    ChallengeSyncMetric, LogRefreshMetric, LogRefreshStatus, ReconcileMetric, ReconcileStatus,
    SyncMetrics, SyncMetricsError,
};

const RECONCILE_TYPE_LABEL: &str = "Reconcile";
const CHALLENGE_SYNC_TYPE_LABEL: &str = "ChallengeSync";
const LOG_REFRESH_TYPE_LABEL: &str = "LogRefresh";

/// Prometheus-backed recorder for sync outcomes.
pub struct PrometheusSyncMetrics {
    sync_jobs_total: CounterVec,
    challenge_credits_total: IntCounterVec,
    invariant_violations_total: IntCounterVec,
    log_messages_total: IntCounterVec,
}

impl PrometheusSyncMetrics {
    /// Create and register counters with the provided registry.
    ///
    /// # Errors
    ///
    /// Returns an error when Prometheus rejects metric registration.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let sync_jobs_total = CounterVec::new(
            Opts::new("sync_jobs_total", "Total sync jobs by type and status"),
            &["type", "status"],
        )?;
        let challenge_credits_total = IntCounterVec::new(
            Opts::new(
                "challenge_credits_total",
                "Challenge completions by reconciliation outcome",
            ),
            &["outcome"],
        )?;
        let invariant_violations_total = IntCounterVec::new(
            Opts::new(
                "invariant_violations_total",
                "Ledger values observed below cached values",
            ),
            &["kind"],
        )?;
        let log_messages_total = IntCounterVec::new(
            Opts::new("log_messages_total", "Log messages handled by refresh outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(sync_jobs_total.clone()))?;
        registry.register(Box::new(challenge_credits_total.clone()))?;
        registry.register(Box::new(invariant_violations_total.clone()))?;
        registry.register(Box::new(log_messages_total.clone()))?;
        Ok(Self {
            sync_jobs_total,
            challenge_credits_total,
            invariant_violations_total,
            log_messages_total,
        })
    }

    fn record_job(&self, job_type: &str, status: &str) {
        self.sync_jobs_total
            .with_label_values(&[job_type, status])
            .inc();
    }
}

fn count(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[async_trait]
impl SyncMetrics for PrometheusSyncMetrics {
    async fn record_reconciliation(
        &self,
        payload: &ReconcileMetric,
    ) -> Result<(), SyncMetricsError> {
        let status = match payload.status {
            ReconcileStatus::Completed => "success",
            ReconcileStatus::Failed => "failure",
        };
        self.record_job(RECONCILE_TYPE_LABEL, status);
        self.challenge_credits_total
            .with_label_values(&["credited"])
            .inc_by(count(payload.newly_completed));
        self.challenge_credits_total
            .with_label_values(&["skipped"])
            .inc_by(count(payload.skipped_challenges));
        Ok(())
    }

    async fn record_invariant_violation(
        &self,
        violation: &InvariantViolation,
    ) -> Result<(), SyncMetricsError> {
        self.invariant_violations_total
            .with_label_values(&[violation.label()])
            .inc();
        Ok(())
    }

    async fn record_challenge_sync(
        &self,
        payload: &ChallengeSyncMetric,
    ) -> Result<(), SyncMetricsError> {
        let status = if payload.failed == 0 {
            "success"
        } else {
            "partial"
        };
        self.record_job(CHALLENGE_SYNC_TYPE_LABEL, status);
        Ok(())
    }

    async fn record_log_refresh(
        &self,
        payload: &LogRefreshMetric,
    ) -> Result<(), SyncMetricsError> {
        let status = match payload.status {
            LogRefreshStatus::Succeeded => "success",
            LogRefreshStatus::Failed => "failure",
        };
        self.record_job(LOG_REFRESH_TYPE_LABEL, status);
        self.log_messages_total
            .with_label_values(&["ingested"])
            .inc_by(count(payload.ingested));
        self.log_messages_total
            .with_label_values(&["decode_skipped"])
            .inc_by(count(payload.decode_skipped));
        Ok(())
    }
}
