//! Domain port surface for reconciliation and log refresh counters.
//!
//! Services report outcomes here; adapters decide how to export them.
//! Recording failures never abort the operation being measured.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::InvariantViolation;

define_port_error! {
    /// Errors exposed when recording sync metrics.
    pub enum SyncMetricsError {
        /// Metric exporter rejected the write.
        Export { message: String } =>
            "sync metrics exporter failed: {message}",
    }
}

/// Final status of one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileStatus {
    /// The cache was brought in line with the ledger (challenges may have
    /// been skipped).
    Completed,
    /// The reconciliation aborted.
    Failed,
}

/// Metric payload for one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileMetric {
    /// Final status.
    pub status: ReconcileStatus,
    /// Challenges credited for the first time.
    pub newly_completed: usize,
    /// Challenges skipped because a ledger query failed.
    pub skipped_challenges: usize,
}

/// Metric payload for one challenge definition batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeSyncMetric {
    /// Definitions upserted.
    pub synced: usize,
    /// Definitions skipped after a failure.
    pub failed: usize,
}

/// Final status of one log refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRefreshStatus {
    /// The batch was fetched and merged.
    Succeeded,
    /// The fetch failed.
    Failed,
}

/// Metric payload for one log refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogRefreshMetric {
    /// Final status.
    pub status: LogRefreshStatus,
    /// Messages added to the mirror.
    pub ingested: usize,
    /// Messages dropped because they failed to decode.
    pub decode_skipped: usize,
}

/// Metrics recording port for the sync services.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SyncMetrics: Send + Sync {
    /// Record a reconciliation outcome.
    async fn record_reconciliation(&self, payload: &ReconcileMetric)
    -> Result<(), SyncMetricsError>;

    /// Record an invariant violation observed during reconciliation.
    async fn record_invariant_violation(
        &self,
        violation: &InvariantViolation,
    ) -> Result<(), SyncMetricsError>;

    /// Record a challenge definition batch.
    async fn record_challenge_sync(
        &self,
        payload: &ChallengeSyncMetric,
    ) -> Result<(), SyncMetricsError>;

    /// Record a log refresh.
    async fn record_log_refresh(&self, payload: &LogRefreshMetric)
    -> Result<(), SyncMetricsError>;
}

/// No-op implementation used when metrics are disabled or in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSyncMetrics;

#[async_trait]
impl SyncMetrics for NoOpSyncMetrics {
    async fn record_reconciliation(
        &self,
        _payload: &ReconcileMetric,
    ) -> Result<(), SyncMetricsError> {
        Ok(())
    }

    async fn record_invariant_violation(
        &self,
        _violation: &InvariantViolation,
    ) -> Result<(), SyncMetricsError> {
        Ok(())
    }

    async fn record_challenge_sync(
        &self,
        _payload: &ChallengeSyncMetric,
    ) -> Result<(), SyncMetricsError> {
        Ok(())
    }

    async fn record_log_refresh(
        &self,
        _payload: &LogRefreshMetric,
    ) -> Result<(), SyncMetricsError> {
        Ok(())
    }
}
