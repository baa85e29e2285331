//! Bulk mirror of ledger challenge definitions.
//!
//! The mirror is advisory. A failure on one id is logged and skipped; only a
//! failure to learn how many challenges exist aborts the batch.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};

use super::activity_sync::mapping::{checked_challenge_count, map_ledger_error};
use super::ports::{ChallengeDefinitionRepository, ChallengeSyncMetric, LedgerClient, SyncMetrics};
use super::{ChallengeId, DEFAULT_MAX_CHALLENGES, Error};

/// Tuning for [`ChallengeDefinitionSync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChallengeSyncConfig {
    /// Ledger definition fetches in flight at once.
    pub max_concurrent_fetches: usize,
    /// Highest ledger challenge count accepted before enumeration.
    pub max_challenges: u64,
}

impl Default for ChallengeSyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 4,
            max_challenges: DEFAULT_MAX_CHALLENGES,
        }
    }
}

/// Result of one [`ChallengeDefinitionSync::sync_all`] batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeSyncSummary {
    /// Definitions written to the mirror.
    pub count: usize,
    /// Count reported by the ledger.
    pub reported_count: u64,
    /// Ids skipped because the fetch or the write failed.
    pub failed: Vec<ChallengeId>,
}

/// Mirrors challenge definitions `1..=N` from the ledger.
pub struct ChallengeDefinitionSync {
    ledger: Arc<dyn LedgerClient>,
    repository: Arc<dyn ChallengeDefinitionRepository>,
    metrics: Arc<dyn SyncMetrics>,
    config: ChallengeSyncConfig,
}

impl ChallengeDefinitionSync {
    /// Build the sync service.
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        repository: Arc<dyn ChallengeDefinitionRepository>,
        metrics: Arc<dyn SyncMetrics>,
        config: ChallengeSyncConfig,
    ) -> Self {
        Self {
            ledger,
            repository,
            metrics,
            config,
        }
    }

    /// Fetch every definition and upsert it into the mirror.
    ///
    /// # Errors
    ///
    /// Fails only when the ledger count cannot be read or exceeds
    /// [`ChallengeSyncConfig::max_challenges`].
    pub async fn sync_all(&self) -> Result<ChallengeSyncSummary, Error> {
        let reported_count = self
            .ledger
            .get_definition_count()
            .await
            .map_err(|error| map_ledger_error(error, "challenge count"))?;
        checked_challenge_count(reported_count, self.config.max_challenges)?;

        let mut fetched = stream::iter(ChallengeId::range_to(reported_count))
            .map(|id| async move { (id, self.ledger.get_definition(id).await) })
            .buffer_unordered(self.config.max_concurrent_fetches.max(1))
            .collect::<Vec<_>>()
            .await;
        fetched.sort_by_key(|(id, _)| *id);

        let mut count = 0;
        let mut failed = Vec::new();
        for (id, result) in fetched {
            let definition = match result {
                Ok(definition) => definition,
                Err(error) => {
                    warn!(challenge_id = %id, %error, "skipping challenge definition fetch");
                    failed.push(id);
                    continue;
                }
            };
            if definition.id != id {
                warn!(
                    challenge_id = %id,
                    returned_id = %definition.id,
                    "ledger returned a different challenge id; skipping"
                );
                failed.push(id);
                continue;
            }
            match self.repository.upsert_definition(&definition).await {
                Ok(()) => count += 1,
                Err(error) => {
                    warn!(challenge_id = %id, %error, "skipping challenge definition upsert");
                    failed.push(id);
                }
            }
        }

        // Metric writes are non-fatal.
        let _ = self
            .metrics
            .record_challenge_sync(&ChallengeSyncMetric {
                synced: count,
                failed: failed.len(),
            })
            .await;
        info!(count, reported_count, failed = failed.len(), "challenge definitions synced");

        Ok(ChallengeSyncSummary {
            count,
            reported_count,
            failed,
        })
    }
}
