//! Reconciles one user's cached activity with ledger truth.
//!
//! A reconciliation runs after a mutating ledger call has settled:
//!
//! 1. read the canonical total and overwrite the cached one (fail closed);
//! 2. enumerate challenge ids and query progress and completion for each,
//!    skipping any challenge whose queries fail (fail open);
//! 3. apply each challenge as its own atomic write, crediting the reward only
//!    when the storage-level completion guard accepts the insert;
//! 4. append the workout entry keyed by the ledger receipt.
//!
//! No step spans a transaction across the ledger and the cache. Re-running
//! with unchanged ledger state only rewrites the total.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use mockable::Clock;
use tracing::{error, info, warn};

use super::ports::{
    ActivityCacheRepository, ChallengeDefinitionRepository, LedgerClient, LedgerClientError,
    ReconcileMetric, ReconcileStatus, SyncMetrics,
};
use super::{
    ChallengeDefinition, ChallengeId, CompletionCredit, DEFAULT_MAX_CHALLENGES, Error,
    InvariantViolation,
    LedgerChallengeState, LedgerIdentity, ProgressUpdate, ReconcileRequest, UserId,
    WorkoutAppendOutcome, WorkoutEntry, evaluate_challenge, evaluate_total,
};

pub(crate) mod mapping;

use mapping::{checked_challenge_count, map_cache_error, map_enumeration_error, map_ledger_error};

/// Tuning for [`ActivityCacheSync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivitySyncConfig {
    /// Per-challenge ledger queries in flight at once.
    pub max_concurrent_ledger_queries: usize,
    /// Highest ledger challenge count accepted before enumeration.
    pub max_challenges: u64,
}

impl Default for ActivitySyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_ledger_queries: 4,
            max_challenges: DEFAULT_MAX_CHALLENGES,
        }
    }
}

/// Port bundle required by [`ActivityCacheSync`].
pub struct ActivitySyncPorts {
    /// Authoritative ledger.
    pub ledger: Arc<dyn LedgerClient>,
    /// Local activity cache.
    pub cache: Arc<dyn ActivityCacheRepository>,
    /// Challenge definition mirror.
    pub definitions: Arc<dyn ChallengeDefinitionRepository>,
    /// Metrics adapter.
    pub metrics: Arc<dyn SyncMetrics>,
}

/// Result of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Canonical total now held by the cache.
    pub total: u64,
    /// Challenges credited for the first time by this call, in id order.
    pub newly_completed: Vec<ChallengeId>,
    /// Challenges skipped because a ledger query failed.
    pub skipped: Vec<ChallengeId>,
    /// Ledger observations that contradict the cache.
    pub violations: Vec<InvariantViolation>,
    /// Whether the workout entry was new.
    pub workout: WorkoutAppendOutcome,
}

/// Reconciliation service for the activity cache.
pub struct ActivityCacheSync {
    ledger: Arc<dyn LedgerClient>,
    cache: Arc<dyn ActivityCacheRepository>,
    definitions: Arc<dyn ChallengeDefinitionRepository>,
    metrics: Arc<dyn SyncMetrics>,
    clock: Arc<dyn Clock>,
    config: ActivitySyncConfig,
}

struct ChallengeIds {
    ids: Vec<ChallengeId>,
    mirror: BTreeMap<ChallengeId, ChallengeDefinition>,
}

impl ActivityCacheSync {
    /// Build the service.
    pub fn new(ports: ActivitySyncPorts, clock: Arc<dyn Clock>, config: ActivitySyncConfig) -> Self {
        Self {
            ledger: ports.ledger,
            cache: ports.cache,
            definitions: ports.definitions,
            metrics: ports.metrics,
            clock,
            config,
        }
    }

    /// Submit an activity delta to the ledger and return the reconciliation
    /// request for the settled mutation.
    ///
    /// Nothing is written to the cache here; pass the request to
    /// [`ActivityCacheSync::reconcile`] or a reconcile worker.
    ///
    /// # Errors
    ///
    /// Returns the mapped ledger error when the submission fails.
    pub async fn submit_delta(
        &self,
        user_id: UserId,
        ledger_identity: LedgerIdentity,
        amount: u64,
    ) -> Result<ReconcileRequest, Error> {
        let receipt = self
            .ledger
            .submit_delta(&ledger_identity, amount)
            .await
            .map_err(|error| map_ledger_error(error, "delta submission"))?;
        info!(%user_id, amount, receipt = %receipt.receipt_id, "delta settled on ledger");
        Ok(ReconcileRequest {
            user_id,
            ledger_identity,
            delta_amount: amount,
            receipt: receipt.receipt_id,
        })
    }

    /// Bring the cache for one user in line with the ledger.
    ///
    /// # Errors
    ///
    /// Returns an error without writing anything when the canonical total
    /// cannot be read. Storage failures and a failure to enumerate any
    /// challenge ids abort the remaining steps; writes already committed
    /// stay committed.
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<ReconcileOutcome, Error> {
        let result = self.run(request).await;
        let metric = match &result {
            Ok(outcome) => ReconcileMetric {
                status: ReconcileStatus::Completed,
                newly_completed: outcome.newly_completed.len(),
                skipped_challenges: outcome.skipped.len(),
            },
            Err(_) => ReconcileMetric {
                status: ReconcileStatus::Failed,
                newly_completed: 0,
                skipped_challenges: 0,
            },
        };
        // Metric writes are non-fatal.
        let _ = self.metrics.record_reconciliation(&metric).await;
        result
    }

    async fn run(&self, request: &ReconcileRequest) -> Result<ReconcileOutcome, Error> {
        let user_id = request.user_id;
        let total = self
            .ledger
            .get_total_accumulated(&request.ledger_identity)
            .await
            .map_err(|error| map_ledger_error(error, "total"))?;

        let snapshot = self
            .cache
            .load_snapshot(&user_id)
            .await
            .map_err(|error| map_cache_error(error, "snapshot load"))?;

        let mut violations = Vec::new();
        if let Some(violation) = evaluate_total(snapshot.total, total) {
            self.report_violation(request, &violation).await;
            violations.push(violation);
        }
        self.cache
            .overwrite_total(&user_id, total)
            .await
            .map_err(|error| map_cache_error(error, "total overwrite"))?;

        let ChallengeIds { ids, mirror } = self.enumerate_challenges().await?;
        let observations = self
            .query_challenges(&request.ledger_identity, &ids)
            .await;

        let mut newly_completed = Vec::new();
        let mut skipped = Vec::new();
        for (challenge_id, observation) in observations {
            let state = match observation {
                Ok(state) => state,
                Err(error) => {
                    warn!(%user_id, %challenge_id, %error, "skipping challenge for this reconciliation");
                    skipped.push(challenge_id);
                    continue;
                }
            };

            let evaluation = evaluate_challenge(snapshot.progress_for(challenge_id), &state);
            for violation in &evaluation.violations {
                self.report_violation(request, violation).await;
            }
            violations.extend(evaluation.violations.iter().cloned());

            let completion = if evaluation.needs_credit {
                match self.reward_for(challenge_id, &mirror).await {
                    Some(reward) => Some(CompletionCredit {
                        reward,
                        receipt: request.receipt.clone(),
                    }),
                    None => {
                        skipped.push(challenge_id);
                        continue;
                    }
                }
            } else {
                None
            };

            let update = ProgressUpdate {
                user_id,
                challenge_id,
                progress: evaluation.progress,
                completed: evaluation.completed,
                completion,
                observed_at: self.clock.utc(),
            };
            let applied = self
                .cache
                .apply_progress(&update)
                .await
                .map_err(|error| map_cache_error(error, "progress apply"))?;
            if applied.newly_completed {
                info!(%user_id, %challenge_id, receipt = %request.receipt, "challenge completed");
                newly_completed.push(challenge_id);
            } else if applied.credit_refused {
                let violation = InvariantViolation::DuplicateCredit { challenge_id };
                self.report_violation(request, &violation).await;
                violations.push(violation);
            }
        }

        let workout = self
            .cache
            .append_workout(&WorkoutEntry {
                user_id,
                amount: request.delta_amount,
                receipt: request.receipt.clone(),
                recorded_at: self.clock.utc(),
            })
            .await
            .map_err(|error| map_cache_error(error, "workout append"))?;

        info!(
            %user_id,
            total,
            newly_completed = newly_completed.len(),
            skipped = skipped.len(),
            violations = violations.len(),
            "reconciliation finished"
        );

        Ok(ReconcileOutcome {
            total,
            newly_completed,
            skipped,
            violations,
            workout,
        })
    }

    async fn enumerate_challenges(&self) -> Result<ChallengeIds, Error> {
        let mirror_result = self.definitions.list_definitions().await;
        let count_error = match self.ledger.get_definition_count().await {
            Ok(count) => {
                let count = checked_challenge_count(count, self.config.max_challenges)?;
                let mirror = match mirror_result {
                    Ok(definitions) => index_definitions(definitions),
                    Err(error) => {
                        warn!(%error, "challenge mirror unavailable; rewards come from the ledger");
                        BTreeMap::new()
                    }
                };
                return Ok(ChallengeIds {
                    ids: ChallengeId::range_to(count).collect(),
                    mirror,
                });
            }
            Err(error) => error,
        };

        match mirror_result {
            Ok(definitions) => {
                warn!(error = %count_error, "ledger challenge count unavailable; using mirrored ids");
                let mirror = index_definitions(definitions);
                Ok(ChallengeIds {
                    ids: mirror.keys().copied().collect(),
                    mirror,
                })
            }
            Err(mirror_error) => Err(map_enumeration_error(count_error, mirror_error)),
        }
    }

    async fn query_challenges(
        &self,
        identity: &LedgerIdentity,
        ids: &[ChallengeId],
    ) -> Vec<(ChallengeId, Result<LedgerChallengeState, LedgerClientError>)> {
        let mut observations = stream::iter(ids.iter().copied())
            .map(|challenge_id| async move {
                let (progress, completed) = futures_util::join!(
                    self.ledger.get_progress(identity, challenge_id),
                    self.ledger.is_completed(identity, challenge_id),
                );
                let state = progress.and_then(|progress| {
                    completed.map(|completed| LedgerChallengeState {
                        challenge_id,
                        progress,
                        completed,
                    })
                });
                (challenge_id, state)
            })
            .buffer_unordered(self.config.max_concurrent_ledger_queries.max(1))
            .collect::<Vec<_>>()
            .await;
        observations.sort_by_key(|(challenge_id, _)| *challenge_id);
        observations
    }

    async fn reward_for(
        &self,
        challenge_id: ChallengeId,
        mirror: &BTreeMap<ChallengeId, ChallengeDefinition>,
    ) -> Option<u64> {
        if let Some(definition) = mirror.get(&challenge_id) {
            return Some(definition.reward);
        }
        match self.ledger.get_definition(challenge_id).await {
            Ok(definition) => Some(definition.reward),
            Err(error) => {
                warn!(%challenge_id, %error, "reward unknown; deferring completion");
                None
            }
        }
    }

    async fn report_violation(&self, request: &ReconcileRequest, violation: &InvariantViolation) {
        if matches!(violation, InvariantViolation::DuplicateCredit { .. }) {
            // A concurrent reconciliation winning the completion insert looks
            // the same as cache drift from here.
            warn!(
                user_id = %request.user_id,
                receipt = %request.receipt,
                kind = violation.label(),
                ?violation,
                "completion already credited; second credit refused"
            );
        } else {
            error!(
                user_id = %request.user_id,
                receipt = %request.receipt,
                kind = violation.label(),
                ?violation,
                "ledger contradicts cached activity"
            );
        }
        let _ = self.metrics.record_invariant_violation(violation).await;
    }
}

fn index_definitions(
    definitions: Vec<ChallengeDefinition>,
) -> BTreeMap<ChallengeId, ChallengeDefinition> {
    definitions
        .into_iter()
        .map(|definition| (definition.id, definition))
        .collect()
}

#[cfg(test)]
mod tests;
