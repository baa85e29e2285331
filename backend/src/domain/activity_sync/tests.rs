//! Behavioural coverage for activity reconciliation against in-memory ports.

use std::sync::Arc;

use rstest::{fixture, rstest};

use super::*;
use crate::domain::ports::{LedgerClientError, MockLedgerClient, NoOpSyncMetrics};
use crate::domain::{CachedProgress, ErrorCode, ReceiptId, UserId};
use crate::test_support::{
    InMemoryActivityCache, InMemoryChallengeDefinitions, MutableClock, RecordingSyncMetrics,
    ScriptedLedger,
};

fn challenge(id: u64) -> ChallengeId {
    ChallengeId::new(id).expect("valid challenge id")
}

fn definition(id: u64, target: u64, reward: u64) -> ChallengeDefinition {
    ChallengeDefinition {
        id: challenge(id),
        target,
        reward,
        level: 1,
        challenge_type: "distance".to_owned(),
        active: true,
    }
}

struct Harness {
    ledger: Arc<ScriptedLedger>,
    cache: Arc<InMemoryActivityCache>,
    definitions: Arc<InMemoryChallengeDefinitions>,
    metrics: Arc<RecordingSyncMetrics>,
    sync: ActivityCacheSync,
    user_id: UserId,
    identity: LedgerIdentity,
}

impl Harness {
    fn request(&self, delta_amount: u64, receipt: &str) -> ReconcileRequest {
        ReconcileRequest {
            user_id: self.user_id,
            ledger_identity: self.identity.clone(),
            delta_amount,
            receipt: ReceiptId::new(receipt).expect("valid receipt"),
        }
    }
}

#[fixture]
fn harness() -> Harness {
    let ledger = Arc::new(ScriptedLedger::new());
    let cache = Arc::new(InMemoryActivityCache::new());
    let definitions = Arc::new(InMemoryChallengeDefinitions::new());
    let metrics = Arc::new(RecordingSyncMetrics::default());
    let sync = ActivityCacheSync::new(
        ActivitySyncPorts {
            ledger: ledger.clone(),
            cache: cache.clone(),
            definitions: definitions.clone(),
            metrics: metrics.clone(),
        },
        Arc::new(MutableClock::at_epoch()),
        ActivitySyncConfig::default(),
    );
    Harness {
        ledger,
        cache,
        definitions,
        metrics,
        sync,
        user_id: UserId::random(),
        identity: LedgerIdentity::new("0.0.1001").expect("valid identity"),
    }
}

#[rstest]
#[tokio::test]
async fn completion_is_credited_exactly_once(harness: Harness) {
    harness.ledger.add_definition(definition(1, 1000, 50));
    harness.ledger.set_total(&harness.identity, 1000);
    harness
        .ledger
        .set_progress(&harness.identity, challenge(1), 1000, true);

    let first = harness
        .sync
        .reconcile(&harness.request(1000, "receipt-1"))
        .await
        .expect("first reconcile");
    let second = harness
        .sync
        .reconcile(&harness.request(1000, "receipt-1"))
        .await
        .expect("second reconcile");

    assert_eq!(first.newly_completed, vec![challenge(1)]);
    assert!(second.newly_completed.is_empty());
    assert_eq!(harness.cache.balance(&harness.user_id), 50);
    assert_eq!(harness.cache.completions(&harness.user_id), vec![challenge(1)]);
    assert_eq!(second.workout, WorkoutAppendOutcome::AlreadyRecorded);
    assert_eq!(harness.cache.workouts(&harness.user_id).len(), 1);
}

#[rstest]
#[tokio::test]
async fn total_is_overwritten_with_ledger_value(harness: Harness) {
    harness.ledger.set_total(&harness.identity, 420);

    let outcome = harness
        .sync
        .reconcile(&harness.request(20, "receipt-7"))
        .await
        .expect("reconcile");

    assert_eq!(outcome.total, 420);
    assert_eq!(harness.cache.total(&harness.user_id), Some(420));
    assert!(outcome.violations.is_empty());
}

#[rstest]
#[tokio::test]
async fn total_failure_writes_nothing(harness: Harness) {
    harness.cache.seed_total(harness.user_id, 100);
    harness
        .ledger
        .fail_total(Some(LedgerClientError::timeout("slow node")));

    let error = harness
        .sync
        .reconcile(&harness.request(10, "receipt-2"))
        .await
        .expect_err("total failure aborts");

    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
    assert_eq!(harness.cache.total(&harness.user_id), Some(100));
    assert!(harness.cache.workouts(&harness.user_id).is_empty());
    let recorded = harness.metrics.reconciliations();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].status, ReconcileStatus::Failed);
}

#[rstest]
#[tokio::test]
async fn failing_challenge_is_skipped_while_others_apply(harness: Harness) {
    for id in 1..=3 {
        harness.ledger.add_definition(definition(id, 10, id));
        harness
            .ledger
            .set_progress(&harness.identity, challenge(id), 10, true);
    }
    harness
        .ledger
        .fail_challenge(challenge(2), Some(LedgerClientError::transport("reset")));

    let outcome = harness
        .sync
        .reconcile(&harness.request(10, "receipt-3"))
        .await
        .expect("reconcile");

    assert_eq!(outcome.newly_completed, vec![challenge(1), challenge(3)]);
    assert_eq!(outcome.skipped, vec![challenge(2)]);
    assert_eq!(harness.cache.balance(&harness.user_id), 4);
    assert!(harness.cache.progress(&harness.user_id, challenge(2)).is_none());

    let recorded = harness.metrics.reconciliations();
    assert_eq!(recorded[0].status, ReconcileStatus::Completed);
    assert_eq!(recorded[0].skipped_challenges, 1);
}

#[rstest]
#[tokio::test]
async fn skipped_challenge_is_credited_on_a_later_run(harness: Harness) {
    harness.ledger.add_definition(definition(1, 10, 5));
    harness
        .ledger
        .set_progress(&harness.identity, challenge(1), 10, true);
    harness
        .ledger
        .fail_challenge(challenge(1), Some(LedgerClientError::transport("reset")));
    harness
        .sync
        .reconcile(&harness.request(10, "receipt-4"))
        .await
        .expect("first reconcile");

    harness.ledger.fail_challenge(challenge(1), None);
    let outcome = harness
        .sync
        .reconcile(&harness.request(10, "receipt-4"))
        .await
        .expect("second reconcile");

    assert_eq!(outcome.newly_completed, vec![challenge(1)]);
    assert_eq!(harness.cache.balance(&harness.user_id), 5);
}

#[rstest]
#[tokio::test]
async fn mirrored_ids_are_used_when_count_fails(harness: Harness) {
    harness.ledger.add_definition(definition(1, 10, 5));
    harness
        .ledger
        .set_progress(&harness.identity, challenge(1), 10, true);
    harness
        .definitions
        .upsert_definition(&definition(1, 10, 7))
        .await
        .expect("seed mirror");
    harness
        .ledger
        .fail_count(Some(LedgerClientError::rate_limited("slow down")));

    let outcome = harness
        .sync
        .reconcile(&harness.request(10, "receipt-5"))
        .await
        .expect("reconcile");

    assert_eq!(outcome.newly_completed, vec![challenge(1)]);
    assert_eq!(harness.cache.balance(&harness.user_id), 7);
}

#[rstest]
#[case(LedgerClientError::transport("down"), ErrorCode::ServiceUnavailable)]
#[case(LedgerClientError::rejected("no such contract"), ErrorCode::ServiceUnavailable)]
#[tokio::test]
async fn enumeration_failure_aborts_after_total(
    harness: Harness,
    #[case] failure: LedgerClientError,
    #[case] expected: ErrorCode,
) {
    harness.ledger.set_total(&harness.identity, 30);
    harness.ledger.fail_count(Some(failure));
    harness.definitions.set_unavailable(true);

    let error = harness
        .sync
        .reconcile(&harness.request(30, "receipt-6"))
        .await
        .expect_err("no ids to reconcile");

    assert_eq!(error.code(), expected);
    assert_eq!(harness.cache.total(&harness.user_id), Some(30));
    assert!(harness.cache.workouts(&harness.user_id).is_empty());
}

#[rstest]
#[tokio::test]
async fn reward_falls_back_to_ledger_definition(harness: Harness) {
    harness.ledger.add_definition(definition(2, 10, 9));
    harness
        .ledger
        .set_progress(&harness.identity, challenge(2), 12, true);
    harness.definitions.set_unavailable(true);

    let outcome = harness
        .sync
        .reconcile(&harness.request(12, "receipt-8"))
        .await
        .expect("reconcile");

    assert_eq!(outcome.newly_completed, vec![challenge(2)]);
    assert_eq!(harness.cache.balance(&harness.user_id), 9);
}

#[rstest]
#[tokio::test]
async fn unknown_reward_defers_completion(harness: Harness) {
    harness.ledger.add_definition(definition(1, 10, 9));
    harness
        .ledger
        .set_progress(&harness.identity, challenge(1), 10, true);
    harness
        .ledger
        .fail_definition(challenge(1), Some(LedgerClientError::timeout("slow")));

    let outcome = harness
        .sync
        .reconcile(&harness.request(10, "receipt-9"))
        .await
        .expect("reconcile");

    assert!(outcome.newly_completed.is_empty());
    assert_eq!(outcome.skipped, vec![challenge(1)]);
    assert_eq!(harness.cache.balance(&harness.user_id), 0);
    assert!(harness.cache.completions(&harness.user_id).is_empty());
}

#[rstest]
#[tokio::test]
async fn regressions_are_reported_and_never_applied(harness: Harness) {
    harness.ledger.add_definition(definition(1, 100, 5));
    harness.ledger.set_total(&harness.identity, 40);
    harness
        .ledger
        .set_progress(&harness.identity, challenge(1), 20, false);
    harness.cache.seed_total(harness.user_id, 90);
    harness.cache.seed_progress(
        harness.user_id,
        challenge(1),
        CachedProgress {
            progress: 60,
            completed: true,
            completed_at: None,
        },
    );

    let outcome = harness
        .sync
        .reconcile(&harness.request(0, "receipt-10"))
        .await
        .expect("reconcile");

    assert_eq!(
        outcome.violations,
        vec![
            InvariantViolation::TotalRegressed {
                cached: 90,
                reported: 40,
            },
            InvariantViolation::ProgressRegressed {
                challenge_id: challenge(1),
                cached: 60,
                reported: 20,
            },
            InvariantViolation::CompletionRevoked {
                challenge_id: challenge(1),
            },
        ]
    );
    assert_eq!(harness.cache.total(&harness.user_id), Some(40));
    let progress = harness
        .cache
        .progress(&harness.user_id, challenge(1))
        .expect("progress kept");
    assert_eq!(progress.progress, 60);
    assert!(progress.completed);
    assert_eq!(harness.metrics.violations().len(), 3);
}

#[rstest]
#[tokio::test]
async fn refused_second_credit_is_reported(harness: Harness) {
    harness.ledger.add_definition(definition(1, 10, 5));
    harness
        .ledger
        .set_progress(&harness.identity, challenge(1), 10, true);
    harness
        .sync
        .reconcile(&harness.request(10, "receipt-14"))
        .await
        .expect("first reconcile");
    harness.cache.seed_progress(
        harness.user_id,
        challenge(1),
        CachedProgress {
            progress: 10,
            completed: false,
            completed_at: None,
        },
    );

    let outcome = harness
        .sync
        .reconcile(&harness.request(10, "receipt-15"))
        .await
        .expect("second reconcile");

    assert!(outcome.newly_completed.is_empty());
    assert_eq!(
        outcome.violations,
        vec![InvariantViolation::DuplicateCredit {
            challenge_id: challenge(1)
        }]
    );
    assert_eq!(harness.cache.balance(&harness.user_id), 5);
    assert_eq!(
        harness.metrics.violations(),
        vec![InvariantViolation::DuplicateCredit {
            challenge_id: challenge(1)
        }]
    );
}

#[rstest]
#[tokio::test]
async fn oversized_challenge_count_is_rejected(harness: Harness) {
    harness.ledger.set_total(&harness.identity, 12);
    harness.ledger.override_count(Some(u64::MAX));

    let error = harness
        .sync
        .reconcile(&harness.request(12, "receipt-16"))
        .await
        .expect_err("count above the cap is rejected");

    assert_eq!(error.code(), ErrorCode::UpstreamRejected);
    assert_eq!(harness.cache.total(&harness.user_id), Some(12));
    assert!(harness.cache.workouts(&harness.user_id).is_empty());
}

#[rstest]
#[tokio::test]
async fn submitted_delta_yields_request_with_ledger_receipt(harness: Harness) {
    let request = harness
        .sync
        .submit_delta(harness.user_id, harness.identity.clone(), 250)
        .await
        .expect("submission settles");

    assert_eq!(request.delta_amount, 250);
    assert_eq!(request.receipt.as_str(), "receipt-1");
    assert!(harness.cache.workouts(&harness.user_id).is_empty());

    let outcome = harness
        .sync
        .reconcile(&request)
        .await
        .expect("reconcile after submit");
    assert_eq!(outcome.total, 250);
    assert_eq!(outcome.workout, WorkoutAppendOutcome::Appended);
}

#[rstest]
#[tokio::test]
async fn rejected_submission_is_not_retryable() {
    let mut ledger = MockLedgerClient::new();
    ledger
        .expect_submit_delta()
        .times(1)
        .returning(|_, _| Err(LedgerClientError::rejected("insufficient gas")));
    let sync = ActivityCacheSync::new(
        ActivitySyncPorts {
            ledger: Arc::new(ledger),
            cache: Arc::new(InMemoryActivityCache::new()),
            definitions: Arc::new(InMemoryChallengeDefinitions::new()),
            metrics: Arc::new(NoOpSyncMetrics),
        },
        Arc::new(MutableClock::at_epoch()),
        ActivitySyncConfig::default(),
    );

    let error = sync
        .submit_delta(
            UserId::random(),
            LedgerIdentity::new("0.0.9").expect("valid identity"),
            5,
        )
        .await
        .expect_err("rejected");
    assert_eq!(error.code(), ErrorCode::UpstreamRejected);
}

#[rstest]
#[tokio::test]
async fn progress_without_completion_is_stored(harness: Harness) {
    harness.ledger.add_definition(definition(1, 100, 5));
    harness
        .ledger
        .set_progress(&harness.identity, challenge(1), 35, false);

    let outcome = harness
        .sync
        .reconcile(&harness.request(35, "receipt-11"))
        .await
        .expect("reconcile");

    assert!(outcome.newly_completed.is_empty());
    let progress = harness
        .cache
        .progress(&harness.user_id, challenge(1))
        .expect("progress stored");
    assert_eq!(progress.progress, 35);
    assert!(!progress.completed);
    assert_eq!(outcome.workout, WorkoutAppendOutcome::Appended);
}

#[rstest]
#[tokio::test]
async fn storage_failure_aborts_reconciliation(harness: Harness) {
    harness.cache.set_unavailable(true);

    let error = harness
        .sync
        .reconcile(&harness.request(1, "receipt-12"))
        .await
        .expect_err("storage down");

    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
}

#[rstest]
#[tokio::test]
async fn total_is_read_before_any_cache_access() {
    let mut ledger = MockLedgerClient::new();
    ledger
        .expect_get_total_accumulated()
        .times(1)
        .returning(|_| Err(LedgerClientError::rejected("unknown account")));
    ledger.expect_get_definition_count().never();

    let cache = Arc::new(InMemoryActivityCache::new());
    cache.set_unavailable(true);
    let sync = ActivityCacheSync::new(
        ActivitySyncPorts {
            ledger: Arc::new(ledger),
            cache,
            definitions: Arc::new(InMemoryChallengeDefinitions::new()),
            metrics: Arc::new(NoOpSyncMetrics),
        },
        Arc::new(MutableClock::at_epoch()),
        ActivitySyncConfig::default(),
    );
    let request = ReconcileRequest {
        user_id: UserId::random(),
        ledger_identity: LedgerIdentity::new("0.0.9").expect("valid identity"),
        delta_amount: 1,
        receipt: ReceiptId::new("receipt-13").expect("valid receipt"),
    };

    let error = sync.reconcile(&request).await.expect_err("rejected");
    assert_eq!(error.code(), ErrorCode::UpstreamRejected);
}
