//! Retry and queue behaviour for the reconcile worker.

use std::sync::Arc;

use chrono::TimeZone;
use mockall::Sequence;
use rstest::rstest;

use super::*;
use crate::domain::ports::{LedgerClient, LedgerClientError, MockLedgerClient, NoOpSyncMetrics};
use crate::domain::{ActivitySyncConfig, ActivitySyncPorts, ErrorCode, LedgerIdentity, ReceiptId, UserId};
use crate::test_support::{
    InMemoryActivityCache, InMemoryChallengeDefinitions, MutableClock, NoJitter,
    RecordingSleeper, ScriptedLedger,
};

fn request(receipt: &str) -> ReconcileRequest {
    ReconcileRequest {
        user_id: UserId::random(),
        ledger_identity: LedgerIdentity::new("0.0.77").expect("valid identity"),
        delta_amount: 5,
        receipt: ReceiptId::new(receipt).expect("valid receipt"),
    }
}

fn sync_with(
    ledger: Arc<dyn LedgerClient>,
    cache: Arc<InMemoryActivityCache>,
) -> Arc<ActivityCacheSync> {
    Arc::new(ActivityCacheSync::new(
        ActivitySyncPorts {
            ledger,
            cache,
            definitions: Arc::new(InMemoryChallengeDefinitions::new()),
            metrics: Arc::new(NoOpSyncMetrics),
        },
        Arc::new(MutableClock::at_epoch()),
        ActivitySyncConfig::default(),
    ))
}

fn worker_with(
    sync: Arc<ActivityCacheSync>,
    sleeper: Arc<RecordingSleeper>,
    config: ReconcileWorkerConfig,
) -> (ReconcileQueue, ReconcileWorker) {
    ReconcileWorker::with_runtime(
        sync,
        Arc::new(MutableClock::at_epoch()),
        ReconcileWorkerRuntime {
            sleeper,
            jitter: Arc::new(NoJitter),
        },
        config,
    )
}

#[rstest]
#[tokio::test]
async fn transient_failure_is_retried_until_success() {
    let mut ledger = MockLedgerClient::new();
    let mut sequence = Sequence::new();
    ledger
        .expect_get_total_accumulated()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_| Err(LedgerClientError::transport("reset")));
    ledger
        .expect_get_total_accumulated()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_| Ok(12));
    ledger.expect_get_definition_count().returning(|| Ok(0));

    let cache = Arc::new(InMemoryActivityCache::new());
    let sleeper = Arc::new(RecordingSleeper::default());
    let (_queue, worker) = worker_with(
        sync_with(Arc::new(ledger), cache.clone()),
        sleeper.clone(),
        ReconcileWorkerConfig::default(),
    );
    let request = request("receipt-1");

    let outcome = worker.process(&request).await.expect("second attempt succeeds");

    assert_eq!(outcome.total, 12);
    assert_eq!(cache.total(&request.user_id), Some(12));
    assert_eq!(sleeper.recorded(), vec![Duration::from_millis(200)]);
}

#[rstest]
#[tokio::test]
async fn non_retryable_failure_is_not_retried() {
    let ledger = Arc::new(ScriptedLedger::new());
    ledger.fail_total(Some(LedgerClientError::rejected("unknown account")));
    let sleeper = Arc::new(RecordingSleeper::default());
    let (_queue, worker) = worker_with(
        sync_with(ledger.clone(), Arc::new(InMemoryActivityCache::new())),
        sleeper.clone(),
        ReconcileWorkerConfig::default(),
    );

    let error = worker
        .process(&request("receipt-2"))
        .await
        .expect_err("rejected");

    assert_eq!(error.code(), ErrorCode::UpstreamRejected);
    assert_eq!(ledger.total_calls(), 1);
    assert!(sleeper.recorded().is_empty());
}

#[rstest]
#[case(ReconcileWorkerConfig::default(), 3, vec![200, 400])]
#[case(
    ReconcileWorkerConfig {
        max_attempts: 4,
        initial_backoff: Duration::from_secs(3),
        ..ReconcileWorkerConfig::default()
    },
    4,
    vec![3_000, 5_000, 5_000],
)]
#[case(
    ReconcileWorkerConfig {
        max_attempts: 0,
        ..ReconcileWorkerConfig::default()
    },
    1,
    vec![],
)]
#[tokio::test]
async fn retries_stop_after_max_attempts(
    #[case] config: ReconcileWorkerConfig,
    #[case] expected_calls: usize,
    #[case] expected_delays_ms: Vec<u64>,
) {
    let ledger = Arc::new(ScriptedLedger::new());
    ledger.fail_total(Some(LedgerClientError::timeout("slow")));
    let sleeper = Arc::new(RecordingSleeper::default());
    let (_queue, worker) = worker_with(
        sync_with(ledger.clone(), Arc::new(InMemoryActivityCache::new())),
        sleeper.clone(),
        config,
    );

    let error = worker
        .process(&request("receipt-3"))
        .await
        .expect_err("retries exhausted");

    assert!(error.is_retryable());
    assert_eq!(ledger.total_calls(), expected_calls);
    let expected: Vec<Duration> = expected_delays_ms
        .into_iter()
        .map(Duration::from_millis)
        .collect();
    assert_eq!(sleeper.recorded(), expected);
}

#[rstest]
#[tokio::test]
async fn full_queue_refuses_requests() {
    let sync = sync_with(
        Arc::new(ScriptedLedger::new()),
        Arc::new(InMemoryActivityCache::new()),
    );
    let (queue, _worker) = ReconcileWorker::new(
        sync,
        Arc::new(MutableClock::at_epoch()),
        ReconcileWorkerConfig {
            queue_capacity: 1,
            ..ReconcileWorkerConfig::default()
        },
    );

    queue.enqueue(request("receipt-4")).expect("first fits");
    let error = queue
        .enqueue(request("receipt-5"))
        .expect_err("second overflows");

    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
}

#[rstest]
#[tokio::test]
async fn stopped_worker_refuses_requests() {
    let sync = sync_with(
        Arc::new(ScriptedLedger::new()),
        Arc::new(InMemoryActivityCache::new()),
    );
    let (queue, worker) = ReconcileWorker::new(
        sync,
        Arc::new(MutableClock::at_epoch()),
        ReconcileWorkerConfig::default(),
    );
    drop(worker);

    let error = queue
        .enqueue(request("receipt-6"))
        .expect_err("worker gone");
    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
}

#[rstest]
#[tokio::test]
async fn run_drains_queue_then_stops() {
    let ledger = Arc::new(ScriptedLedger::new());
    let cache = Arc::new(InMemoryActivityCache::new());
    let (queue, worker) = worker_with(
        sync_with(ledger, cache.clone()),
        Arc::new(RecordingSleeper::default()),
        ReconcileWorkerConfig::default(),
    );
    let first = request("receipt-7");
    let second = request("receipt-8");
    queue.enqueue(first.clone()).expect("enqueue first");
    queue.enqueue(second.clone()).expect("enqueue second");
    drop(queue);

    worker.run().await;

    assert_eq!(cache.workouts(&first.user_id).len(), 1);
    assert_eq!(cache.workouts(&second.user_id).len(), 1);
}

#[rstest]
#[case(0)]
#[case(999_999_999)]
fn attempt_jitter_adds_at_most_a_quarter(#[case] nanos: u32) {
    let now = Utc
        .timestamp_opt(1_767_225_600, nanos)
        .single()
        .expect("valid time");
    let base = Duration::from_millis(400);

    for attempt in 1..=5 {
        let delay = AttemptJitter.jittered_delay(base, attempt, now);
        assert!(delay >= base);
        assert!(delay <= Duration::from_millis(500));
    }
}
