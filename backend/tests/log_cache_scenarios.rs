//! Log mirror behaviour through the public API: expiry, decode loss, and
//! filter consistency across pages.

use std::sync::Arc;
use std::time::Duration;

use fitledger::domain::ports::NoOpSyncMetrics;
use fitledger::domain::{
    CacheStatus, LogCache, LogCacheConfig, MessageFilter, MessageKind, TopicId, page_request,
};
use fitledger::test_support::{MutableClock, ScriptedLogClient};
use rstest::{fixture, rstest};

struct Mirror {
    log: Arc<ScriptedLogClient>,
    clock: Arc<MutableClock>,
    cache: LogCache,
}

#[fixture]
fn mirror() -> Mirror {
    let log = Arc::new(ScriptedLogClient::new());
    let clock = Arc::new(MutableClock::at_epoch());
    let cache = LogCache::new(
        TopicId::from_parts(0, 0, 4242),
        log.clone(),
        Arc::new(NoOpSyncMetrics),
        clock.clone(),
        LogCacheConfig {
            ttl: Duration::from_secs(5 * 60),
            ..LogCacheConfig::default()
        },
    );
    Mirror { log, clock, cache }
}

#[rstest]
#[tokio::test]
async fn mirror_expires_after_the_ttl(mirror: Mirror) {
    mirror.cache.refresh_cache().await.expect("refresh succeeds");
    assert!(!mirror.cache.is_expired().expect("expiry readable"));

    mirror.clock.advance_seconds(6 * 60);

    assert!(mirror.cache.is_expired().expect("expiry readable"));
    assert_eq!(mirror.cache.status().expect("status"), CacheStatus::Stale);
}

#[rstest]
#[tokio::test]
async fn empty_refresh_advances_refresh_time_only(mirror: Mirror) {
    mirror
        .log
        .push(1, MessageKind::Chat, "0.0.7", "hello");
    mirror.cache.refresh_cache().await.expect("first refresh");
    let first = mirror.cache.last_refresh().expect("readable");

    mirror.clock.advance_seconds(30);
    let outcome = mirror.cache.refresh_cache().await.expect("second refresh");

    assert_eq!(outcome.ingested, 0);
    assert_eq!(mirror.cache.len().expect("len"), 1);
    assert!(mirror.cache.last_refresh().expect("readable") > first);
}

#[rstest]
#[tokio::test]
async fn undecodable_message_is_never_requested_again(mirror: Mirror) {
    for sequence in 37..=46 {
        if sequence == 42 {
            mirror.log.push_undecodable(sequence);
        } else {
            mirror
                .log
                .push(sequence, MessageKind::Workout, "0.0.9", "ran 5k");
        }
    }

    let outcome = mirror.cache.refresh_cache().await.expect("refresh succeeds");
    mirror.cache.refresh_cache().await.expect("next refresh");

    assert_eq!(outcome.ingested, 9);
    assert_eq!(outcome.decode_skipped, 1);
    assert_eq!(mirror.log.cursors(), vec![0, 46]);
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[case(50)]
#[tokio::test]
async fn author_filter_total_is_stable_across_pages(mirror: Mirror, #[case] limit: usize) {
    for sequence in 1..=9 {
        let author = if sequence % 3 == 0 { "0.0.3" } else { "0.0.4" };
        mirror
            .log
            .push(sequence, MessageKind::Chat, author, "message");
    }
    mirror.cache.refresh_cache().await.expect("refresh succeeds");
    let filter = MessageFilter::by_author("0.0.3");

    let mut offset = 0;
    let mut seen = Vec::new();
    loop {
        let request = page_request(Some(limit), Some(offset)).expect("valid page");
        let page = mirror
            .cache
            .get_messages(&filter, request)
            .expect("query succeeds");
        assert_eq!(page.total, 3);
        assert!(page.data.iter().all(|m| m.payload.author_id == "0.0.3"));
        seen.extend(page.data.iter().map(|m| m.sequence));
        if !page.has_more {
            break;
        }
        offset += limit;
    }

    assert_eq!(seen, vec![9, 6, 3]);
}

#[rstest]
#[tokio::test]
async fn reads_never_touch_the_log(mirror: Mirror) {
    mirror
        .log
        .push(1, MessageKind::Announcement, "0.0.1", "welcome");
    mirror.cache.refresh_cache().await.expect("refresh succeeds");

    let request = page_request(None, None).expect("default page");
    mirror
        .cache
        .get_messages(&MessageFilter::default(), request)
        .expect("query succeeds");
    mirror.cache.get_stats().expect("stats");

    assert_eq!(mirror.log.fetch_count(), 1);
}

#[rstest]
#[tokio::test]
async fn empty_payload_at_the_tail_still_moves_the_cursor(mirror: Mirror) {
    mirror
        .log
        .push(1, MessageKind::Chat, "0.0.7", "hello");
    mirror.log.push_raw(2, Vec::new());

    let outcome = mirror.cache.refresh_cache().await.expect("refresh succeeds");
    mirror.cache.refresh_cache().await.expect("next refresh");

    assert_eq!(outcome.ingested, 1);
    assert_eq!(outcome.decode_skipped, 1);
    assert_eq!(mirror.cache.cursor().expect("cursor"), 2);
    assert_eq!(mirror.log.cursors(), vec![0, 2]);
}
