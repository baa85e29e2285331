//! Incrementally refreshed, filterable mirror of one log topic.
//!
//! States: `Uninitialized` until the first refresh attempt, then `Warm`
//! while the last successful refresh is younger than the TTL, `Stale`
//! otherwise. Reads never touch the network; only [`LogCache::refresh_cache`]
//! does, and concurrent refreshes collapse into the one in flight.
//!
//! The fetch cursor is the highest raw sequence ever returned by the log
//! source, including messages that failed to decode. Those messages are
//! dropped for good rather than retried on every refresh.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::ports::{LogClient, LogClientError, LogRefreshMetric, LogRefreshStatus, SyncMetrics};
use super::{Error, LogMessage, TopicId};

mod query;

pub use query::{AuthorCount, LogCacheStats, page_request};

/// Tuning for [`LogCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogCacheConfig {
    /// Age after which the mirror counts as stale.
    pub ttl: Duration,
    /// Messages kept in memory; the lowest sequences are evicted first.
    pub max_messages: usize,
    /// Authors listed in [`LogCacheStats::top_authors`].
    pub stats_top_n: usize,
}

impl Default for LogCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_messages: 10_000,
            stats_top_n: 10,
        }
    }
}

/// Lifecycle state of the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// No refresh has been attempted.
    Uninitialized,
    /// The last successful refresh is within the TTL.
    Warm,
    /// The TTL has elapsed, or no refresh has succeeded yet.
    Stale,
}

/// Summary of one refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Raw messages returned by the log source.
    pub fetched: usize,
    /// Messages added to the mirror.
    pub ingested: usize,
    /// Messages dropped because they failed to decode.
    pub decode_skipped: usize,
    /// Messages evicted to respect the size bound.
    pub evicted: usize,
    /// Cursor after the refresh.
    pub cursor: u64,
    /// Time the refresh completed.
    pub refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MirrorState {
    messages: BTreeMap<u64, LogMessage>,
    cursor: u64,
    last_refresh: Option<DateTime<Utc>>,
    initialized: bool,
    decode_skipped: u64,
}

#[derive(Debug, Default)]
struct RefreshSlot {
    generation: u64,
    last: Option<Result<RefreshOutcome, Error>>,
}

/// Whether a mirror last refreshed at `last_refresh` is expired at `now`.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use chrono::{TimeDelta, Utc};
/// use fitledger::domain::log_cache::is_expired_at;
///
/// let now = Utc::now();
/// let ttl = Duration::from_secs(300);
/// assert!(is_expired_at(None, now, ttl));
/// assert!(!is_expired_at(Some(now - TimeDelta::minutes(4)), now, ttl));
/// assert!(is_expired_at(Some(now - TimeDelta::minutes(6)), now, ttl));
/// ```
pub fn is_expired_at(last_refresh: Option<DateTime<Utc>>, now: DateTime<Utc>, ttl: Duration) -> bool {
    let Some(last_refresh) = last_refresh else {
        return true;
    };
    let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
    now.signed_duration_since(last_refresh) >= ttl
}

/// In-memory mirror of one topic.
pub struct LogCache {
    topic: TopicId,
    client: Arc<dyn LogClient>,
    metrics: Arc<dyn SyncMetrics>,
    clock: Arc<dyn Clock>,
    config: LogCacheConfig,
    state: RwLock<MirrorState>,
    refresh: Mutex<RefreshSlot>,
    generation: AtomicU64,
}

impl LogCache {
    /// Build an empty, uninitialised mirror.
    pub fn new(
        topic: TopicId,
        client: Arc<dyn LogClient>,
        metrics: Arc<dyn SyncMetrics>,
        clock: Arc<dyn Clock>,
        config: LogCacheConfig,
    ) -> Self {
        Self {
            topic,
            client,
            metrics,
            clock,
            config,
            state: RwLock::new(MirrorState::default()),
            refresh: Mutex::new(RefreshSlot::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Topic mirrored by this cache.
    pub fn topic(&self) -> TopicId {
        self.topic
    }

    /// Perform the first refresh unless one was already attempted.
    ///
    /// # Errors
    ///
    /// Returns the refresh error. The cache is then stale and empty, and
    /// later refreshes proceed as normal.
    pub async fn initialize(&self) -> Result<CacheStatus, Error> {
        if self.read_state()?.initialized {
            return self.status();
        }
        self.refresh_cache().await?;
        self.status()
    }

    /// Current lifecycle state.
    pub fn status(&self) -> Result<CacheStatus, Error> {
        let state = self.read_state()?;
        if !state.initialized {
            return Ok(CacheStatus::Uninitialized);
        }
        if is_expired_at(state.last_refresh, self.clock.utc(), self.config.ttl) {
            Ok(CacheStatus::Stale)
        } else {
            Ok(CacheStatus::Warm)
        }
    }

    /// Whether the TTL has elapsed since the last successful refresh.
    pub fn is_expired(&self) -> Result<bool, Error> {
        let state = self.read_state()?;
        Ok(is_expired_at(
            state.last_refresh,
            self.clock.utc(),
            self.config.ttl,
        ))
    }

    /// Time of the last successful refresh.
    pub fn last_refresh(&self) -> Result<Option<DateTime<Utc>>, Error> {
        Ok(self.read_state()?.last_refresh)
    }

    /// Highest raw sequence observed.
    pub fn cursor(&self) -> Result<u64, Error> {
        Ok(self.read_state()?.cursor)
    }

    /// Number of messages held.
    pub fn len(&self) -> Result<usize, Error> {
        Ok(self.read_state()?.messages.len())
    }

    /// Whether the mirror holds no messages.
    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.read_state()?.messages.is_empty())
    }

    /// Refresh only when not warm. Returns `None` when nothing was fetched.
    ///
    /// # Errors
    ///
    /// Propagates refresh errors.
    pub async fn refresh_if_stale(&self) -> Result<Option<RefreshOutcome>, Error> {
        if self.status()? == CacheStatus::Warm {
            return Ok(None);
        }
        self.refresh_cache().await.map(Some)
    }

    /// Fetch and merge messages newer than the cursor.
    ///
    /// Single-flight: a caller arriving while a refresh is running waits for
    /// it and receives its result instead of issuing a second fetch.
    ///
    /// # Errors
    ///
    /// Fetch failures propagate; the caller decides whether stale data is
    /// acceptable. Decode failures never fail the refresh.
    pub async fn refresh_cache(&self) -> Result<RefreshOutcome, Error> {
        let observed = self.generation.load(Ordering::Acquire);
        let mut slot = self.refresh.lock().await;
        if slot.generation != observed {
            if let Some(last) = &slot.last {
                return last.clone();
            }
        }

        let result = self.refresh_once().await;
        slot.generation = slot.generation.wrapping_add(1);
        slot.last = Some(result.clone());
        self.generation.store(slot.generation, Ordering::Release);
        result
    }

    async fn refresh_once(&self) -> Result<RefreshOutcome, Error> {
        let cursor = {
            let mut state = self.write_state()?;
            state.initialized = true;
            state.cursor
        };

        let batch = match self.client.fetch_since(self.topic, cursor).await {
            Ok(batch) => batch,
            Err(error) => {
                debug!(topic = %self.topic, cursor, %error, "log fetch failed");
                self.record_metric(LogRefreshStatus::Failed, 0, 0).await;
                return Err(map_log_error(error));
            }
        };

        let fetched = batch.len();
        let mut highest = cursor;
        let mut decoded = Vec::with_capacity(fetched);
        let mut decode_skipped = 0;
        for raw in &batch {
            highest = highest.max(raw.sequence);
            match self.client.decode(&raw.bytes) {
                Ok(payload) => decoded.push(LogMessage::from_raw(self.topic, raw, payload)),
                Err(error) => {
                    warn!(
                        topic = %self.topic,
                        sequence = raw.sequence,
                        %error,
                        "dropping undecodable log message"
                    );
                    decode_skipped += 1;
                }
            }
        }

        let refreshed_at = self.clock.utc();
        let (ingested, evicted, cursor) = {
            let mut state = self.write_state()?;
            let floor = state.cursor;
            let mut ingested = 0;
            for message in decoded {
                if message.sequence <= floor || state.messages.contains_key(&message.sequence) {
                    continue;
                }
                state.messages.insert(message.sequence, message);
                ingested += 1;
            }
            let mut evicted = 0;
            while state.messages.len() > self.config.max_messages {
                state.messages.pop_first();
                evicted += 1;
            }
            state.cursor = state.cursor.max(highest);
            state.last_refresh = Some(refreshed_at);
            state.decode_skipped = state
                .decode_skipped
                .saturating_add(u64::try_from(decode_skipped).unwrap_or(u64::MAX));
            (ingested, evicted, state.cursor)
        };

        self.record_metric(LogRefreshStatus::Succeeded, ingested, decode_skipped)
            .await;
        info!(
            topic = %self.topic,
            fetched,
            ingested,
            decode_skipped,
            evicted,
            cursor,
            "log cache refreshed"
        );

        Ok(RefreshOutcome {
            fetched,
            ingested,
            decode_skipped,
            evicted,
            cursor,
            refreshed_at,
        })
    }

    async fn record_metric(&self, status: LogRefreshStatus, ingested: usize, decode_skipped: usize) {
        // Metric writes are non-fatal.
        let _ = self
            .metrics
            .record_log_refresh(&LogRefreshMetric {
                status,
                ingested,
                decode_skipped,
            })
            .await;
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, MirrorState>, Error> {
        self.state
            .read()
            .map_err(|_| Error::internal("log cache state poisoned"))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, MirrorState>, Error> {
        self.state
            .write()
            .map_err(|_| Error::internal("log cache state poisoned"))
    }
}

fn map_log_error(error: LogClientError) -> Error {
    if error.is_transient() {
        Error::service_unavailable(format!("log source unavailable: {error}"))
    } else {
        Error::upstream_rejected(format!("log fetch failed: {error}"))
    }
}
