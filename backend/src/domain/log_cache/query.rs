//! Local read paths over the mirror. Nothing here performs I/O.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use pagination::{Page, PageRequest, PageRequestError};
use serde::Serialize;

use super::{CacheStatus, LogCache, is_expired_at};
use crate::domain::{Error, LogMessage, MessageFilter, MessageKind};

/// Message count for one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorCount {
    /// Author identity.
    pub author_id: String,
    /// Most recent label seen for the author.
    pub author_label: String,
    /// Messages held for the author.
    pub count: usize,
}

/// Aggregate view of the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogCacheStats {
    /// Messages held.
    pub total_messages: usize,
    /// Messages held per kind; every kind is present.
    pub by_kind: BTreeMap<MessageKind, usize>,
    /// Most active authors, by count then author id.
    pub top_authors: Vec<AuthorCount>,
    /// Lifecycle state.
    pub status: CacheStatus,
    /// Whether the TTL has elapsed.
    pub is_expired: bool,
    /// Time of the last successful refresh.
    pub last_refresh: Option<DateTime<Utc>>,
    /// Highest raw sequence observed.
    pub cursor: u64,
    /// Messages dropped because they failed to decode, since start-up.
    pub decode_skipped: u64,
}

/// Validate caller-supplied pagination.
///
/// # Errors
///
/// Returns [`crate::domain::ErrorCode::InvalidRequest`] for a zero limit or a
/// limit above [`PageRequest::MAX_LIMIT`].
pub fn page_request(limit: Option<usize>, offset: Option<usize>) -> Result<PageRequest, Error> {
    PageRequest::new(limit, offset).map_err(|error| {
        let details = match error {
            PageRequestError::ZeroLimit => serde_json::json!({ "field": "limit", "min": 1 }),
            PageRequestError::LimitTooLarge { max, .. } => {
                serde_json::json!({ "field": "limit", "max": max })
            }
        };
        Error::invalid_request(error.to_string()).with_details(details)
    })
}

impl LogCache {
    /// Filter, order newest first, and paginate the mirror.
    ///
    /// Ordering is by consensus timestamp descending, ties broken by
    /// sequence descending. `total` counts every match before pagination.
    ///
    /// # Errors
    ///
    /// Returns an invalid-request error when `from` is after `to`.
    pub fn get_messages(
        &self,
        filter: &MessageFilter,
        page: PageRequest,
    ) -> Result<Page<LogMessage>, Error> {
        if !filter.has_valid_range() {
            return Err(Error::invalid_request("`from` must not be after `to`"));
        }
        let state = self.read_state()?;
        let mut matches: Vec<&LogMessage> = state
            .messages
            .values()
            .filter(|message| filter.matches(message))
            .collect();
        matches.sort_by(|left, right| {
            right
                .consensus_timestamp
                .cmp(&left.consensus_timestamp)
                .then_with(|| right.sequence.cmp(&left.sequence))
        });
        Ok(Page::from_items(matches, page).map(LogMessage::clone))
    }

    /// Counts by kind and author plus freshness metadata.
    pub fn get_stats(&self) -> Result<LogCacheStats, Error> {
        let state = self.read_state()?;
        let now = self.clock.utc();

        let mut by_kind: BTreeMap<MessageKind, usize> =
            MessageKind::ALL.iter().map(|kind| (*kind, 0)).collect();
        let mut authors: HashMap<&str, (usize, &str, u64)> = HashMap::new();
        for message in state.messages.values() {
            *by_kind.entry(message.payload.kind).or_insert(0) += 1;
            let entry = authors
                .entry(message.payload.author_id.as_str())
                .or_insert((0, message.payload.author_label.as_str(), message.sequence));
            entry.0 += 1;
            if message.sequence >= entry.2 {
                entry.1 = message.payload.author_label.as_str();
                entry.2 = message.sequence;
            }
        }

        let mut top_authors: Vec<AuthorCount> = authors
            .into_iter()
            .map(|(author_id, (count, label, _))| AuthorCount {
                author_id: author_id.to_owned(),
                author_label: label.to_owned(),
                count,
            })
            .collect();
        top_authors.sort_by(|left, right| {
            right
                .count
                .cmp(&left.count)
                .then_with(|| left.author_id.cmp(&right.author_id))
        });
        top_authors.truncate(self.config.stats_top_n);

        let is_expired = is_expired_at(state.last_refresh, now, self.config.ttl);
        let status = if !state.initialized {
            CacheStatus::Uninitialized
        } else if is_expired {
            CacheStatus::Stale
        } else {
            CacheStatus::Warm
        };

        Ok(LogCacheStats {
            total_messages: state.messages.len(),
            by_kind,
            top_authors,
            status,
            is_expired,
            last_refresh: state.last_refresh,
            cursor: state.cursor,
            decode_skipped: state.decode_skipped,
        })
    }
}
