//! Optional, AND-combined filters over mirrored log messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{LogMessage, MessageKind};

/// Filter applied to mirrored messages. Unset fields match everything.
///
/// The time range is inclusive at both ends and compares against the
/// consensus timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFilter {
    /// Earliest consensus timestamp to include.
    pub from: Option<DateTime<Utc>>,
    /// Latest consensus timestamp to include.
    pub to: Option<DateTime<Utc>>,
    /// Exact author identity.
    pub author_id: Option<String>,
    /// Message category.
    pub kind: Option<MessageKind>,
}

impl MessageFilter {
    /// Restrict to one author.
    pub fn by_author(author_id: impl Into<String>) -> Self {
        Self {
            author_id: Some(author_id.into()),
            ..Self::default()
        }
    }

    /// Whether the range bounds are ordered.
    pub fn has_valid_range(&self) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        }
    }

    /// Whether `message` satisfies every set criterion.
    pub fn matches(&self, message: &LogMessage) -> bool {
        let timestamp = message.consensus_timestamp;
        self.from.is_none_or(|from| timestamp >= from)
            && self.to.is_none_or(|to| timestamp <= to)
            && self
                .author_id
                .as_deref()
                .is_none_or(|author| message.payload.author_id == author)
            && self.kind.is_none_or(|kind| message.payload.kind == kind)
    }
}
