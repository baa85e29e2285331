//! Log topic messages as held by the local mirror.
//!
//! A [`RawLogMessage`] is what the log source returns; decoding it yields a
//! [`MessagePayload`] and, together with the ordering metadata, a
//! [`LogMessage`]. Messages are immutable once observed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TopicId;

mod codec;
mod filter;

pub use codec::decode_payload;
pub use filter::MessageFilter;

/// Category of a decoded log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Free-form chat line.
    Chat,
    /// Workout announcement posted after a mutation.
    Workout,
    /// Challenge completion announcement.
    Achievement,
    /// Operator broadcast.
    Announcement,
}

impl MessageKind {
    /// Every kind, in display order.
    pub const ALL: [Self; 4] = [
        Self::Chat,
        Self::Workout,
        Self::Achievement,
        Self::Announcement,
    ];

    /// Stable wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Workout => "workout",
            Self::Achievement => "achievement",
            Self::Announcement => "announcement",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoded message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Message category.
    pub kind: MessageKind,
    /// Stable author identity.
    pub author_id: String,
    /// Display label of the author at posting time.
    pub author_label: String,
    /// Message text.
    pub text: String,
    /// Timestamp claimed by the posting client, if any.
    pub client_timestamp: Option<DateTime<Utc>>,
}

/// Undecoded message as returned by the log source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogMessage {
    /// Position in the topic; strictly increasing.
    pub sequence: u64,
    /// Consensus timestamp assigned by the log.
    pub consensus_timestamp: DateTime<Utc>,
    /// Opaque encoded payload.
    pub bytes: Vec<u8>,
}

/// Decoded message held by the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    /// Topic the message belongs to.
    pub topic: TopicId,
    /// Position in the topic.
    pub sequence: u64,
    /// Consensus timestamp assigned by the log.
    pub consensus_timestamp: DateTime<Utc>,
    /// Decoded body.
    pub payload: MessagePayload,
}

impl LogMessage {
    /// Combine a raw message with its decoded payload.
    pub fn from_raw(topic: TopicId, raw: &RawLogMessage, payload: MessagePayload) -> Self {
        Self {
            topic,
            sequence: raw.sequence,
            consensus_timestamp: raw.consensus_timestamp,
            payload,
        }
    }
}
