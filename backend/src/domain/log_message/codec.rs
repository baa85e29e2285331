//! JSON decoding for log payloads.
//!
//! Payloads are internally tagged by `type`. Anything that does not match one
//! of the known shapes is a [`MessageDecodeError`]; no field is read
//! optimistically.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{MessageKind, MessagePayload};
use crate::domain::ports::MessageDecodeError;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PayloadDto {
    Chat(BodyDto),
    Workout(BodyDto),
    Achievement(BodyDto),
    Announcement(BodyDto),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BodyDto {
    author_id: String,
    author_label: String,
    text: String,
    #[serde(default)]
    timestamp: Option<i64>,
}

impl PayloadDto {
    fn into_parts(self) -> (MessageKind, BodyDto) {
        match self {
            Self::Chat(body) => (MessageKind::Chat, body),
            Self::Workout(body) => (MessageKind::Workout, body),
            Self::Achievement(body) => (MessageKind::Achievement, body),
            Self::Announcement(body) => (MessageKind::Announcement, body),
        }
    }
}

/// Decode a UTF-8 JSON payload into a [`MessagePayload`].
///
/// # Examples
/// ```
/// use fitledger::domain::{MessageKind, decode_payload};
///
/// let payload = decode_payload(
///     br#"{"type":"chat","authorId":"0.0.7","authorLabel":"Ana","text":"hi"}"#,
/// )?;
/// assert_eq!(payload.kind, MessageKind::Chat);
/// assert!(payload.client_timestamp.is_none());
/// # Ok::<(), fitledger::domain::ports::MessageDecodeError>(())
/// ```
pub fn decode_payload(bytes: &[u8]) -> Result<MessagePayload, MessageDecodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|error| MessageDecodeError::encoding(format!("payload is not UTF-8: {error}")))?;
    let dto: PayloadDto = serde_json::from_str(text)
        .map_err(|error| MessageDecodeError::schema(error.to_string()))?;
    let (kind, body) = dto.into_parts();

    let author_id = body.author_id.trim();
    if author_id.is_empty() {
        return Err(MessageDecodeError::empty_author());
    }

    let client_timestamp = body
        .timestamp
        .map(|millis| {
            DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
                MessageDecodeError::schema(format!("timestamp {millis} is out of range"))
            })
        })
        .transpose()?;

    Ok(MessagePayload {
        kind,
        author_id: author_id.to_owned(),
        author_label: body.author_label,
        text: body.text,
        client_timestamp,
    })
}
