//! Mirror node REST response shapes.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::RawLogMessage;

#[derive(Debug, Deserialize)]
pub(super) struct MessagesPageDto {
    #[serde(default)]
    pub(super) messages: Vec<TopicMessageDto>,
    #[serde(default)]
    pub(super) links: LinksDto,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct LinksDto {
    pub(super) next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct TopicMessageDto {
    #[serde(default)]
    consensus_timestamp: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    sequence_number: Option<u64>,
}

/// A message row that cannot be turned into a [`RawLogMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct MalformedMessage {
    /// Sequence of the row, when the envelope carried one.
    pub(super) sequence: Option<u64>,
    pub(super) reason: String,
}

impl TopicMessageDto {
    pub(super) fn into_raw(self) -> Result<RawLogMessage, MalformedMessage> {
        let sequence = self.sequence_number;
        let malformed = |reason: String| MalformedMessage { sequence, reason };
        let Some(sequence_number) = sequence else {
            return Err(malformed("missing sequence_number".to_owned()));
        };
        let raw_timestamp = self
            .consensus_timestamp
            .ok_or_else(|| malformed("missing consensus_timestamp".to_owned()))?;
        let consensus_timestamp = parse_consensus_timestamp(&raw_timestamp).map_err(malformed)?;
        let message = self
            .message
            .ok_or_else(|| malformed("missing message".to_owned()))?;
        Ok(RawLogMessage {
            sequence: sequence_number,
            consensus_timestamp,
            bytes: message.into_bytes(),
        })
    }
}

/// Parse a `seconds.nanos` consensus timestamp.
///
/// The fractional part may be shorter than nine digits and is right-padded.
pub(super) fn parse_consensus_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let invalid = || format!("invalid consensus timestamp `{raw}`");
    let (secs, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    if secs.is_empty()
        || fraction.len() > 9
        || !secs.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }
    let secs: i64 = secs.parse().map_err(|_| invalid())?;
    let nanos: u32 = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<9}").parse().map_err(|_| invalid())?
    };
    DateTime::<Utc>::from_timestamp(secs, nanos).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1700000000.123456789", 1_700_000_000, 123_456_789)]
    #[case("1700000000.5", 1_700_000_000, 500_000_000)]
    #[case("1700000000", 1_700_000_000, 0)]
    fn parses_consensus_timestamps(#[case] raw: &str, #[case] secs: i64, #[case] nanos: u32) {
        let parsed = parse_consensus_timestamp(raw).expect("valid timestamp");
        assert_eq!(parsed.timestamp(), secs);
        assert_eq!(parsed.timestamp_subsec_nanos(), nanos);
    }

    #[rstest]
    #[case("")]
    #[case(".5")]
    #[case("abc.def")]
    #[case("1700000000.1234567890")]
    #[case("-1.0")]
    fn rejects_malformed_timestamps(#[case] raw: &str) {
        assert!(parse_consensus_timestamp(raw).is_err());
    }

    #[rstest]
    fn page_without_links_has_no_next() {
        let page: MessagesPageDto = serde_json::from_str(
            r#"{"messages":[{"consensus_timestamp":"1.0","message":"e30=","sequence_number":1}]}"#,
        )
        .expect("page json");
        assert!(page.links.next.is_none());
        let raw = page
            .messages
            .into_iter()
            .next()
            .expect("one message")
            .into_raw()
            .expect("raw message");
        assert_eq!(raw.sequence, 1);
        assert_eq!(raw.bytes, b"e30=".to_vec());
    }

    #[rstest]
    #[case::bad_timestamp(
        r#"{"consensus_timestamp":"bogus","message":"e30=","sequence_number":5}"#,
        Some(5)
    )]
    #[case::missing_message(r#"{"consensus_timestamp":"1.0","sequence_number":6}"#, Some(6))]
    #[case::missing_sequence(r#"{"consensus_timestamp":"1.0","message":"e30="}"#, None)]
    fn malformed_rows_keep_their_sequence(#[case] json: &str, #[case] sequence: Option<u64>) {
        let row: TopicMessageDto = serde_json::from_str(json).expect("row json");
        let malformed = row.into_raw().expect_err("row is malformed");
        assert_eq!(malformed.sequence, sequence);
    }
}
