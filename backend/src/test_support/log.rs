//! Scripted in-memory log topic.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use crate::domain::ports::{LogClient, LogClientError, MessageDecodeError};
use crate::domain::{MessageKind, MessagePayload, RawLogMessage, TopicId, decode_payload};

/// JSON payload bytes in the topic's wire shape.
pub fn encoded_payload(kind: MessageKind, author_id: &str, text: &str) -> Vec<u8> {
    serde_json::json!({
        "type": kind.as_str(),
        "authorId": author_id,
        "authorLabel": author_id.to_uppercase(),
        "text": text,
    })
    .to_string()
    .into_bytes()
}

/// Log double serving whatever the test appends.
#[derive(Default)]
pub struct ScriptedLogClient {
    messages: Mutex<Vec<RawLogMessage>>,
    cursors: Mutex<Vec<u64>>,
    failure: Mutex<Option<LogClientError>>,
    fetch_delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl ScriptedLogClient {
    /// Log with no messages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch, so concurrent refreshes overlap.
    pub fn with_fetch_delay(delay: Duration) -> Self {
        Self {
            fetch_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Consensus timestamp for `sequence`: one second apart from a fixed base.
    pub fn timestamp_for(sequence: u64) -> DateTime<Utc> {
        let base = match Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single() {
            Some(base) => base,
            None => panic!("fixed base time is valid"),
        };
        base + TimeDelta::seconds(i64::try_from(sequence).unwrap_or(i64::MAX))
    }

    /// Append a message with arbitrary payload bytes.
    pub fn push_raw(&self, sequence: u64, bytes: Vec<u8>) {
        self.lock_messages().push(RawLogMessage {
            sequence,
            consensus_timestamp: Self::timestamp_for(sequence),
            bytes,
        });
    }

    /// Append an encoded message.
    pub fn push(&self, sequence: u64, kind: MessageKind, author_id: &str, text: &str) {
        self.push_raw(sequence, encoded_payload(kind, author_id, text));
    }

    /// Append a message whose payload cannot be decoded.
    pub fn push_undecodable(&self, sequence: u64) {
        self.push_raw(sequence, b"{\"type\":\"unknown\"}".to_vec());
    }

    /// Fail fetches with `failure` until cleared with `None`.
    pub fn fail_with(&self, failure: Option<LogClientError>) {
        match self.failure.lock() {
            Ok(mut guard) => *guard = failure,
            Err(_) => panic!("failure mutex"),
        }
    }

    /// Number of fetches served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Cursors passed to each fetch, in call order.
    pub fn cursors(&self) -> Vec<u64> {
        match self.cursors.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => panic!("cursor mutex"),
        }
    }

    fn lock_messages(&self) -> std::sync::MutexGuard<'_, Vec<RawLogMessage>> {
        match self.messages.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("message mutex"),
        }
    }

    fn record_cursor(&self, cursor: u64) {
        match self.cursors.lock() {
            Ok(mut guard) => guard.push(cursor),
            Err(_) => panic!("cursor mutex"),
        }
    }

    fn current_failure(&self) -> Option<LogClientError> {
        match self.failure.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => panic!("failure mutex"),
        }
    }
}

#[async_trait]
impl LogClient for ScriptedLogClient {
    async fn fetch_since(
        &self,
        _topic: TopicId,
        cursor: u64,
    ) -> Result<Vec<RawLogMessage>, LogClientError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.record_cursor(cursor);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.current_failure() {
            return Err(failure);
        }
        let mut batch: Vec<RawLogMessage> = self
            .lock_messages()
            .iter()
            .filter(|message| message.sequence > cursor)
            .cloned()
            .collect();
        batch.sort_by_key(|message| message.sequence);
        Ok(batch)
    }

    fn decode(&self, bytes: &[u8]) -> Result<MessagePayload, MessageDecodeError> {
        decode_payload(bytes)
    }
}
