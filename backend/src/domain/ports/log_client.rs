//! Driven port for reading an append-only log topic.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::{MessagePayload, RawLogMessage, TopicId};

define_port_error! {
    /// Errors surfaced while fetching from the log source.
    pub enum LogClientError {
        /// The log source could not be reached.
        Transport { message: String } =>
            "log transport failed: {message}",
        /// The log source did not answer in time.
        Timeout { message: String } =>
            "log timeout: {message}",
        /// The log source throttled the caller.
        RateLimited { message: String } =>
            "log source rate limited request: {message}",
        /// The log source refused the request.
        Rejected { message: String } =>
            "log source rejected request: {message}",
        /// The batch envelope could not be read.
        InvalidResponse { message: String } =>
            "log response invalid: {message}",
    }
    transient: [Transport, Timeout, RateLimited]
}

define_port_error! {
    /// Errors raised while decoding one message payload.
    ///
    /// Always scoped to a single message; never aborts a batch.
    pub enum MessageDecodeError {
        /// Bytes were not valid base64 or UTF-8.
        Encoding { message: String } =>
            "payload encoding invalid: {message}",
        /// The JSON did not match a known payload shape.
        Schema { message: String } =>
            "payload schema invalid: {message}",
        /// The payload carried a blank author identity.
        EmptyAuthor => "payload author must not be empty",
    }
}

/// Port for incremental reads of a log topic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogClient: Send + Sync {
    /// Fetch messages with a sequence strictly greater than `cursor`, in
    /// ascending order.
    async fn fetch_since(
        &self,
        topic: TopicId,
        cursor: u64,
    ) -> Result<Vec<RawLogMessage>, LogClientError>;

    /// Decode one raw payload.
    fn decode(&self, bytes: &[u8]) -> Result<MessagePayload, MessageDecodeError>;
}

/// Fixture log source with an empty topic.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureLogClient;

#[async_trait]
impl LogClient for FixtureLogClient {
    async fn fetch_since(
        &self,
        _topic: TopicId,
        _cursor: u64,
    ) -> Result<Vec<RawLogMessage>, LogClientError> {
        Ok(Vec::new())
    }

    fn decode(&self, bytes: &[u8]) -> Result<MessagePayload, MessageDecodeError> {
        crate::domain::decode_payload(bytes)
    }
}
