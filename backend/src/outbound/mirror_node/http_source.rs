//! Reqwest-backed mirror node log client.
//!
//! Reads topic messages through the mirror node REST API, following
//! `links.next` until the topic is drained or the page cap is reached. Each
//! payload travels base64-encoded and is decoded per message.
//!
//! A row with a malformed envelope is passed on with an empty payload, which
//! never decodes, so the cache cursor still moves past its sequence. Rows
//! without a sequence number are dropped.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode, Url};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::dto::{MessagesPageDto, TopicMessageDto};
use crate::domain::ports::{LogClient, LogClientError, MessageDecodeError};
use crate::domain::{MessagePayload, RawLogMessage, TopicId, decode_payload};

const DEFAULT_PAGE_LIMIT: u32 = 100;
const DEFAULT_MAX_PAGES: u32 = 50;

/// Paging limits for one `fetch_since` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorNodeConfig {
    /// Messages requested per page.
    pub page_limit: u32,
    /// Pages followed before returning what was collected.
    pub max_pages: u32,
}

impl Default for MirrorNodeConfig {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Log client backed by a mirror node REST endpoint.
pub struct MirrorNodeLogClient {
    client: Client,
    base: Url,
    config: MirrorNodeConfig,
}

impl MirrorNodeLogClient {
    /// Build a client with default paging.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::with_config(base, timeout, MirrorNodeConfig::default())
    }

    /// Build a client with explicit paging limits.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn with_config(
        base: Url,
        timeout: Duration,
        config: MirrorNodeConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            config: MirrorNodeConfig {
                page_limit: config.page_limit.max(1),
                max_pages: config.max_pages.max(1),
            },
        })
    }

    async fn fetch_page(&self, url: Url) -> Result<MessagesPageDto, LogClientError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }
        serde_json::from_slice(body.as_ref()).map_err(|error| {
            LogClientError::invalid_response(format!("invalid mirror node JSON: {error}"))
        })
    }
}

fn first_page_url(
    base: &Url,
    topic: TopicId,
    cursor: u64,
    page_limit: u32,
) -> Result<Url, LogClientError> {
    let mut url = base.clone();
    let topic = topic.to_string();
    url.path_segments_mut()
        .map_err(|()| LogClientError::rejected(format!("mirror node URL {base} cannot be a base")))?
        .pop_if_empty()
        .extend(["api", "v1", "topics", topic.as_str(), "messages"]);
    url.query_pairs_mut()
        .append_pair("sequencenumber", &format!("gt:{cursor}"))
        .append_pair("order", "asc")
        .append_pair("limit", &page_limit.to_string());
    Ok(url)
}

fn next_page_url(base: &Url, next: &str) -> Result<Url, LogClientError> {
    base.join(next)
        .map_err(|error| LogClientError::invalid_response(format!("invalid next link `{next}`: {error}")))
}

#[async_trait]
impl LogClient for MirrorNodeLogClient {
    async fn fetch_since(
        &self,
        topic: TopicId,
        cursor: u64,
    ) -> Result<Vec<RawLogMessage>, LogClientError> {
        let mut url = first_page_url(&self.base, topic, cursor, self.config.page_limit)?;
        let mut collected = Vec::new();

        for page_number in 1..=self.config.max_pages {
            let page = self.fetch_page(url).await?;
            collect_messages(topic, page.messages, &mut collected);
            match page.links.next {
                Some(next) if page_number < self.config.max_pages => {
                    url = next_page_url(&self.base, &next)?;
                }
                Some(_) => {
                    debug!(%topic, pages = page_number, "mirror node page cap reached");
                    break;
                }
                None => break,
            }
        }

        Ok(collected)
    }

    fn decode(&self, bytes: &[u8]) -> Result<MessagePayload, MessageDecodeError> {
        decode_base64_payload(bytes)
    }
}

fn collect_messages(
    topic: TopicId,
    messages: Vec<TopicMessageDto>,
    collected: &mut Vec<RawLogMessage>,
) {
    for message in messages {
        match message.into_raw() {
            Ok(raw) => collected.push(raw),
            Err(malformed) => {
                warn!(
                    %topic,
                    sequence = ?malformed.sequence,
                    reason = %malformed.reason,
                    "malformed mirror node message"
                );
                if let Some(sequence) = malformed.sequence {
                    collected.push(RawLogMessage {
                        sequence,
                        consensus_timestamp: DateTime::<Utc>::UNIX_EPOCH,
                        bytes: Vec::new(),
                    });
                }
            }
        }
    }
}

fn decode_base64_payload(bytes: &[u8]) -> Result<MessagePayload, MessageDecodeError> {
    let decoded = STANDARD
        .decode(bytes.trim_ascii())
        .map_err(|error| MessageDecodeError::encoding(format!("payload is not base64: {error}")))?;
    decode_payload(&decoded)
}

fn map_transport_error(error: reqwest::Error) -> LogClientError {
    if error.is_timeout() {
        LogClientError::timeout(error.to_string())
    } else {
        LogClientError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> LogClientError {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let preview: String = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(PREVIEW_CHAR_LIMIT)
        .collect();
    let message = format!("status {}: {preview}", status.as_u16());

    match status {
        StatusCode::TOO_MANY_REQUESTS => LogClientError::rate_limited(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => LogClientError::timeout(message),
        _ if status.is_client_error() => LogClientError::rejected(message),
        _ => LogClientError::transport(message),
    }
}
