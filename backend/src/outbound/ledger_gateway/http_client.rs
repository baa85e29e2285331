//! Reqwest-backed ledger gateway client.
//!
//! Owns transport details only: URL building, timeouts, HTTP status mapping,
//! and JSON decoding.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::dto::{
    ChallengeDto, CompletedDto, CountDto, DeltaReceiptDto, DeltaRequestDto, ProgressDto, TotalDto,
};
use crate::domain::ports::{DeltaReceipt, LedgerClient, LedgerClientError};
use crate::domain::{ChallengeDefinition, ChallengeId, LedgerIdentity};

const USER_AGENT: &str = concat!("fitledger/", env!("CARGO_PKG_VERSION"));

/// Ledger client that talks to one gateway base URL.
pub struct LedgerGatewayClient {
    client: Client,
    base: Url,
}

impl LedgerGatewayClient {
    /// Build a client with an explicit per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, LedgerClientError> {
        endpoint(&self.base, segments)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, LedgerClientError> {
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            let error = map_status_error(status, body.as_ref());
            debug!(%status, %error, "ledger gateway returned an error status");
            return Err(error);
        }
        serde_json::from_slice(body.as_ref()).map_err(|error| {
            LedgerClientError::invalid_response(format!("invalid gateway JSON: {error}"))
        })
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, LedgerClientError> {
        let url = self.endpoint(segments)?;
        self.fetch(self.client.get(url)).await
    }
}

fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, LedgerClientError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| LedgerClientError::rejected(format!("gateway URL {base} cannot be a base")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait]
impl LedgerClient for LedgerGatewayClient {
    async fn get_total_accumulated(
        &self,
        identity: &LedgerIdentity,
    ) -> Result<u64, LedgerClientError> {
        let dto: TotalDto = self.get(&["accounts", identity.as_str(), "total"]).await?;
        Ok(dto.total)
    }

    async fn get_definition_count(&self) -> Result<u64, LedgerClientError> {
        let dto: CountDto = self.get(&["challenges", "count"]).await?;
        Ok(dto.count)
    }

    async fn get_definition(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<ChallengeDefinition, LedgerClientError> {
        let id = challenge_id.to_string();
        let dto: ChallengeDto = self.get(&["challenges", id.as_str()]).await?;
        dto.into_domain()
            .map_err(LedgerClientError::invalid_response)
    }

    async fn get_progress(
        &self,
        identity: &LedgerIdentity,
        challenge_id: ChallengeId,
    ) -> Result<u64, LedgerClientError> {
        let id = challenge_id.to_string();
        let dto: ProgressDto = self
            .get(&["accounts", identity.as_str(), "challenges", id.as_str(), "progress"])
            .await?;
        Ok(dto.progress)
    }

    async fn is_completed(
        &self,
        identity: &LedgerIdentity,
        challenge_id: ChallengeId,
    ) -> Result<bool, LedgerClientError> {
        let id = challenge_id.to_string();
        let dto: CompletedDto = self
            .get(&["accounts", identity.as_str(), "challenges", id.as_str(), "completed"])
            .await?;
        Ok(dto.completed)
    }

    async fn submit_delta(
        &self,
        identity: &LedgerIdentity,
        amount: u64,
    ) -> Result<DeltaReceipt, LedgerClientError> {
        let url = self.endpoint(&["accounts", identity.as_str(), "deltas"])?;
        let dto: DeltaReceiptDto = self
            .fetch(self.client.post(url).json(&DeltaRequestDto { amount }))
            .await?;
        let receipt_id = dto
            .into_domain()
            .map_err(LedgerClientError::invalid_response)?;
        Ok(DeltaReceipt { receipt_id })
    }
}

fn map_transport_error(error: reqwest::Error) -> LedgerClientError {
    if error.is_timeout() {
        LedgerClientError::timeout(error.to_string())
    } else {
        LedgerClientError::transport(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> LedgerClientError {
    let preview = body_preview(body);
    let message = if preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {preview}", status.as_u16())
    };

    match status {
        StatusCode::TOO_MANY_REQUESTS => LedgerClientError::rate_limited(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            LedgerClientError::timeout(message)
        }
        _ if status.is_client_error() => LedgerClientError::rejected(message),
        _ => LedgerClientError::transport(message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview: String = compact.chars().take(PREVIEW_CHAR_LIMIT).collect();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
