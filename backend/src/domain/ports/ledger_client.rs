//! Driven port for querying and mutating ledger-resident state.
//!
//! The ledger is authoritative for totals, progress, and completion flags.
//! The reconciliation services only read from it, apart from
//! [`LedgerClient::submit_delta`], which callers use before requesting a
//! reconciliation.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::{ChallengeDefinition, ChallengeId, LedgerIdentity, ReceiptId};

define_port_error! {
    /// Errors surfaced by ledger adapters.
    pub enum LedgerClientError {
        /// The ledger could not be reached.
        Transport { message: String } =>
            "ledger transport failed: {message}",
        /// The ledger did not answer in time.
        Timeout { message: String } =>
            "ledger timeout: {message}",
        /// The ledger throttled the caller.
        RateLimited { message: String } =>
            "ledger rate limited request: {message}",
        /// The ledger refused the request.
        Rejected { message: String } =>
            "ledger rejected request: {message}",
        /// The ledger answered with an unreadable body.
        InvalidResponse { message: String } =>
            "ledger response invalid: {message}",
    }
    transient: [Transport, Timeout, RateLimited]
}

/// Receipt returned by a settled mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaReceipt {
    /// Ledger receipt id.
    pub receipt_id: ReceiptId,
}

/// Port for ledger queries and the delta mutation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Canonical accumulated total for an account.
    async fn get_total_accumulated(&self, identity: &LedgerIdentity)
    -> Result<u64, LedgerClientError>;

    /// Number of challenges defined on the ledger. Ids run `1..=count`.
    async fn get_definition_count(&self) -> Result<u64, LedgerClientError>;

    /// Definition of one challenge.
    async fn get_definition(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<ChallengeDefinition, LedgerClientError>;

    /// Progress of an account towards one challenge.
    async fn get_progress(
        &self,
        identity: &LedgerIdentity,
        challenge_id: ChallengeId,
    ) -> Result<u64, LedgerClientError>;

    /// Whether the ledger marks the challenge complete for the account.
    async fn is_completed(
        &self,
        identity: &LedgerIdentity,
        challenge_id: ChallengeId,
    ) -> Result<bool, LedgerClientError>;

    /// Submit an activity delta for an account.
    ///
    /// ```rust,ignore
    /// let receipt = ledger.submit_delta(&identity, 250).await?;
    /// queue.enqueue(ReconcileRequest {
    ///     user_id,
    ///     ledger_identity: identity,
    ///     delta_amount: 250,
    ///     receipt: receipt.receipt_id,
    /// })?;
    /// ```
    async fn submit_delta(
        &self,
        identity: &LedgerIdentity,
        amount: u64,
    ) -> Result<DeltaReceipt, LedgerClientError>;
}

/// Fixture ledger with no challenges and a zero total.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureLedgerClient;

#[async_trait]
impl LedgerClient for FixtureLedgerClient {
    async fn get_total_accumulated(
        &self,
        _identity: &LedgerIdentity,
    ) -> Result<u64, LedgerClientError> {
        Ok(0)
    }

    async fn get_definition_count(&self) -> Result<u64, LedgerClientError> {
        Ok(0)
    }

    async fn get_definition(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<ChallengeDefinition, LedgerClientError> {
        Err(LedgerClientError::rejected(format!(
            "challenge {challenge_id} does not exist"
        )))
    }

    async fn get_progress(
        &self,
        _identity: &LedgerIdentity,
        _challenge_id: ChallengeId,
    ) -> Result<u64, LedgerClientError> {
        Ok(0)
    }

    async fn is_completed(
        &self,
        _identity: &LedgerIdentity,
        _challenge_id: ChallengeId,
    ) -> Result<bool, LedgerClientError> {
        Ok(false)
    }

    async fn submit_delta(
        &self,
        _identity: &LedgerIdentity,
        _amount: u64,
    ) -> Result<DeltaReceipt, LedgerClientError> {
        Err(LedgerClientError::rejected("fixture ledger is read-only"))
    }
}
