//! Scripted in-memory ledger.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::domain::ports::{DeltaReceipt, LedgerClient, LedgerClientError};
use crate::domain::{ChallengeDefinition, ChallengeId, LedgerIdentity, ReceiptId};

#[derive(Default)]
struct LedgerState {
    totals: HashMap<String, u64>,
    definitions: BTreeMap<ChallengeId, ChallengeDefinition>,
    progress: HashMap<(String, ChallengeId), (u64, bool)>,
    total_failure: Option<LedgerClientError>,
    count_failure: Option<LedgerClientError>,
    count_override: Option<u64>,
    challenge_failures: HashMap<ChallengeId, LedgerClientError>,
    definition_failures: HashMap<ChallengeId, LedgerClientError>,
    receipts_issued: u64,
}

/// Ledger double whose answers are set by the test.
#[derive(Default)]
pub struct ScriptedLedger {
    state: Mutex<LedgerState>,
    total_calls: AtomicUsize,
}

impl ScriptedLedger {
    /// Empty ledger: zero totals and no challenges.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the canonical total for an account.
    pub fn set_total(&self, identity: &LedgerIdentity, total: u64) {
        self.lock().totals.insert(identity.as_str().to_owned(), total);
    }

    /// Define a challenge; the reported count follows the highest id.
    pub fn add_definition(&self, definition: ChallengeDefinition) {
        self.lock().definitions.insert(definition.id, definition);
    }

    /// Set progress and completion for an account and challenge.
    pub fn set_progress(
        &self,
        identity: &LedgerIdentity,
        challenge_id: ChallengeId,
        progress: u64,
        completed: bool,
    ) {
        self.lock().progress.insert(
            (identity.as_str().to_owned(), challenge_id),
            (progress, completed),
        );
    }

    /// Fail total queries with `failure` until cleared with `None`.
    pub fn fail_total(&self, failure: Option<LedgerClientError>) {
        self.lock().total_failure = failure;
    }

    /// Fail count queries with `failure` until cleared with `None`.
    pub fn fail_count(&self, failure: Option<LedgerClientError>) {
        self.lock().count_failure = failure;
    }

    /// Fail progress and completion queries for one challenge.
    pub fn fail_challenge(&self, challenge_id: ChallengeId, failure: Option<LedgerClientError>) {
        let mut state = self.lock();
        match failure {
            Some(failure) => state.challenge_failures.insert(challenge_id, failure),
            None => state.challenge_failures.remove(&challenge_id),
        };
    }

    /// Fail definition lookups for one challenge.
    pub fn fail_definition(&self, challenge_id: ChallengeId, failure: Option<LedgerClientError>) {
        let mut state = self.lock();
        match failure {
            Some(failure) => state.definition_failures.insert(challenge_id, failure),
            None => state.definition_failures.remove(&challenge_id),
        };
    }

    /// Report `count` instead of the highest defined id.
    pub fn override_count(&self, count: Option<u64>) {
        self.lock().count_override = count;
    }

    /// Number of total queries served so far.
    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("ledger mutex"),
        }
    }

    fn challenge_state(
        &self,
        identity: &LedgerIdentity,
        challenge_id: ChallengeId,
    ) -> Result<(u64, bool), LedgerClientError> {
        let state = self.lock();
        if let Some(failure) = state.challenge_failures.get(&challenge_id) {
            return Err(failure.clone());
        }
        Ok(state
            .progress
            .get(&(identity.as_str().to_owned(), challenge_id))
            .copied()
            .unwrap_or((0, false)))
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn get_total_accumulated(
        &self,
        identity: &LedgerIdentity,
    ) -> Result<u64, LedgerClientError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if let Some(failure) = &state.total_failure {
            return Err(failure.clone());
        }
        Ok(state.totals.get(identity.as_str()).copied().unwrap_or(0))
    }

    async fn get_definition_count(&self) -> Result<u64, LedgerClientError> {
        let state = self.lock();
        if let Some(failure) = &state.count_failure {
            return Err(failure.clone());
        }
        if let Some(count) = state.count_override {
            return Ok(count);
        }
        Ok(state
            .definitions
            .keys()
            .next_back()
            .map_or(0, |id| id.get()))
    }

    async fn get_definition(
        &self,
        challenge_id: ChallengeId,
    ) -> Result<ChallengeDefinition, LedgerClientError> {
        let state = self.lock();
        if let Some(failure) = state.definition_failures.get(&challenge_id) {
            return Err(failure.clone());
        }
        state
            .definitions
            .get(&challenge_id)
            .cloned()
            .ok_or_else(|| LedgerClientError::rejected(format!("unknown challenge {challenge_id}")))
    }

    async fn get_progress(
        &self,
        identity: &LedgerIdentity,
        challenge_id: ChallengeId,
    ) -> Result<u64, LedgerClientError> {
        self.challenge_state(identity, challenge_id)
            .map(|(progress, _)| progress)
    }

    async fn is_completed(
        &self,
        identity: &LedgerIdentity,
        challenge_id: ChallengeId,
    ) -> Result<bool, LedgerClientError> {
        self.challenge_state(identity, challenge_id)
            .map(|(_, completed)| completed)
    }

    async fn submit_delta(
        &self,
        identity: &LedgerIdentity,
        amount: u64,
    ) -> Result<DeltaReceipt, LedgerClientError> {
        let mut state = self.lock();
        let total = state.totals.entry(identity.as_str().to_owned()).or_insert(0);
        *total = total.saturating_add(amount);
        state.receipts_issued += 1;
        let receipt_id = ReceiptId::new(format!("receipt-{}", state.receipts_issued))
            .map_err(|error| LedgerClientError::invalid_response(error.to_string()))?;
        Ok(DeltaReceipt { receipt_id })
    }
}
