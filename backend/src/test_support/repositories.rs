//! In-memory repositories honouring the storage uniqueness constraints.
//!
//! Each port call takes one mutex for its whole body, which gives the same
//! atomicity a single database transaction gives the Diesel adapters.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::domain::ports::{
    ActivityCacheRepository, ActivityCacheRepositoryError, ChallengeDefinitionRepository,
    ChallengeDefinitionRepositoryError, ChallengeSyncMetric, LogRefreshMetric, ReconcileMetric,
    SyncMetrics, SyncMetricsError,
};
use crate::domain::{
    CachedProgress, ChallengeDefinition, ChallengeId, InvariantViolation, ProgressApplyOutcome,
    ProgressUpdate, ReceiptId, UserActivitySnapshot, UserId, WorkoutAppendOutcome, WorkoutEntry,
};

#[derive(Default)]
struct CacheState {
    totals: HashMap<UserId, u64>,
    balances: HashMap<UserId, u64>,
    progress: HashMap<(UserId, ChallengeId), CachedProgress>,
    completions: HashMap<(UserId, ChallengeId), ReceiptId>,
    workouts: Vec<WorkoutEntry>,
    receipts: HashSet<String>,
}

/// Activity cache double.
#[derive(Default)]
pub struct InMemoryActivityCache {
    state: Mutex<CacheState>,
    unavailable: AtomicBool,
}

impl InMemoryActivityCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Cached total for the user.
    pub fn total(&self, user_id: &UserId) -> Option<u64> {
        self.lock().totals.get(user_id).copied()
    }

    /// Credited balance for the user, zero when unknown.
    pub fn balance(&self, user_id: &UserId) -> u64 {
        self.lock().balances.get(user_id).copied().unwrap_or(0)
    }

    /// Cached progress for one challenge.
    pub fn progress(&self, user_id: &UserId, challenge_id: ChallengeId) -> Option<CachedProgress> {
        self.lock().progress.get(&(*user_id, challenge_id)).cloned()
    }

    /// Completed challenge ids for the user, in id order.
    pub fn completions(&self, user_id: &UserId) -> Vec<ChallengeId> {
        let mut ids: Vec<ChallengeId> = self
            .lock()
            .completions
            .keys()
            .filter(|(owner, _)| owner == user_id)
            .map(|(_, challenge_id)| *challenge_id)
            .collect();
        ids.sort();
        ids
    }

    /// Receipt stored with the completion entry.
    pub fn completion_receipt(&self, user_id: &UserId, challenge_id: ChallengeId) -> Option<ReceiptId> {
        self.lock().completions.get(&(*user_id, challenge_id)).cloned()
    }

    /// Workout entries for the user, in append order.
    pub fn workouts(&self, user_id: &UserId) -> Vec<WorkoutEntry> {
        self.lock()
            .workouts
            .iter()
            .filter(|entry| entry.user_id == *user_id)
            .cloned()
            .collect()
    }

    /// Overwrite cached progress without touching completion entries.
    pub fn seed_progress(&self, user_id: UserId, challenge_id: ChallengeId, progress: CachedProgress) {
        self.lock().progress.insert((user_id, challenge_id), progress);
    }

    /// Overwrite the cached total.
    pub fn seed_total(&self, user_id: UserId, total: u64) {
        self.lock().totals.insert(user_id, total);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("cache mutex"),
        }
    }

    fn check_available(&self) -> Result<(), ActivityCacheRepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ActivityCacheRepositoryError::connection("cache offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl ActivityCacheRepository for InMemoryActivityCache {
    async fn load_snapshot(
        &self,
        user_id: &UserId,
    ) -> Result<UserActivitySnapshot, ActivityCacheRepositoryError> {
        self.check_available()?;
        let state = self.lock();
        let progress: BTreeMap<ChallengeId, CachedProgress> = state
            .progress
            .iter()
            .filter(|((owner, _), _)| owner == user_id)
            .map(|((_, challenge_id), entry)| (*challenge_id, entry.clone()))
            .collect();
        Ok(UserActivitySnapshot {
            total: state.totals.get(user_id).copied(),
            balance: state.balances.get(user_id).copied().unwrap_or(0),
            progress,
        })
    }

    async fn overwrite_total(
        &self,
        user_id: &UserId,
        total: u64,
    ) -> Result<(), ActivityCacheRepositoryError> {
        self.check_available()?;
        self.lock().totals.insert(*user_id, total);
        Ok(())
    }

    async fn apply_progress(
        &self,
        update: &ProgressUpdate,
    ) -> Result<ProgressApplyOutcome, ActivityCacheRepositoryError> {
        self.check_available()?;
        let mut state = self.lock();
        let key = (update.user_id, update.challenge_id);

        let entry = state.progress.entry(key).or_insert(CachedProgress {
            progress: 0,
            completed: false,
            completed_at: None,
        });
        entry.progress = entry.progress.max(update.progress);
        entry.completed = entry.completed || update.completed;

        let Some(credit) = &update.completion else {
            return Ok(ProgressApplyOutcome::default());
        };
        if state.completions.contains_key(&key) {
            return Ok(ProgressApplyOutcome::refused());
        }
        state.completions.insert(key, credit.receipt.clone());
        let balance = state.balances.entry(update.user_id).or_insert(0);
        *balance = balance.saturating_add(credit.reward);
        if let Some(entry) = state.progress.get_mut(&key) {
            entry.completed = true;
            entry.completed_at.get_or_insert(update.observed_at);
        }
        Ok(ProgressApplyOutcome::credited())
    }

    async fn append_workout(
        &self,
        entry: &WorkoutEntry,
    ) -> Result<WorkoutAppendOutcome, ActivityCacheRepositoryError> {
        self.check_available()?;
        let mut state = self.lock();
        if !state.receipts.insert(entry.receipt.as_str().to_owned()) {
            return Ok(WorkoutAppendOutcome::AlreadyRecorded);
        }
        state.workouts.push(entry.clone());
        Ok(WorkoutAppendOutcome::Appended)
    }
}

/// Challenge definition mirror double.
#[derive(Default)]
pub struct InMemoryChallengeDefinitions {
    definitions: Mutex<BTreeMap<ChallengeId, ChallengeDefinition>>,
    unavailable: AtomicBool,
}

impl InMemoryChallengeDefinitions {
    /// Empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirror seeded with `definitions`.
    pub fn with_definitions(definitions: impl IntoIterator<Item = ChallengeDefinition>) -> Self {
        let repository = Self::default();
        for definition in definitions {
            repository.lock().insert(definition.id, definition);
        }
        repository
    }

    /// Make every call fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Mirrored definition for one id.
    pub fn get(&self, challenge_id: ChallengeId) -> Option<ChallengeDefinition> {
        self.lock().get(&challenge_id).cloned()
    }

    /// Number of mirrored definitions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the mirror holds no definitions.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<ChallengeId, ChallengeDefinition>> {
        match self.definitions.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("definition mutex"),
        }
    }

    fn check_available(&self) -> Result<(), ChallengeDefinitionRepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ChallengeDefinitionRepositoryError::connection("mirror offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChallengeDefinitionRepository for InMemoryChallengeDefinitions {
    async fn upsert_definition(
        &self,
        definition: &ChallengeDefinition,
    ) -> Result<(), ChallengeDefinitionRepositoryError> {
        self.check_available()?;
        self.lock().insert(definition.id, definition.clone());
        Ok(())
    }

    async fn list_definitions(
        &self,
    ) -> Result<Vec<ChallengeDefinition>, ChallengeDefinitionRepositoryError> {
        self.check_available()?;
        Ok(self.lock().values().cloned().collect())
    }
}

/// Metrics double that keeps every payload.
#[derive(Default)]
pub struct RecordingSyncMetrics {
    reconciliations: Mutex<Vec<ReconcileMetric>>,
    violations: Mutex<Vec<InvariantViolation>>,
    challenge_syncs: Mutex<Vec<ChallengeSyncMetric>>,
    log_refreshes: Mutex<Vec<LogRefreshMetric>>,
}

fn snapshot<T: Clone>(entries: &Mutex<Vec<T>>) -> Vec<T> {
    match entries.lock() {
        Ok(guard) => guard.clone(),
        Err(_) => panic!("metrics mutex"),
    }
}

fn push<T>(entries: &Mutex<Vec<T>>, value: T) {
    match entries.lock() {
        Ok(mut guard) => guard.push(value),
        Err(_) => panic!("metrics mutex"),
    }
}

impl RecordingSyncMetrics {
    /// Recorded reconciliation metrics, oldest first.
    pub fn reconciliations(&self) -> Vec<ReconcileMetric> {
        snapshot(&self.reconciliations)
    }

    /// Recorded invariant violations, oldest first.
    pub fn violations(&self) -> Vec<InvariantViolation> {
        snapshot(&self.violations)
    }

    /// Recorded challenge sync metrics, oldest first.
    pub fn challenge_syncs(&self) -> Vec<ChallengeSyncMetric> {
        snapshot(&self.challenge_syncs)
    }

    /// Recorded log refresh metrics, oldest first.
    pub fn log_refreshes(&self) -> Vec<LogRefreshMetric> {
        snapshot(&self.log_refreshes)
    }
}

#[async_trait]
impl SyncMetrics for RecordingSyncMetrics {
    async fn record_reconciliation(
        &self,
        payload: &ReconcileMetric,
    ) -> Result<(), SyncMetricsError> {
        push(&self.reconciliations, payload.clone());
        Ok(())
    }

    async fn record_invariant_violation(
        &self,
        violation: &InvariantViolation,
    ) -> Result<(), SyncMetricsError> {
        push(&self.violations, violation.clone());
        Ok(())
    }

    async fn record_challenge_sync(
        &self,
        payload: &ChallengeSyncMetric,
    ) -> Result<(), SyncMetricsError> {
        push(&self.challenge_syncs, *payload);
        Ok(())
    }

    async fn record_log_refresh(
        &self,
        payload: &LogRefreshMetric,
    ) -> Result<(), SyncMetricsError> {
        push(&self.log_refreshes, *payload);
        Ok(())
    }
}
