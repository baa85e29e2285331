//! Driven port for the local activity cache.
//!
//! Each method is one atomic storage operation. Crediting a reward relies on
//! a storage-level uniqueness constraint on `(user_id, challenge_id)` in the
//! completion ledger, never on an application-level read-then-write.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::{
    ProgressApplyOutcome, ProgressUpdate, UserActivitySnapshot, UserId, WorkoutAppendOutcome,
    WorkoutEntry,
};

define_port_error! {
    /// Errors raised by activity cache adapters.
    pub enum ActivityCacheRepositoryError {
        /// Storage could not be reached.
        Connection { message: String } =>
            "activity cache connection failed: {message}",
        /// Storage rejected or failed the statement.
        Query { message: String } =>
            "activity cache query failed: {message}",
    }
    transient: [Connection]
}

/// Port for reading and writing cached activity.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivityCacheRepository: Send + Sync {
    /// Load the cached state of one user. Unknown users yield an empty
    /// snapshot.
    async fn load_snapshot(
        &self,
        user_id: &UserId,
    ) -> Result<UserActivitySnapshot, ActivityCacheRepositoryError>;

    /// Replace the cached canonical total.
    async fn overwrite_total(
        &self,
        user_id: &UserId,
        total: u64,
    ) -> Result<(), ActivityCacheRepositoryError>;

    /// Apply one per-challenge update atomically.
    ///
    /// Progress is stored as the greater of the stored and supplied value,
    /// and completion as their OR. When the update carries a completion
    /// credit, the completion entry is inserted under its uniqueness guard;
    /// only a successful insert credits the balance and stamps
    /// `completed_at`.
    async fn apply_progress(
        &self,
        update: &ProgressUpdate,
    ) -> Result<ProgressApplyOutcome, ActivityCacheRepositoryError>;

    /// Append a workout entry unless its receipt is already recorded.
    async fn append_workout(
        &self,
        entry: &WorkoutEntry,
    ) -> Result<WorkoutAppendOutcome, ActivityCacheRepositoryError>;
}

/// Fixture repository that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureActivityCacheRepository;

#[async_trait]
impl ActivityCacheRepository for FixtureActivityCacheRepository {
    async fn load_snapshot(
        &self,
        _user_id: &UserId,
    ) -> Result<UserActivitySnapshot, ActivityCacheRepositoryError> {
        Ok(UserActivitySnapshot::default())
    }

    async fn overwrite_total(
        &self,
        _user_id: &UserId,
        _total: u64,
    ) -> Result<(), ActivityCacheRepositoryError> {
        Ok(())
    }

    async fn apply_progress(
        &self,
        update: &ProgressUpdate,
    ) -> Result<ProgressApplyOutcome, ActivityCacheRepositoryError> {
        Ok(ProgressApplyOutcome {
            newly_completed: update.completion.is_some(),
            credit_refused: false,
        })
    }

    async fn append_workout(
        &self,
        _entry: &WorkoutEntry,
    ) -> Result<WorkoutAppendOutcome, ActivityCacheRepositoryError> {
        Ok(WorkoutAppendOutcome::Appended)
    }
}
