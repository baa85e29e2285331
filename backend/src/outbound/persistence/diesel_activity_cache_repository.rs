//! PostgreSQL-backed `ActivityCacheRepository`.
//!
//! `apply_progress` is one transaction: the progress upsert keeps the higher
//! value and never clears `completed`, and the reward is credited only when
//! the `challenge_completions` insert actually adds a row. Concurrent
//! reconciliations for the same user and challenge therefore credit at most
//! once.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;

use crate::domain::ports::{ActivityCacheRepository, ActivityCacheRepositoryError};
use crate::domain::{
    CachedProgress, ChallengeId, ProgressApplyOutcome, ProgressUpdate, UserActivitySnapshot,
    UserId, WorkoutAppendOutcome, WorkoutEntry,
};

use super::diesel_helpers::{self, from_db_amount, greatest, to_db_amount};
use super::models::{
    NewCompletionRow, NewProgressRow, NewUserBalanceRow, NewUserTotalRow, NewWorkoutRow,
    ProgressRow, UserActivityRow,
};
use super::pool::{DbPool, PoolError};
use super::schema::{challenge_completions, user_activity, user_challenge_progress, workout_entries};

/// Diesel-backed activity cache.
#[derive(Clone)]
pub struct DieselActivityCacheRepository {
    pool: DbPool,
}

impl DieselActivityCacheRepository {
    /// Create a repository over the shared pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> ActivityCacheRepositoryError {
    diesel_helpers::map_pool_error(error, ActivityCacheRepositoryError::connection)
}

fn map_diesel_error(error: diesel::result::Error, operation: &str) -> ActivityCacheRepositoryError {
    diesel_helpers::map_diesel_error(
        error,
        operation,
        ActivityCacheRepositoryError::query,
        ActivityCacheRepositoryError::connection,
    )
}

fn amount(value: u64, field: &str) -> Result<i64, ActivityCacheRepositoryError> {
    to_db_amount(value, field).map_err(ActivityCacheRepositoryError::query)
}

fn row_to_progress(
    row: ProgressRow,
) -> Result<(ChallengeId, CachedProgress), ActivityCacheRepositoryError> {
    let id = from_db_amount(row.challenge_id, "challenge_id")
        .map_err(ActivityCacheRepositoryError::query)?;
    let challenge_id =
        ChallengeId::new(id).map_err(|err| ActivityCacheRepositoryError::query(err.to_string()))?;
    let progress =
        from_db_amount(row.progress, "progress").map_err(ActivityCacheRepositoryError::query)?;
    Ok((
        challenge_id,
        CachedProgress {
            progress,
            completed: row.completed,
            completed_at: row.completed_at,
        },
    ))
}

struct CompletionWrite<'a> {
    receipt_id: &'a str,
    reward: i64,
}

async fn apply_in_transaction(
    conn: &mut diesel_async::AsyncPgConnection,
    progress_row: NewProgressRow,
    completion: Option<CompletionWrite<'_>>,
    observed_at: DateTime<Utc>,
) -> Result<ProgressApplyOutcome, diesel::result::Error> {
    let user_id = progress_row.user_id;
    let challenge_id = progress_row.challenge_id;

    diesel::insert_into(user_challenge_progress::table)
        .values(&progress_row)
        .on_conflict((
            user_challenge_progress::user_id,
            user_challenge_progress::challenge_id,
        ))
        .do_update()
        .set((
            user_challenge_progress::progress.eq(greatest(
                user_challenge_progress::progress,
                excluded(user_challenge_progress::progress),
            )),
            user_challenge_progress::completed.eq(user_challenge_progress::completed
                .or(excluded(user_challenge_progress::completed))),
            user_challenge_progress::updated_at.eq(excluded(user_challenge_progress::updated_at)),
        ))
        .execute(conn)
        .await?;

    let Some(completion) = completion else {
        return Ok(ProgressApplyOutcome::default());
    };

    let inserted = diesel::insert_into(challenge_completions::table)
        .values(&NewCompletionRow {
            user_id,
            challenge_id,
            receipt_id: completion.receipt_id,
            reward: completion.reward,
            completed_at: observed_at,
        })
        .on_conflict_do_nothing()
        .execute(conn)
        .await?;
    if inserted == 0 {
        return Ok(ProgressApplyOutcome::refused());
    }

    diesel::insert_into(user_activity::table)
        .values(&NewUserBalanceRow {
            user_id,
            balance: completion.reward,
            updated_at: observed_at,
        })
        .on_conflict(user_activity::user_id)
        .do_update()
        .set((
            user_activity::balance.eq(user_activity::balance + excluded(user_activity::balance)),
            user_activity::updated_at.eq(excluded(user_activity::updated_at)),
        ))
        .execute(conn)
        .await?;

    diesel::update(
        user_challenge_progress::table
            .filter(user_challenge_progress::user_id.eq(user_id))
            .filter(user_challenge_progress::challenge_id.eq(challenge_id))
            .filter(user_challenge_progress::completed_at.is_null()),
    )
    .set((
        user_challenge_progress::completed.eq(true),
        user_challenge_progress::completed_at.eq(Some(observed_at)),
    ))
    .execute(conn)
    .await?;

    Ok(ProgressApplyOutcome::credited())
}

#[async_trait]
impl ActivityCacheRepository for DieselActivityCacheRepository {
    async fn load_snapshot(
        &self,
        user_id: &UserId,
    ) -> Result<UserActivitySnapshot, ActivityCacheRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let activity: Option<UserActivityRow> = user_activity::table
            .filter(user_activity::user_id.eq(user_id.as_uuid()))
            .select(UserActivityRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(|err| map_diesel_error(err, "load activity"))?;

        let rows: Vec<ProgressRow> = user_challenge_progress::table
            .filter(user_challenge_progress::user_id.eq(user_id.as_uuid()))
            .order_by(user_challenge_progress::challenge_id)
            .select(ProgressRow::as_select())
            .load(&mut conn)
            .await
            .map_err(|err| map_diesel_error(err, "load progress"))?;

        let progress = rows
            .into_iter()
            .map(row_to_progress)
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        let (total, balance) = match activity {
            Some(row) => {
                let total = row
                    .total_accumulated
                    .map(|value| from_db_amount(value, "total_accumulated"))
                    .transpose()
                    .map_err(ActivityCacheRepositoryError::query)?;
                let balance = from_db_amount(row.balance, "balance")
                    .map_err(ActivityCacheRepositoryError::query)?;
                (total, balance)
            }
            None => (None, 0),
        };

        Ok(UserActivitySnapshot {
            total,
            balance,
            progress,
        })
    }

    async fn overwrite_total(
        &self,
        user_id: &UserId,
        total: u64,
    ) -> Result<(), ActivityCacheRepositoryError> {
        let total = amount(total, "total")?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        diesel::insert_into(user_activity::table)
            .values(&NewUserTotalRow {
                user_id: *user_id.as_uuid(),
                total_accumulated: Some(total),
                updated_at: Utc::now(),
            })
            .on_conflict(user_activity::user_id)
            .do_update()
            .set((
                user_activity::total_accumulated.eq(excluded(user_activity::total_accumulated)),
                user_activity::updated_at.eq(excluded(user_activity::updated_at)),
            ))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(|err| map_diesel_error(err, "overwrite total"))
    }

    async fn apply_progress(
        &self,
        update: &ProgressUpdate,
    ) -> Result<ProgressApplyOutcome, ActivityCacheRepositoryError> {
        let progress_row = NewProgressRow {
            user_id: *update.user_id.as_uuid(),
            challenge_id: amount(update.challenge_id.get(), "challenge_id")?,
            progress: amount(update.progress, "progress")?,
            completed: update.completed,
            updated_at: update.observed_at,
        };
        let completion = update
            .completion
            .as_ref()
            .map(|credit| {
                Ok::<_, ActivityCacheRepositoryError>(CompletionWrite {
                    receipt_id: credit.receipt.as_str(),
                    reward: amount(credit.reward, "reward")?,
                })
            })
            .transpose()?;
        let observed_at = update.observed_at;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction(|conn| {
            apply_in_transaction(conn, progress_row, completion, observed_at).scope_boxed()
        })
        .await
        .map_err(|err| map_diesel_error(err, "apply progress"))
    }

    async fn append_workout(
        &self,
        entry: &WorkoutEntry,
    ) -> Result<WorkoutAppendOutcome, ActivityCacheRepositoryError> {
        let amount = amount(entry.amount, "amount")?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let inserted = diesel::insert_into(workout_entries::table)
            .values(&NewWorkoutRow {
                user_id: *entry.user_id.as_uuid(),
                amount,
                receipt_id: entry.receipt.as_str(),
                recorded_at: entry.recorded_at,
            })
            .on_conflict(workout_entries::receipt_id)
            .do_nothing()
            .execute(&mut conn)
            .await
            .map_err(|err| map_diesel_error(err, "append workout"))?;

        Ok(if inserted == 0 {
            WorkoutAppendOutcome::AlreadyRecorded
        } else {
            WorkoutAppendOutcome::Appended
        })
    }
}
