//! PostgreSQL-backed `ChallengeDefinitionRepository`.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{ChallengeDefinitionRepository, ChallengeDefinitionRepositoryError};
use crate::domain::{ChallengeDefinition, ChallengeId};

use super::diesel_helpers::{self, from_db_amount, to_db_amount};
use super::models::{ChallengeDefinitionRow, NewChallengeDefinitionRow};
use super::pool::{DbPool, PoolError};
use super::schema::challenge_definitions;

/// Diesel-backed challenge definition mirror.
#[derive(Clone)]
pub struct DieselChallengeDefinitionRepository {
    pool: DbPool,
}

impl DieselChallengeDefinitionRepository {
    /// Create a repository over the shared pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> ChallengeDefinitionRepositoryError {
    diesel_helpers::map_pool_error(error, ChallengeDefinitionRepositoryError::connection)
}

fn map_diesel_error(
    error: diesel::result::Error,
    operation: &str,
) -> ChallengeDefinitionRepositoryError {
    diesel_helpers::map_diesel_error(
        error,
        operation,
        ChallengeDefinitionRepositoryError::query,
        ChallengeDefinitionRepositoryError::connection,
    )
}

fn column(value: u64, field: &str) -> Result<i64, ChallengeDefinitionRepositoryError> {
    to_db_amount(value, field).map_err(ChallengeDefinitionRepositoryError::query)
}

fn row_to_definition(
    row: ChallengeDefinitionRow,
) -> Result<ChallengeDefinition, ChallengeDefinitionRepositoryError> {
    let decode = |value: i64, field: &str| {
        from_db_amount(value, field).map_err(ChallengeDefinitionRepositoryError::query)
    };
    let id = ChallengeId::new(decode(row.id, "id")?)
        .map_err(|err| ChallengeDefinitionRepositoryError::query(err.to_string()))?;
    let level = u32::try_from(row.level).map_err(|_| {
        ChallengeDefinitionRepositoryError::query(format!("level {} is negative", row.level))
    })?;
    Ok(ChallengeDefinition {
        id,
        target: decode(row.target, "target")?,
        reward: decode(row.reward, "reward")?,
        level,
        challenge_type: row.challenge_type,
        active: row.active,
    })
}

#[async_trait]
impl ChallengeDefinitionRepository for DieselChallengeDefinitionRepository {
    async fn upsert_definition(
        &self,
        definition: &ChallengeDefinition,
    ) -> Result<(), ChallengeDefinitionRepositoryError> {
        let row = NewChallengeDefinitionRow {
            id: column(definition.id.get(), "id")?,
            target: column(definition.target, "target")?,
            reward: column(definition.reward, "reward")?,
            level: i32::try_from(definition.level).map_err(|_| {
                ChallengeDefinitionRepositoryError::query(format!(
                    "level {} exceeds INTEGER range",
                    definition.level
                ))
            })?,
            challenge_type: definition.challenge_type.as_str(),
            active: definition.active,
            synced_at: Utc::now(),
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        diesel::insert_into(challenge_definitions::table)
            .values(&row)
            .on_conflict(challenge_definitions::id)
            .do_update()
            .set((
                challenge_definitions::target.eq(excluded(challenge_definitions::target)),
                challenge_definitions::reward.eq(excluded(challenge_definitions::reward)),
                challenge_definitions::level.eq(excluded(challenge_definitions::level)),
                challenge_definitions::challenge_type
                    .eq(excluded(challenge_definitions::challenge_type)),
                challenge_definitions::active.eq(excluded(challenge_definitions::active)),
                challenge_definitions::synced_at.eq(excluded(challenge_definitions::synced_at)),
            ))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(|err| map_diesel_error(err, "upsert definition"))
    }

    async fn list_definitions(
        &self,
    ) -> Result<Vec<ChallengeDefinition>, ChallengeDefinitionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let rows: Vec<ChallengeDefinitionRow> = challenge_definitions::table
            .order_by(challenge_definitions::id)
            .select(ChallengeDefinitionRow::as_select())
            .load(&mut conn)
            .await
            .map_err(|err| map_diesel_error(err, "list definitions"))?;

        rows.into_iter().map(row_to_definition).collect()
    }
}
