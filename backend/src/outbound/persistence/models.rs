//! Internal Diesel row structs.
//!
//! These types never leave the persistence layer. Amounts are `i64` here and
//! converted to the domain's `u64` by the repositories.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{
    challenge_completions, challenge_definitions, user_activity, user_challenge_progress,
    workout_entries,
};

// ---------------------------------------------------------------------------
// Challenge definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = challenge_definitions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ChallengeDefinitionRow {
    pub id: i64,
    pub target: i64,
    pub reward: i64,
    pub level: i32,
    pub challenge_type: String,
    pub active: bool,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = challenge_definitions)]
pub(crate) struct NewChallengeDefinitionRow<'a> {
    pub id: i64,
    pub target: i64,
    pub reward: i64,
    pub level: i32,
    pub challenge_type: &'a str,
    pub active: bool,
    pub synced_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// User activity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = user_activity)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UserActivityRow {
    pub total_accumulated: Option<i64>,
    pub balance: i64,
}

/// Insert used by the total overwrite; `balance` takes its column default.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_activity)]
pub(crate) struct NewUserTotalRow {
    pub user_id: Uuid,
    pub total_accumulated: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

/// Insert used by completion credits; `total_accumulated` stays `NULL` when
/// the row is new.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_activity)]
pub(crate) struct NewUserBalanceRow {
    pub user_id: Uuid,
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Challenge progress and completions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = user_challenge_progress)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ProgressRow {
    pub challenge_id: i64,
    pub progress: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_challenge_progress)]
pub(crate) struct NewProgressRow {
    pub user_id: Uuid,
    pub challenge_id: i64,
    pub progress: i64,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = challenge_completions)]
pub(crate) struct NewCompletionRow<'a> {
    pub user_id: Uuid,
    pub challenge_id: i64,
    pub receipt_id: &'a str,
    pub reward: i64,
    pub completed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Workouts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = workout_entries)]
pub(crate) struct NewWorkoutRow<'a> {
    pub user_id: Uuid,
    pub amount: i64,
    pub receipt_id: &'a str,
    pub recorded_at: DateTime<Utc>,
}
