//! Diesel table definitions for the cache schema.
//!
//! These definitions must match `backend/migrations` exactly. Regenerate
//! with `diesel print-schema` after a migration changes a table.

diesel::table! {
    /// Mirror of ledger challenge definitions, keyed by ledger id.
    challenge_definitions (id) {
        id -> Int8,
        target -> Int8,
        reward -> Int8,
        level -> Int4,
        challenge_type -> Text,
        active -> Bool,
        synced_at -> Timestamptz,
    }
}

diesel::table! {
    /// Per-user ledger total and credited reward balance.
    user_activity (user_id) {
        user_id -> Uuid,
        /// `NULL` until the first reconciliation.
        total_accumulated -> Nullable<Int8>,
        balance -> Int8,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Highest observed progress per user and challenge.
    user_challenge_progress (user_id, challenge_id) {
        user_id -> Uuid,
        challenge_id -> Int8,
        progress -> Int8,
        completed -> Bool,
        completed_at -> Nullable<Timestamptz>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Completion credits. The composite key makes each credit at-most-once.
    challenge_completions (user_id, challenge_id) {
        user_id -> Uuid,
        challenge_id -> Int8,
        receipt_id -> Text,
        reward -> Int8,
        completed_at -> Timestamptz,
    }
}

diesel::table! {
    /// Workout log keyed by the unique ledger receipt.
    workout_entries (id) {
        id -> Int8,
        user_id -> Uuid,
        amount -> Int8,
        receipt_id -> Text,
        recorded_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    challenge_definitions,
    user_activity,
    user_challenge_progress,
    challenge_completions,
    workout_entries,
);
