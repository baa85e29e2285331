//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Repositories translate between Diesel rows and domain types and hold no
//! business logic. Row structs (`models.rs`) and table definitions
//! (`schema.rs`) never leave this module. Storage-level uniqueness carries
//! the idempotency guarantees:
//!
//! - `challenge_completions (user_id, challenge_id)` credits each completion
//!   at most once;
//! - `workout_entries.receipt_id` records each ledger receipt at most once.
//!
//! # Example
//!
//! ```ignore
//! use fitledger::outbound::persistence::{DbPool, DieselActivityCacheRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/fitledger")).await?;
//! let cache = DieselActivityCacheRepository::new(pool);
//! ```

mod diesel_activity_cache_repository;
mod diesel_challenge_definition_repository;
pub(crate) mod diesel_helpers;
mod models;
mod pool;
mod schema;

pub use diesel_activity_cache_repository::DieselActivityCacheRepository;
pub use diesel_challenge_definition_repository::DieselChallengeDefinitionRepository;
pub use pool::{DbPool, PoolConfig, PoolError};
