//! Domain primitives, policies, and services.
//!
//! Purpose: keep a local relational cache and an in-memory log mirror
//! consistent with an authoritative ledger and an append-only log, without
//! any transactional coupling between them. Everything here talks to the
//! outside world through [`ports`].
//!
//! Public surface:
//! - Error (alias to `error::Error`) and ErrorCode — service error payload.
//! - ActivityCacheSync — reconciles one user after a ledger mutation.
//! - ChallengeDefinitionSync — mirrors challenge definitions.
//! - LogCache — incremental, filterable mirror of one log topic.
//! - ReconcileWorker / ReconcileQueue — decoupled, retried reconciliation.

pub mod activity;
pub mod activity_sync;
pub mod challenge;
pub mod challenge_sync;
pub mod error;
pub mod identifiers;
pub mod log_cache;
pub mod log_message;
pub mod ports;
pub mod reconcile_worker;

pub use self::activity::{
    CachedProgress, ChallengeEvaluation, CompletionCredit, InvariantViolation,
    LedgerChallengeState, ProgressApplyOutcome, ProgressUpdate, ReconcileRequest,
    UserActivitySnapshot, WorkoutAppendOutcome, WorkoutEntry, evaluate_challenge, evaluate_total,
};
pub use self::activity_sync::{ActivityCacheSync, ActivitySyncConfig, ActivitySyncPorts, ReconcileOutcome};
pub use self::challenge::{ChallengeDefinition, DEFAULT_MAX_CHALLENGES};
pub use self::challenge_sync::{ChallengeDefinitionSync, ChallengeSyncConfig, ChallengeSyncSummary};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::identifiers::{
    ChallengeId, IdentifierValidationError, LedgerIdentity, ReceiptId, TopicId, UserId,
};
pub use self::log_cache::{
    CacheStatus, LogCache, LogCacheConfig, LogCacheStats, RefreshOutcome, page_request,
};
pub use self::log_message::{
    LogMessage, MessageFilter, MessageKind, MessagePayload, RawLogMessage, decode_payload,
};
pub use self::reconcile_worker::{
    AttemptJitter, BackoffJitter, ReconcileQueue, ReconcileWorker, ReconcileWorkerConfig,
    ReconcileWorkerRuntime, RetrySleeper, TokioSleeper,
};

/// Convenient service result alias.
///
/// # Examples
/// ```
/// use fitledger::domain::{Error, SyncResult};
///
/// fn check(limit: usize) -> SyncResult<usize> {
///     if limit == 0 {
///         return Err(Error::invalid_request("limit must be positive"));
///     }
///     Ok(limit)
/// }
/// assert!(check(0).is_err());
/// ```
pub type SyncResult<T> = Result<T, Error>;
