//! Cached activity model and the pure policy that reconciles it with ledger
//! observations.
//!
//! Storage adapters persist the types defined here; the reconciliation
//! service decides what to write by calling [`evaluate_total`] and
//! [`evaluate_challenge`], which never perform I/O.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChallengeId, LedgerIdentity, ReceiptId, UserId};

/// Cached progress for one (user, challenge) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedProgress {
    /// Highest progress observed so far.
    pub progress: u64,
    /// Whether the ledger has ever reported completion.
    pub completed: bool,
    /// First time completion was recorded locally.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Everything the cache holds for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserActivitySnapshot {
    /// Cached canonical total, `None` before the first reconciliation.
    pub total: Option<u64>,
    /// Cached rewards credited to the user balance.
    pub balance: u64,
    /// Cached per-challenge progress.
    pub progress: BTreeMap<ChallengeId, CachedProgress>,
}

impl UserActivitySnapshot {
    /// Cached progress for `challenge_id`, if any.
    pub fn progress_for(&self, challenge_id: ChallengeId) -> Option<&CachedProgress> {
        self.progress.get(&challenge_id)
    }
}

/// Per-challenge state read from the ledger during one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerChallengeState {
    /// Challenge queried.
    pub challenge_id: ChallengeId,
    /// Ledger-reported progress.
    pub progress: u64,
    /// Ledger-reported completion flag.
    pub completed: bool,
}

/// Reward credit applied together with the first completion of a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCredit {
    /// Amount added to the user balance.
    pub reward: u64,
    /// Ledger receipt stored as provenance.
    pub receipt: ReceiptId,
}

/// One atomic per-challenge write.
///
/// Storage upserts the progress row keeping the higher progress value and the
/// OR of the completion flags. When `completion` is set, storage inserts the
/// completion entry guarded by its `(user_id, challenge_id)` key; only when
/// that insert actually adds a row does it credit the reward and stamp
/// `completed_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// User being reconciled.
    pub user_id: UserId,
    /// Challenge being reconciled.
    pub challenge_id: ChallengeId,
    /// Progress to store.
    pub progress: u64,
    /// Completion flag to store.
    pub completed: bool,
    /// Credit to apply if this is the first completion.
    pub completion: Option<CompletionCredit>,
    /// Observation time.
    pub observed_at: DateTime<Utc>,
}

/// Result of applying a [`ProgressUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressApplyOutcome {
    /// True when this write inserted the completion entry and credited the
    /// reward.
    pub newly_completed: bool,
    /// True when a credit was requested but a completion entry already
    /// existed, so nothing was credited.
    pub credit_refused: bool,
}

impl ProgressApplyOutcome {
    /// The completion entry was inserted and the reward credited.
    pub const fn credited() -> Self {
        Self {
            newly_completed: true,
            credit_refused: false,
        }
    }

    /// A credit was requested and the completion guard refused it.
    pub const fn refused() -> Self {
        Self {
            newly_completed: false,
            credit_refused: true,
        }
    }
}

/// Append-only audit entry for one mutating ledger operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkoutEntry {
    /// User who submitted the delta.
    pub user_id: UserId,
    /// Delta submitted to the ledger.
    pub amount: u64,
    /// Ledger receipt for the mutation.
    pub receipt: ReceiptId,
    /// Time the entry was recorded locally.
    pub recorded_at: DateTime<Utc>,
}

/// Result of appending a [`WorkoutEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkoutAppendOutcome {
    /// A new entry was stored.
    Appended,
    /// An entry with the same receipt already exists.
    AlreadyRecorded,
}

/// One reconciliation request, issued after a mutating ledger call settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    /// Local user id.
    pub user_id: UserId,
    /// Ledger account of the user.
    pub ledger_identity: LedgerIdentity,
    /// Amount submitted by the mutating call.
    pub delta_amount: u64,
    /// Receipt returned by the mutating call.
    pub receipt: ReceiptId,
}

/// Ledger data that contradicts what the cache already holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// The ledger total is lower than the cached total. The ledger value is
    /// still written.
    TotalRegressed {
        /// Previously cached total.
        cached: u64,
        /// Total reported by the ledger.
        reported: u64,
    },
    /// Ledger progress is lower than the cached value. The cached value is
    /// kept.
    ProgressRegressed {
        /// Affected challenge.
        challenge_id: ChallengeId,
        /// Previously cached progress.
        cached: u64,
        /// Progress reported by the ledger.
        reported: u64,
    },
    /// The ledger reports not-completed for a challenge cached as completed.
    /// The completion and its credit are kept.
    CompletionRevoked {
        /// Affected challenge.
        challenge_id: ChallengeId,
    },
    /// A first-completion credit was attempted for a challenge whose
    /// completion was already recorded. Storage refused the second credit.
    DuplicateCredit {
        /// Affected challenge.
        challenge_id: ChallengeId,
    },
}

impl InvariantViolation {
    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TotalRegressed { .. } => "total_regressed",
            Self::ProgressRegressed { .. } => "progress_regressed",
            Self::CompletionRevoked { .. } => "completion_revoked",
            Self::DuplicateCredit { .. } => "duplicate_credit",
        }
    }
}

/// Compare a ledger total with the cached one.
///
/// # Examples
/// ```
/// use fitledger::domain::{InvariantViolation, evaluate_total};
///
/// assert_eq!(evaluate_total(None, 10), None);
/// assert_eq!(evaluate_total(Some(5), 10), None);
/// assert_eq!(
///     evaluate_total(Some(10), 5),
///     Some(InvariantViolation::TotalRegressed { cached: 10, reported: 5 })
/// );
/// ```
pub fn evaluate_total(cached: Option<u64>, reported: u64) -> Option<InvariantViolation> {
    match cached {
        Some(cached) if reported < cached => {
            Some(InvariantViolation::TotalRegressed { cached, reported })
        }
        _ => None,
    }
}

/// Values to store for one challenge plus any violations observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeEvaluation {
    /// Progress to store (never lower than the cached value).
    pub progress: u64,
    /// Completion flag to store (never reverts to false).
    pub completed: bool,
    /// Whether a first-completion credit should be attempted.
    pub needs_credit: bool,
    /// Violations detected while comparing.
    pub violations: Vec<InvariantViolation>,
}

/// Merge a ledger observation into cached progress.
///
/// A regression is reported, never applied: progress keeps the higher value
/// and a cached completion stays completed. A credit is only requested when
/// the ledger reports completion and the cache has not recorded it yet; the
/// storage guard still decides whether the credit actually happens.
pub fn evaluate_challenge(
    cached: Option<&CachedProgress>,
    observed: &LedgerChallengeState,
) -> ChallengeEvaluation {
    let mut violations = Vec::new();
    let cached_progress = cached.map_or(0, |entry| entry.progress);
    let cached_completed = cached.is_some_and(|entry| entry.completed);

    if let Some(entry) = cached {
        if observed.progress < entry.progress {
            violations.push(InvariantViolation::ProgressRegressed {
                challenge_id: observed.challenge_id,
                cached: entry.progress,
                reported: observed.progress,
            });
        }
        if entry.completed && !observed.completed {
            violations.push(InvariantViolation::CompletionRevoked {
                challenge_id: observed.challenge_id,
            });
        }
    }

    ChallengeEvaluation {
        progress: cached_progress.max(observed.progress),
        completed: cached_completed || observed.completed,
        needs_credit: observed.completed && !cached_completed,
        violations,
    }
}
