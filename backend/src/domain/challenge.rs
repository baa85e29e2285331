//! Challenge definitions mirrored from the ledger.
//!
//! The local copy is advisory: it serves lookups and reward amounts when the
//! ledger is slow, but never decides whether a challenge is complete.

use serde::{Deserialize, Serialize};

use super::ChallengeId;

/// Read-only mirror of one ledger challenge definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeDefinition {
    /// Ledger-assigned challenge number.
    pub id: ChallengeId,
    /// Progress value at which the ledger marks the challenge complete.
    pub target: u64,
    /// Balance credited once per user on first completion.
    pub reward: u64,
    /// Difficulty tier.
    pub level: u32,
    /// Free-form challenge category reported by the ledger.
    pub challenge_type: String,
    /// Whether the challenge currently accepts progress.
    pub active: bool,
}

/// Default upper bound on the challenge count accepted from the ledger.
pub const DEFAULT_MAX_CHALLENGES: u64 = 10_000;
