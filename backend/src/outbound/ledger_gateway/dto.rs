//! Wire shapes of the ledger gateway.

use serde::{Deserialize, Serialize};

use crate::domain::{ChallengeDefinition, ChallengeId, ReceiptId};

#[derive(Debug, Deserialize)]
pub(super) struct TotalDto {
    pub(super) total: u64,
}

#[derive(Debug, Deserialize)]
pub(super) struct CountDto {
    pub(super) count: u64,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProgressDto {
    pub(super) progress: u64,
}

#[derive(Debug, Deserialize)]
pub(super) struct CompletedDto {
    pub(super) completed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ChallengeDto {
    id: u64,
    target: u64,
    reward: u64,
    #[serde(default)]
    level: u32,
    #[serde(default)]
    challenge_type: String,
    #[serde(default = "default_active")]
    active: bool,
}

const fn default_active() -> bool {
    true
}

impl ChallengeDto {
    pub(super) fn into_domain(self) -> Result<ChallengeDefinition, String> {
        let id = ChallengeId::new(self.id).map_err(|err| err.to_string())?;
        Ok(ChallengeDefinition {
            id,
            target: self.target,
            reward: self.reward,
            level: self.level,
            challenge_type: self.challenge_type,
            active: self.active,
        })
    }
}

#[derive(Debug, Serialize)]
pub(super) struct DeltaRequestDto {
    pub(super) amount: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DeltaReceiptDto {
    receipt_id: String,
}

impl DeltaReceiptDto {
    pub(super) fn into_domain(self) -> Result<ReceiptId, String> {
        ReceiptId::new(self.receipt_id).map_err(|err| err.to_string())
    }
}
