//! Mapping helpers from port errors to domain errors.

use crate::domain::Error;
use crate::domain::ports::{
    ActivityCacheRepositoryError, ChallengeDefinitionRepositoryError, LedgerClientError,
};

pub(crate) fn map_ledger_error(error: LedgerClientError, context: &str) -> Error {
    if error.is_transient() {
        Error::service_unavailable(format!("ledger {context} unavailable: {error}"))
    } else {
        Error::upstream_rejected(format!("ledger {context} failed: {error}"))
    }
}

pub(super) fn map_cache_error(error: ActivityCacheRepositoryError, context: &str) -> Error {
    match error {
        ActivityCacheRepositoryError::Connection { message } => {
            Error::service_unavailable(format!("activity cache unavailable during {context}: {message}"))
        }
        ActivityCacheRepositoryError::Query { message } => {
            Error::internal(format!("activity cache {context} failed: {message}"))
        }
    }
}

/// Reject a ledger challenge count above `max` before it is enumerated.
pub(crate) fn checked_challenge_count(count: u64, max: u64) -> Result<u64, Error> {
    if count > max {
        return Err(Error::upstream_rejected(format!(
            "ledger challenge count {count} exceeds the configured maximum {max}"
        )));
    }
    Ok(count)
}

pub(super) fn map_enumeration_error(
    ledger: LedgerClientError,
    mirror: ChallengeDefinitionRepositoryError,
) -> Error {
    let message = format!("challenge ids unavailable: {ledger}; mirror: {mirror}");
    if ledger.is_transient() || mirror.is_transient() {
        Error::service_unavailable(message)
    } else {
        Error::upstream_rejected(message)
    }
}
