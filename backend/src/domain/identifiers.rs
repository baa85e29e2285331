//! Validated identifiers shared by the reconciliation services.
//!
//! Each identifier is constructed through a fallible constructor so adapters
//! and services never handle raw strings for users, ledger accounts,
//! challenges, receipts, or log topics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Validation errors raised by identifier constructors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierValidationError {
    /// The user id was not a canonical UUID.
    #[error("user id must be a valid UUID")]
    InvalidUserId,
    /// The ledger identity was blank.
    #[error("ledger identity must not be empty")]
    EmptyLedgerIdentity,
    /// The ledger identity carried surrounding whitespace.
    #[error("ledger identity must not contain surrounding whitespace")]
    UntrimmedLedgerIdentity,
    /// Challenge ids start at 1.
    #[error("challenge id must be at least 1")]
    ZeroChallengeId,
    /// The receipt id was blank.
    #[error("receipt id must not be empty")]
    EmptyReceiptId,
    /// The topic id did not match `shard.realm.num`.
    #[error("topic id must use shard.realm.num notation, got {raw}")]
    InvalidTopicId {
        /// Rejected input.
        raw: String,
    },
}

/// Local user identifier stored as a UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Parse a [`UserId`] from its string form.
    pub fn new(id: impl AsRef<str>) -> Result<Self, IdentifierValidationError> {
        let raw = id.as_ref();
        if raw.trim() != raw {
            return Err(IdentifierValidationError::InvalidUserId);
        }
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| IdentifierValidationError::InvalidUserId)
    }

    /// Generate a new random [`UserId`].
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for UserId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Account identity of a user on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LedgerIdentity(String);

impl LedgerIdentity {
    /// Validate and construct a ledger identity.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdentifierValidationError::EmptyLedgerIdentity);
        }
        if value.trim() != value {
            return Err(IdentifierValidationError::UntrimmedLedgerIdentity);
        }
        Ok(Self(value))
    }

    /// Borrow the identity as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for LedgerIdentity {
    type Error = IdentifierValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LedgerIdentity> for String {
    fn from(value: LedgerIdentity) -> Self {
        value.0
    }
}

impl fmt::Display for LedgerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger-assigned challenge number. Ids run from 1 to the ledger count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ChallengeId(u64);

impl ChallengeId {
    /// Validate and construct a challenge id.
    pub const fn new(value: u64) -> Result<Self, IdentifierValidationError> {
        if value == 0 {
            return Err(IdentifierValidationError::ZeroChallengeId);
        }
        Ok(Self(value))
    }

    /// Enumerate `1..=count` as challenge ids.
    ///
    /// # Examples
    /// ```
    /// use fitledger::domain::ChallengeId;
    ///
    /// let ids: Vec<u64> = ChallengeId::range_to(3).map(ChallengeId::get).collect();
    /// assert_eq!(ids, vec![1, 2, 3]);
    /// ```
    pub fn range_to(count: u64) -> impl Iterator<Item = Self> {
        (1..=count).map(Self)
    }

    /// Raw numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for ChallengeId {
    type Error = IdentifierValidationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChallengeId> for u64 {
    fn from(value: ChallengeId) -> Self {
        value.0
    }
}

impl fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Receipt id returned by the ledger for a settled mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReceiptId(String);

impl ReceiptId {
    /// Validate and construct a receipt id.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentifierValidationError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(IdentifierValidationError::EmptyReceiptId);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Borrow the receipt as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for ReceiptId {
    type Error = IdentifierValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ReceiptId> for String {
    fn from(value: ReceiptId) -> Self {
        value.0
    }
}

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Log topic address in `shard.realm.num` notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TopicId {
    shard: u64,
    realm: u64,
    num: u64,
}

impl TopicId {
    /// Build a topic id from its three components.
    pub const fn from_parts(shard: u64, realm: u64, num: u64) -> Self {
        Self { shard, realm, num }
    }

    /// Topic number within the realm.
    pub const fn num(&self) -> u64 {
        self.num
    }
}

impl FromStr for TopicId {
    type Err = IdentifierValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || IdentifierValidationError::InvalidTopicId {
            raw: raw.to_owned(),
        };
        let mut parts = raw.split('.');
        let mut next = || -> Result<u64, IdentifierValidationError> {
            parts
                .next()
                .filter(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|part| part.parse().ok())
                .ok_or_else(invalid)
        };
        let shard = next()?;
        let realm = next()?;
        let num = next()?;
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self { shard, realm, num })
    }
}

impl TryFrom<String> for TopicId {
    type Error = IdentifierValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TopicId> for String {
    fn from(value: TopicId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("3fa85f64-5717-4562-b3fc-2c963f66afa6", true)]
    #[case(" 3fa85f64-5717-4562-b3fc-2c963f66afa6", false)]
    #[case("not-a-uuid", false)]
    fn user_id_requires_canonical_uuid(#[case] raw: &str, #[case] valid: bool) {
        assert_eq!(UserId::new(raw).is_ok(), valid);
    }

    #[rstest]
    #[case("", IdentifierValidationError::EmptyLedgerIdentity)]
    #[case("  ", IdentifierValidationError::EmptyLedgerIdentity)]
    #[case(" 0.0.42", IdentifierValidationError::UntrimmedLedgerIdentity)]
    fn ledger_identity_rejects_blank_or_padded_values(
        #[case] raw: &str,
        #[case] expected: IdentifierValidationError,
    ) {
        assert_eq!(LedgerIdentity::new(raw), Err(expected));
    }

    #[rstest]
    fn challenge_id_zero_is_rejected() {
        assert_eq!(
            ChallengeId::new(0),
            Err(IdentifierValidationError::ZeroChallengeId)
        );
    }

    #[rstest]
    fn challenge_range_is_empty_for_zero_count() {
        assert_eq!(ChallengeId::range_to(0).count(), 0);
    }

    #[rstest]
    fn receipt_id_is_trimmed() {
        let receipt = ReceiptId::new("  0.0.9@1700000000.1 ").expect("valid receipt");
        assert_eq!(receipt.as_str(), "0.0.9@1700000000.1");
    }

    #[rstest]
    #[case("0.0.4567", Some((0, 0, 4567)))]
    #[case("1.2.3", Some((1, 2, 3)))]
    #[case("0.0", None)]
    #[case("0.0.1.2", None)]
    #[case("0.x.1", None)]
    #[case("0..1", None)]
    #[case("-1.0.1", None)]
    fn topic_id_parses_shard_realm_num(#[case] raw: &str, #[case] expected: Option<(u64, u64, u64)>) {
        let parsed = raw.parse::<TopicId>().ok();
        assert_eq!(
            parsed,
            expected.map(|(shard, realm, num)| TopicId::from_parts(shard, realm, num))
        );
    }

    #[rstest]
    fn topic_id_round_trips_through_display() {
        let topic: TopicId = "0.0.4567".parse().expect("valid topic");
        assert_eq!(topic.to_string(), "0.0.4567");
    }
}
