//! Test utilities for the fitledger crate.
//!
//! Shared doubles for unit tests (in `src/`) and integration tests (in
//! `tests/`). Compiled for tests or with the `test-support` feature.

pub mod clock;
pub mod ledger;
pub mod log;
pub mod repositories;
pub mod retry;

pub use clock::MutableClock;
pub use ledger::ScriptedLedger;
pub use log::{ScriptedLogClient, encoded_payload};
pub use repositories::{InMemoryActivityCache, InMemoryChallengeDefinitions, RecordingSyncMetrics};
pub use retry::{ImmediateSleeper, NoJitter, RecordingSleeper};
