//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod activity_cache_repository;
mod challenge_definition_repository;
mod ledger_client;
mod log_client;
mod sync_metrics;

#[cfg(test)]
pub use activity_cache_repository::MockActivityCacheRepository;
pub use activity_cache_repository::{
    ActivityCacheRepository, ActivityCacheRepositoryError, FixtureActivityCacheRepository,
};
#[cfg(test)]
pub use challenge_definition_repository::MockChallengeDefinitionRepository;
pub use challenge_definition_repository::{
    ChallengeDefinitionRepository, ChallengeDefinitionRepositoryError,
    FixtureChallengeDefinitionRepository,
};
#[cfg(test)]
pub use ledger_client::MockLedgerClient;
pub use ledger_client::{DeltaReceipt, FixtureLedgerClient, LedgerClient, LedgerClientError};
#[cfg(test)]
pub use log_client::MockLogClient;
pub use log_client::{FixtureLogClient, LogClient, LogClientError, MessageDecodeError};
#[cfg(test)]
pub use sync_metrics::MockSyncMetrics;
pub use sync_metrics::{
    ChallengeSyncMetric, LogRefreshMetric, LogRefreshStatus, NoOpSyncMetrics, ReconcileMetric,
    ReconcileStatus, SyncMetrics, SyncMetricsError,
};
