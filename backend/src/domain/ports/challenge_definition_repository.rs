//! Driven port for the challenge definition mirror.

use async_trait::async_trait;

use super::define_port_error;
use crate::domain::ChallengeDefinition;

define_port_error! {
    /// Errors raised by challenge definition adapters.
    pub enum ChallengeDefinitionRepositoryError {
        /// Storage could not be reached.
        Connection { message: String } =>
            "challenge definition connection failed: {message}",
        /// Storage rejected or failed the statement.
        Query { message: String } =>
            "challenge definition query failed: {message}",
    }
    transient: [Connection]
}

/// Port for the local read replica of ledger challenge definitions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChallengeDefinitionRepository: Send + Sync {
    /// Insert or replace one definition keyed by its id.
    async fn upsert_definition(
        &self,
        definition: &ChallengeDefinition,
    ) -> Result<(), ChallengeDefinitionRepositoryError>;

    /// All mirrored definitions ordered by id.
    async fn list_definitions(
        &self,
    ) -> Result<Vec<ChallengeDefinition>, ChallengeDefinitionRepositoryError>;
}

/// Fixture repository with an empty mirror.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixtureChallengeDefinitionRepository;

#[async_trait]
impl ChallengeDefinitionRepository for FixtureChallengeDefinitionRepository {
    async fn upsert_definition(
        &self,
        _definition: &ChallengeDefinition,
    ) -> Result<(), ChallengeDefinitionRepositoryError> {
        Ok(())
    }

    async fn list_definitions(
        &self,
    ) -> Result<Vec<ChallengeDefinition>, ChallengeDefinitionRepositoryError> {
        Ok(Vec::new())
    }
}
