//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **ledger_gateway**: reqwest client for the ledger's JSON gateway
//! - **mirror_node**: reqwest client reading topic messages
//! - **persistence**: PostgreSQL-backed repositories using Diesel ORM
//! - **metrics**: Prometheus-backed metrics exporters (feature-gated)
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod ledger_gateway;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod mirror_node;
pub mod persistence;
