//! Outbound adapters for metrics exporting.
//!
//! Prometheus-backed implementations of the sync metrics port, compiled only
//! with the `metrics` feature.

mod prometheus_sync;

pub use prometheus_sync::PrometheusSyncMetrics;
