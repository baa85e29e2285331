//! Cache reconciliation for ledger-anchored fitness activity.
//!
//! The `domain` module holds the services and the ports they depend on;
//! `outbound` holds the adapters the binary wires together.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

pub mod config;
pub mod domain;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
