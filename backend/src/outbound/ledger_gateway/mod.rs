//! Ledger gateway outbound adapter.
//!
//! A thin reqwest implementation of the `LedgerClient` port against the
//! gateway's JSON REST surface.

mod dto;
mod http_client;

pub use http_client::LedgerGatewayClient;
