//! Mirror node outbound adapter for reading topic messages.

mod dto;
mod http_source;

pub use http_source::{MirrorNodeConfig, MirrorNodeLogClient};
