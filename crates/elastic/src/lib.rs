//! Elasticsearch sink for transit-tracks.

pub mod bulk;
pub mod client;
pub mod config;
pub mod health;
pub mod schema;

pub use bulk::*;
pub use client::*;
pub use config::*;
pub use health::{ensure_index, IndexSetup, SetupPolicy};
