//! TriMet vehicles API client for transit-tracks.

pub mod config;
pub mod fetcher;
pub mod health;

pub use config::*;
pub use fetcher::*;
