//! HTTP endpoints exposing loop health and metrics.

pub mod config;
pub mod response;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use routes::router;
pub use state::AppState;
