//! TriMet reachability check.

use crate::fetcher::VehicleFetcher;
use tracing::{debug, error};

/// Check that the vehicles endpoint answers with a well-formed response.
pub async fn check_connection(fetcher: &dyn VehicleFetcher) -> bool {
    match fetcher.fetch().await {
        Ok(vehicles) => {
            debug!(vehicles = vehicles.len(), "TriMet connection healthy");
            true
        }
        Err(e) => {
            error!(code = e.code(), "TriMet health check failed: {}", e);
            false
        }
    }
}
