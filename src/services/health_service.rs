use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the roster store and report the service health.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.store().health_check().await {
        Ok(()) => HealthResponse::ok(),
        Err(err) => {
            warn!(error = %err, "roster storage health check failed");
            HealthResponse::storage_unreachable()
        }
    }
}
