use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the healthcheck endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: String,
    /// Roster storage backend status.
    pub storage: String,
}

impl HealthResponse {
    /// Everything reachable.
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
            storage: "ok".into(),
        }
    }

    /// Service up, storage backend unreachable.
    pub fn storage_unreachable() -> Self {
        Self {
            status: "degraded".into(),
            storage: "unreachable".into(),
        }
    }
}
