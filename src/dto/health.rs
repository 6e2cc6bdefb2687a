use serde::Serialize;
use utoipa::ToSchema;

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Writes are refused until storage comes back.
    pub degraded: bool,
    /// Matches with at least one open event stream.
    pub active_matches: usize,
}

impl HealthResponse {
    /// Storage reachable and accepting writes.
    pub fn ok(active_matches: usize) -> Self {
        Self {
            status: "ok".to_string(),
            degraded: false,
            active_matches,
        }
    }

    /// Storage unavailable; reads and writes fail fast.
    pub fn degraded(active_matches: usize) -> Self {
        Self {
            status: "degraded".to_string(),
            degraded: true,
            active_matches,
        }
    }
}
