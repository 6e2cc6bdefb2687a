use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report the degraded flag and open streams, pinging storage on the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.match_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        None => warn!("storage unavailable (degraded mode)"),
    }

    let active_matches = state.sync().active_matches();
    if state.is_degraded() {
        HealthResponse::degraded(active_matches)
    } else {
        HealthResponse::ok(active_matches)
    }
}
