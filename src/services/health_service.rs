use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::AppState,
};

/// Snapshot the service health; degraded while the last persistence attempt failed.
pub fn health_status(state: &AppState) -> HealthResponse {
    let status = if state.is_degraded() {
        warn!("state persistence failing, serving from memory");
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };
    HealthResponse {
        status,
        sessions: state.sessions().len(),
        updated_at: state.store().updated_at(),
    }
}
