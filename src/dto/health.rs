use serde::Serialize;
use utoipa::ToSchema;

/// Payload of `/healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while state writes are failing.
    pub status: HealthStatus,
    /// Number of live client sessions.
    pub sessions: usize,
    /// Unix millis of the last committed state change.
    pub updated_at: i64,
}

/// Coarse service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything is persisted.
    Ok,
    /// The last persistence attempt failed; state lives only in memory.
    Degraded,
}
