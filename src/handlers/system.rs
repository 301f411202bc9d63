// ---------------------------------------------------------------------------
// handlers/system.rs - Unauthenticated liveness endpoints
// ---------------------------------------------------------------------------

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServiceStatus {
    pub service: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[utoipa::path(get, path = "/", tag = "health",
    responses((status = 200, description = "Service name and status", body = ServiceStatus))
)]
pub async fn root(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(ServiceStatus {
        service: state.kind.server_name().to_string(),
        status: "ok".to_string(),
    })
}

/// GET /healthz - liveness probe for the managed platform (no auth, no upstream calls).
#[utoipa::path(get, path = "/healthz", tag = "health",
    responses((status = 200, description = "Process is running", body = HealthResponse))
)]
pub async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
