use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub neo4j: &'static str,
}

/// GET / - service banner
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Knowledge Graph AI Agent API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /health - 503 when Neo4j does not answer
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    match state.graph.ping().await {
        Ok(()) => Ok(Json(HealthResponse {
            status: "healthy",
            neo4j: "connected",
        })),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            Err(ApiError::Unavailable(format!("Service unhealthy: {e}")))
        }
    }
}
