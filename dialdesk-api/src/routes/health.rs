/// Health check endpoint
///
/// ```text
/// GET /health
/// ```
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "database": "connected",
///   "redis": "disabled",
///   "ws_clients": 3
/// }
/// ```
///
/// `status` is `degraded` when the database or an enabled Redis bridge is
/// unreachable. The endpoint itself always answers 200 so load balancers can
/// tell a slow dependency from a dead process.

use crate::app::AppState;
use axum::{extract::State, Json};
use dialdesk_shared::db::pool::health_check as db_health_check;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,

    /// `connected`, `disconnected` or `disabled`
    pub redis: String,

    /// Open WebSocket connections in this process
    pub ws_clients: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_ok = db_health_check(&state.db).await.is_ok();

    let redis = match &state.redis {
        None => "disabled",
        Some(client) => match client.ping().await {
            Ok(true) => "connected",
            Ok(false) => "disconnected",
            Err(e) => {
                tracing::warn!(error = %e, "Redis health check failed");
                "disconnected"
            }
        },
    };

    let healthy = database_ok && redis != "disconnected";

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if database_ok { "connected" } else { "disconnected" }.to_string(),
        redis: redis.to_string(),
        ws_clients: state.hub.receiver_count(),
    })
}
