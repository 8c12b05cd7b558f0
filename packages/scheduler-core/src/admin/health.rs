//! `/health` (liveness) and `/ready` (readiness) routes (§6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::state::AppState;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    pool_size: u32,
    idle_connections: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    let pool = state.db.pool();
    Json(HealthBody {
        status: "ok",
        pool_size: pool.size(),
        idle_connections: pool.num_idle(),
    })
}

pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match sqlx::query("SELECT 1").execute(state.db.pool()).await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({ "status": "ready" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not ready", "error": e.to_string() })),
        ),
    }
}
