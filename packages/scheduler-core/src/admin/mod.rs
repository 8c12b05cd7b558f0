//! Admin HTTP API (C4.9 / §6): CRUD over cron definitions, execution
//! inspection/retry, health and readiness.

mod crons;
mod dto;
mod error;
mod health;
mod jobs;
mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::pool::Database;
use crate::handlers::HandlerRegistry;

pub use state::AppState;

/// Builds the router. Every mutating route runs through the single-DB
/// transaction runner (§4.3) so a validation failure after a partial write
/// cannot leave a half-written row.
pub fn build_router(db: Arc<Database>, handlers: Arc<HandlerRegistry>) -> Router {
    let state = AppState { db, handlers };

    Router::new()
        .route("/crons", get(crons::list_crons).post(crons::create_cron))
        .route(
            "/crons/:id",
            get(crons::get_cron).put(crons::update_cron).delete(crons::delete_cron),
        )
        .route("/crons/:id/toggle", post(crons::toggle_cron))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job).delete(jobs::delete_job))
        .route("/jobs/:id/retry", post(jobs::retry_job))
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
