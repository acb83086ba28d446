pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::results::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Resume results
        .route(
            "/api/v1/resumes",
            get(handlers::handle_list).post(handlers::handle_upsert),
        )
        .route("/api/v1/resumes/latest", get(handlers::handle_latest))
        .route(
            "/api/v1/resumes/hash/:hash",
            get(handlers::handle_get_by_hash),
        )
        .route(
            "/api/v1/resumes/hash/:hash/results",
            get(handlers::handle_get_results),
        )
        // Reconciliation
        .route("/api/v1/resumes/reconcile", post(handlers::handle_reconcile))
        .with_state(state)
}
