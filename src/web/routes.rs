use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

// Liveness probe, outside the API prefix
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(handlers::api::health))
}

// API Routes - REST API for the plan browser
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Browsing
            .route("/collections", get(handlers::api::list_collections))
            .route("/plans", get(handlers::api::list_plans))
            .route("/plans/{id}/detail", get(handlers::api::plan_detail))
            .route("/search", get(handlers::api::search_plans))

            // Statistics
            .route("/stats/basic", get(handlers::api::basic_stats))
            .route("/stats/slow-sql", get(handlers::api::slow_sql_stats))
            .route("/stats/slow-sql-list", get(handlers::api::slow_sql_list))
            .route("/stats/summary", get(handlers::api::summary_stats))
            .route("/stats/plan-shape", get(handlers::api::plan_shape_stats))

            // Analysis
            .route("/analysis/compare", post(handlers::api::compare_plans))

            // System status
            .route("/status", get(handlers::api::system_status)),
    )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health_routes())
        .merge(api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
