use axum::{
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers::{self, ApiState};

pub fn create_api_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/links", post(handlers::create_link))
        .route("/api/links/resolve", get(handlers::preview_link))
        .route(
            "/api/links/{id}",
            patch(handlers::update_link).delete(handlers::delete_link),
        )
        .route("/api/links/{id}/password", put(handlers::set_link_password))
        .route(
            "/api/links/{id}/reset-stats",
            post(handlers::reset_link_statistics),
        )
        .route("/api/links/{id}/stats", get(handlers::link_statistics))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
