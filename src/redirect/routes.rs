use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{self, RedirectState};

pub fn create_redirect_router(state: Arc<RedirectState>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health_check))
        .route("/unlock", post(handlers::unlock_link))
        .route("/{alias}", get(handlers::redirect_link))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
