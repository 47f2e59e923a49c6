use axum::{
    extract::{ConnectInfo, Path, State},
    http::{header::HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::analytics::RequestContext;
use crate::resolver::{LinkResolver, Liveness, Unlock};

pub struct RedirectState {
    pub resolver: Arc<LinkResolver>,
    /// Domain assumed when the Host header is missing or unreadable.
    pub default_domain: String,
}

/// Resolve an alias and redirect to its destination.
///
/// The domain comes from the Host header, the alias from the path. The
/// analytics side-effect is dispatched as a detached task; by the time it
/// runs the 307 is already on the wire.
pub async fn redirect_link(
    State(state): State<Arc<RedirectState>>,
    Path(alias): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let domain = request_domain(&headers, &state.default_domain);

    let resolution = match state.resolver.resolve(&domain, &alias).await {
        Ok(Some(resolution)) => resolution,
        Ok(None) => return (StatusCode::NOT_FOUND, "Short link not found").into_response(),
        Err(err) => {
            tracing::error!(%domain, %alias, error = %err, "resolution failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    };
    let link = resolution.link;

    // Protected links fork to the password gate; rendering the prompt is the
    // caller's concern, the destination stays hidden.
    if link.is_protected() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "password_required", "link_id": link.id })),
        )
            .into_response();
    }

    match state.resolver.liveness(&link).await {
        Ok(Liveness::Active) => {}
        Ok(_) => return (StatusCode::GONE, "This link is inactive").into_response(),
        Err(err) => {
            tracing::error!(link_id = link.id, error = %err, "liveness check failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    }

    let ctx = RequestContext::from_request(&headers, addr.ip());
    state.resolver.record_click(&link, ctx);

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        "x-ishortn-cache",
        HeaderValue::from_static(if resolution.cache_hit { "hit" } else { "miss" }),
    );

    (response_headers, Redirect::temporary(&link.url)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub id: i64,
    pub password: String,
}

/// Unlock a password-protected link.
///
/// A correct password on a live link reveals the destination and records
/// the click (the password entry is the visit). An incorrect one returns
/// 401 and an inactive link 410; neither writes analytics.
pub async fn unlock_link(
    State(state): State<Arc<RedirectState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<UnlockRequest>,
) -> Response {
    let ctx = RequestContext::from_request(&headers, addr.ip());

    match state
        .resolver
        .verify_password(req.id, &req.password, ctx)
        .await
    {
        Ok(Unlock::Revealed(link)) => Json(json!({ "url": link.url })).into_response(),
        Ok(Unlock::Denied) => (StatusCode::UNAUTHORIZED, "Incorrect password").into_response(),
        Ok(Unlock::Inactive) => (StatusCode::GONE, "This link is inactive").into_response(),
        Err(err) => {
            tracing::error!(link_id = req.id, error = %err, "password verification failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

/// Host header without the port, lowercased; falls back to the configured
/// default domain.
fn request_domain(headers: &HeaderMap, default_domain: &str) -> String {
    headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(|host| host.split(':').next().unwrap_or(host).to_ascii_lowercase())
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| default_domain.to_string())
}
