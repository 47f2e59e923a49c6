//! Management API handlers.
//!
//! This is the write/management surface behind the dashboard. Errors are
//! surfaced as user-visible rejections, in contrast to the hot redirect
//! path which swallows everything infrastructure-shaped.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::analytics::device::display_referer;
use crate::links::{CreateLink, LinkService, LinkServiceError};
use crate::models::LinkUpdate;
use crate::resolver::LinkResolver;
use crate::storage::LinkStore;

pub struct ApiState {
    pub service: Arc<LinkService>,
    pub resolver: Arc<LinkResolver>,
    pub store: Arc<dyn LinkStore>,
}

fn service_error_response(err: LinkServiceError) -> Response {
    let status = match &err {
        LinkServiceError::AliasTaken(_) => StatusCode::CONFLICT,
        LinkServiceError::NotFound => StatusCode::NOT_FOUND,
        LinkServiceError::UnknownOwner(_) => StatusCode::BAD_REQUEST,
        LinkServiceError::PasswordRequiresPaidPlan | LinkServiceError::LinkLimitReached(_) => {
            StatusCode::FORBIDDEN
        }
        LinkServiceError::Other(inner) => {
            tracing::error!(error = %inner, "link mutation failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response();
        }
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

pub async fn create_link(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<CreateLink>,
) -> Response {
    match state.service.create(req).await {
        Ok(link) => (StatusCode::CREATED, Json(link)).into_response(),
        Err(err) => service_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub domain: String,
    pub alias: String,
}

/// Metadata-preview resolution: same lookup as the redirect path but with no
/// analytics side-effect.
pub async fn preview_link(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ResolveQuery>,
) -> Response {
    match state.resolver.resolve(&query.domain, &query.alias).await {
        Ok(Some(resolution)) => Json(resolution.link).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "link not found" })),
        )
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "preview resolution failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}

/// Partial update. Fields present in the body are set, absent fields stay
/// untouched. Nullable columns cannot be cleared here; the password has its
/// own endpoint for that.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateLinkBody {
    pub alias: Option<String>,
    pub domain: Option<String>,
    pub url: Option<String>,
    pub disabled: Option<bool>,
    pub archived: Option<bool>,
    pub folder_id: Option<i64>,
    pub disable_after_clicks: Option<i64>,
    pub disable_after_date: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

impl From<UpdateLinkBody> for LinkUpdate {
    fn from(body: UpdateLinkBody) -> Self {
        LinkUpdate {
            alias: body.alias,
            domain: body.domain,
            url: body.url,
            password_hash: None,
            disabled: body.disabled,
            archived: body.archived,
            folder_id: body.folder_id.map(Some),
            disable_after_clicks: body.disable_after_clicks.map(Some),
            disable_after_date: body.disable_after_date.map(Some),
            title: body.title.map(Some),
            description: body.description.map(Some),
            image: body.image.map(Some),
        }
    }
}

pub async fn update_link(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateLinkBody>,
) -> Response {
    match state.service.update(id, body.into()).await {
        Ok(link) => Json(link).into_response(),
        Err(err) => service_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordBody {
    /// `null` removes the password.
    pub password: Option<String>,
}

pub async fn set_link_password(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
    Json(body): Json<SetPasswordBody>,
) -> Response {
    match state
        .service
        .set_password(id, body.password.as_deref())
        .await
    {
        Ok(link) => Json(link).into_response(),
        Err(err) => service_error_response(err),
    }
}

pub async fn delete_link(State(state): State<Arc<ApiState>>, Path(id): Path<i64>) -> Response {
    match state.service.delete(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => service_error_response(err),
    }
}

pub async fn reset_link_statistics(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Response {
    match state.service.reset_statistics(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => service_error_response(err),
    }
}

#[derive(Debug, Serialize)]
pub struct LinkStats {
    pub total_visits: i64,
    pub unique_visits: i64,
    pub referers: Vec<RefererCount>,
    pub recent_visits: Vec<crate::models::LinkVisit>,
}

#[derive(Debug, Serialize)]
pub struct RefererCount {
    pub referer: String,
    pub visits: i64,
}

/// Visit statistics for one link, reading the rows the ingestion pipeline
/// wrote. Referers are normalized for display here, not at extraction time.
pub async fn link_statistics(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i64>,
) -> Response {
    let stats = async {
        let total_visits = state.store.visit_count(id).await?;
        let unique_visits = state.store.unique_visit_count(id).await?;
        let referers = state
            .store
            .referer_counts(id)
            .await?
            .into_iter()
            .map(|(referer, visits)| RefererCount {
                referer: display_referer(referer.as_deref()).to_string(),
                visits,
            })
            .collect();
        let recent_visits = state.store.recent_visits(id, 50).await?;
        anyhow::Ok(LinkStats {
            total_visits,
            unique_visits,
            referers,
            recent_visits,
        })
    }
    .await;

    match stats {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => {
            tracing::error!(link_id = id, error = %err, "failed to load statistics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}
