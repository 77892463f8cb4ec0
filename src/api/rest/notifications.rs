use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use serde::Serialize;
use uuid::Uuid;

use crate::api::rest::auth::require;
use crate::api::rest::extract::{JsonBody, PathParam, QueryParams};
use crate::engine::notifications::{self, CreateNotificationRequest, UnreadCount};
use crate::engine::query::{Page, PaginationParams};
use crate::error::AppError;
use crate::models::notification::Notification;
use crate::models::user::{Actor, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/notifications",
            get(list_notifications).post(create_notification),
        )
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/mark-all-read", patch(mark_all_read))
        .route("/notifications/:id/read", patch(mark_read))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MarkAllReadResponse {
    updated: usize,
}

async fn create_notification(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    JsonBody(payload): JsonBody<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<Notification>), AppError> {
    require(&actor, &[Role::Admin])?;
    let notification = notifications::create_notification(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    QueryParams(params): QueryParams<PaginationParams>,
) -> Result<Json<Page<Notification>>, AppError> {
    Ok(Json(notifications::list_for_user(
        &state,
        actor.user_id,
        &params.validate()?,
    )?))
}

async fn unread_count(State(state): State<Arc<AppState>>, actor: Actor) -> Json<UnreadCount> {
    Json(notifications::unread_count(&state, actor.user_id))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Notification>, AppError> {
    Ok(Json(notifications::mark_read(
        &state,
        id,
        actor.user_id,
        actor.is_admin(),
    )?))
}

async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Json<MarkAllReadResponse> {
    Json(MarkAllReadResponse {
        updated: notifications::mark_all_read(&state, actor.user_id),
    })
}
