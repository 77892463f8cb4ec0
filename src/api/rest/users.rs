use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::api::rest::auth::{require, require_self_or_admin};
use crate::api::rest::extract::{JsonBody, PathParam, QueryParams};
use crate::engine::query::{Page, PaginationParams};
use crate::engine::users::{self, CreateUserRequest, UpdateUserRequest, UserStats};
use crate::error::AppError;
use crate::models::user::{Actor, Role, User};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/stats", get(user_stats))
        .route(
            "/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    JsonBody(payload): JsonBody<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    require(&actor, &[Role::Admin])?;
    let user = users::create_user(&state, payload)?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    QueryParams(params): QueryParams<PaginationParams>,
) -> Result<Json<Page<User>>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(users::list_users(&state, &params.validate()?)?))
}

async fn user_stats(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<UserStats>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(users::user_stats(&state)))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<User>, AppError> {
    require_self_or_admin(&actor, id)?;
    Ok(Json(users::get_user(&state, id)?))
}

async fn update_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    require_self_or_admin(&actor, id)?;
    if payload.touches_privileged_fields() && !actor.is_admin() {
        return Err(AppError::Forbidden(
            "only administrators may change role, status or verification".to_string(),
        ));
    }
    Ok(Json(users::update_user(&state, id, payload)?))
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
) -> Result<StatusCode, AppError> {
    require(&actor, &[Role::Admin])?;
    users::delete_user(&state, id)?;
    Ok(StatusCode::NO_CONTENT)
}
