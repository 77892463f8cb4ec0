use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::Value;

use crate::api::rest::auth::require;
use crate::api::rest::extract::{JsonBody, PathParam, QueryParams};
use crate::engine::settings::{
    self, CreateSettingRequest, SettingFilter, UpdateSettingRequest,
};
use crate::error::AppError;
use crate::models::setting::Setting;
use crate::models::user::{Actor, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/settings", get(list_settings).post(create_setting))
        .route("/settings/public", get(public_settings))
        .route(
            "/settings/:key",
            get(get_setting).patch(update_setting).delete(delete_setting),
        )
        .route("/settings/:key/value", get(get_value).patch(set_value))
}

#[derive(Debug, Deserialize)]
struct SetValueRequest {
    value: Value,
}

async fn create_setting(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    JsonBody(payload): JsonBody<CreateSettingRequest>,
) -> Result<(StatusCode, Json<Setting>), AppError> {
    require(&actor, &[Role::Admin])?;
    let setting = settings::create_setting(&state, payload)?;
    Ok((StatusCode::CREATED, Json(setting)))
}

async fn list_settings(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    QueryParams(filter): QueryParams<SettingFilter>,
) -> Result<Json<Vec<Setting>>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(settings::list_settings(&state, &filter)))
}

async fn public_settings(State(state): State<Arc<AppState>>) -> Json<Vec<Setting>> {
    let filter = SettingFilter {
        category: None,
        is_public: Some(true),
    };
    Json(settings::list_settings(&state, &filter))
}

/// Private settings are admin-only; public ones are readable by anyone signed in.
fn ensure_readable(setting: &Setting, actor: &Actor) -> Result<(), AppError> {
    if setting.is_public || actor.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "setting {} is not public",
            setting.key
        )))
    }
}

async fn get_setting(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(key): PathParam<String>,
) -> Result<Json<Setting>, AppError> {
    let setting = settings::get_setting(&state, &key)?;
    ensure_readable(&setting, &actor)?;
    Ok(Json(setting))
}

async fn get_value(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(key): PathParam<String>,
) -> Result<Json<Value>, AppError> {
    let setting = settings::get_setting(&state, &key)?;
    ensure_readable(&setting, &actor)?;
    Ok(Json(settings::typed_value(setting.kind, &setting.value)?))
}

async fn update_setting(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(key): PathParam<String>,
    JsonBody(payload): JsonBody<UpdateSettingRequest>,
) -> Result<Json<Setting>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(settings::update_setting(&state, &key, payload)?))
}

async fn set_value(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(key): PathParam<String>,
    JsonBody(payload): JsonBody<SetValueRequest>,
) -> Result<Json<Setting>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(settings::set_value(&state, &key, payload.value)?))
}

async fn delete_setting(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(key): PathParam<String>,
) -> Result<StatusCode, AppError> {
    require(&actor, &[Role::Admin])?;
    settings::delete_setting(&state, &key)?;
    Ok(StatusCode::NO_CONTENT)
}
