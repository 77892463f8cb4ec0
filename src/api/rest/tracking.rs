use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::api::rest::auth::require;
use crate::api::rest::extract::{JsonBody, PathParam};
use crate::engine::tracking::{self, AgentRoute, ParcelLocationRequest, TrackingView};
use crate::error::AppError;
use crate::models::location::LocationFix;
use crate::models::user::{Actor, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking/:tracking_id", get(track))
        .route("/tracking/parcels/:id/location", patch(update_parcel_location))
        .route("/tracking/agents/:id/route", get(agent_route))
}

async fn track(
    State(state): State<Arc<AppState>>,
    PathParam(tracking_id): PathParam<String>,
) -> Result<Json<TrackingView>, AppError> {
    Ok(Json(tracking::track(&state, &tracking_id)?))
}

async fn update_parcel_location(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<ParcelLocationRequest>,
) -> Result<Json<LocationFix>, AppError> {
    require(&actor, &[Role::Agent, Role::Admin])?;
    Ok(Json(tracking::update_parcel_location(
        &state, id, payload, &actor,
    )?))
}

async fn agent_route(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<AgentRoute>, AppError> {
    require(&actor, &[Role::Agent, Role::Admin])?;
    Ok(Json(tracking::agent_route(&state, id, &actor)?))
}
