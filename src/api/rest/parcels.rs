use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::auth::require;
use crate::api::rest::extract::{JsonBody, PathParam, QueryParams};
use crate::engine::parcels::{
    self, AssignAgentRequest, CreateParcelRequest, ParcelStats, UpdateParcelRequest,
    UpdateStatusRequest,
};
use crate::engine::query::{Page, PaginationParams, ParcelQuery};
use crate::error::AppError;
use crate::models::parcel::{ParcelStatus, ParcelView};
use crate::models::user::{Actor, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/parcels", get(list_parcels).post(create_parcel))
        .route("/parcels/my-parcels", get(my_parcels))
        .route("/parcels/assigned", get(assigned_parcels))
        .route("/parcels/stats", get(parcel_stats))
        .route("/parcels/track/:tracking_id", get(track_parcel))
        .route(
            "/parcels/:id",
            get(get_parcel).patch(update_parcel).delete(delete_parcel),
        )
        .route("/parcels/:id/status", patch(update_status))
        .route("/parcels/:id/assign-agent", patch(assign_agent))
}

/// Filters accepted next to the pagination parameters.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelListParams {
    pub status: Option<ParcelStatus>,
    pub customer_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl ParcelListParams {
    fn into_query(self, search: Option<&str>) -> ParcelQuery {
        let mut query = ParcelQuery::new()
            .search(search)
            .created_between(self.created_from, self.created_to);
        if let Some(status) = self.status {
            query = query.status(status);
        }
        if let Some(customer_id) = self.customer_id {
            query = query.customer(customer_id);
        }
        if let Some(agent_id) = self.agent_id {
            query = query.agent(agent_id);
        }
        query
    }
}

async fn create_parcel(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    JsonBody(payload): JsonBody<CreateParcelRequest>,
) -> Result<(StatusCode, Json<ParcelView>), AppError> {
    require(&actor, &[Role::Customer])?;
    let parcel = parcels::create_parcel(&state, actor.user_id, payload)?;
    Ok((StatusCode::CREATED, Json(parcel)))
}

async fn list_parcels(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    QueryParams(page): QueryParams<PaginationParams>,
    QueryParams(filters): QueryParams<ParcelListParams>,
) -> Result<Json<Page<ParcelView>>, AppError> {
    require(&actor, &[Role::Admin, Role::Agent])?;
    let request = page.validate()?;
    let query = filters.into_query(request.search.as_deref());
    Ok(Json(parcels::list_parcels(&state, &query, &request)?))
}

async fn my_parcels(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    QueryParams(page): QueryParams<PaginationParams>,
    QueryParams(filters): QueryParams<ParcelListParams>,
) -> Result<Json<Page<ParcelView>>, AppError> {
    require(&actor, &[Role::Customer])?;
    let request = page.validate()?;
    let query = ParcelListParams {
        customer_id: None,
        agent_id: None,
        ..filters
    }
    .into_query(request.search.as_deref())
    .customer(actor.user_id);
    Ok(Json(parcels::list_parcels(&state, &query, &request)?))
}

async fn assigned_parcels(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    QueryParams(page): QueryParams<PaginationParams>,
    QueryParams(filters): QueryParams<ParcelListParams>,
) -> Result<Json<Page<ParcelView>>, AppError> {
    require(&actor, &[Role::Agent])?;
    let request = page.validate()?;
    let query = ParcelListParams {
        customer_id: None,
        agent_id: None,
        ..filters
    }
    .into_query(request.search.as_deref());
    Ok(Json(parcels::list_assigned(
        &state,
        actor.user_id,
        query,
        &request,
    )?))
}

async fn parcel_stats(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<ParcelStats>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(parcels::parcel_stats(&state)))
}

async fn track_parcel(
    State(state): State<Arc<AppState>>,
    PathParam(tracking_id): PathParam<String>,
) -> Result<Json<ParcelView>, AppError> {
    Ok(Json(parcels::get_by_tracking_id(&state, &tracking_id)?))
}

async fn get_parcel(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<ParcelView>, AppError> {
    Ok(Json(parcels::get_parcel_view(&state, id, &actor)?))
}

async fn update_parcel(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateParcelRequest>,
) -> Result<Json<ParcelView>, AppError> {
    require(&actor, &[Role::Admin, Role::Agent])?;
    Ok(Json(parcels::update_parcel(&state, id, payload, &actor)?))
}

async fn delete_parcel(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
) -> Result<StatusCode, AppError> {
    require(&actor, &[Role::Admin])?;
    parcels::delete_parcel(&state, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateStatusRequest>,
) -> Result<Json<ParcelView>, AppError> {
    require(&actor, &[Role::Admin, Role::Agent])?;
    let change = payload.into_change(actor.user_id);
    Ok(Json(parcels::update_status(&state, id, change, &actor)?))
}

async fn assign_agent(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<AssignAgentRequest>,
) -> Result<Json<ParcelView>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(parcels::assign_agent(&state, id, payload.agent_id)?))
}
