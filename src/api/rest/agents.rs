use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::auth::require;
use crate::api::rest::extract::{JsonBody, PathParam, QueryParams};
use crate::engine::agents::{
    self, AgentStats, CreateAgentRequest, UpdateAgentRequest, UpdateLocationRequest,
};
use crate::engine::query::{Page, PaginationParams};
use crate::error::AppError;
use crate::models::agent::{AgentStatus, AgentView};
use crate::models::user::{Actor, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/agents", get(list_agents).post(create_agent))
        .route("/agents/available", get(available_agents))
        .route("/agents/stats", get(agent_stats))
        .route("/agents/profile", get(own_profile))
        .route(
            "/agents/:id",
            get(get_agent).patch(update_agent).delete(delete_agent),
        )
        .route("/agents/:id/location", patch(update_location))
        .route("/agents/:id/status", patch(update_status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailableParams {
    service_area: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: AgentStatus,
}

/// Agents may only act on their own record.
fn ensure_own_record(state: &AppState, actor: &Actor, agent_id: Uuid) -> Result<(), AppError> {
    if actor.role != Role::Agent {
        return Ok(());
    }
    let own = agents::agent_for_user(state, actor.user_id)?;
    if own.id == agent_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "agents may only manage their own profile".to_string(),
        ))
    }
}

async fn create_agent(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    JsonBody(payload): JsonBody<CreateAgentRequest>,
) -> Result<(StatusCode, Json<AgentView>), AppError> {
    require(&actor, &[Role::Admin])?;
    let agent = agents::create_agent(&state, payload)?;
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn list_agents(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    QueryParams(params): QueryParams<PaginationParams>,
) -> Result<Json<Page<AgentView>>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(agents::list_agents(&state, &params.validate()?)?))
}

async fn available_agents(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    QueryParams(params): QueryParams<AvailableParams>,
) -> Result<Json<Vec<AgentView>>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(agents::available_agents(
        &state,
        params.service_area.as_deref(),
    )))
}

async fn agent_stats(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<AgentStats>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(agents::agent_stats(&state)))
}

async fn own_profile(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<AgentView>, AppError> {
    require(&actor, &[Role::Agent])?;
    let agent = agents::agent_for_user(&state, actor.user_id)?;
    Ok(Json(agents::get_agent_view(&state, agent.id)?))
}

async fn get_agent(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<AgentView>, AppError> {
    require(&actor, &[Role::Admin, Role::Agent])?;
    Ok(Json(agents::get_agent_view(&state, id)?))
}

async fn update_agent(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateAgentRequest>,
) -> Result<Json<AgentView>, AppError> {
    require(&actor, &[Role::Admin, Role::Agent])?;
    ensure_own_record(&state, &actor, id)?;
    if payload.is_active.is_some() && !actor.is_admin() {
        return Err(AppError::Forbidden(
            "only administrators may activate or deactivate agents".to_string(),
        ));
    }
    Ok(Json(agents::update_agent(&state, id, payload)?))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<UpdateLocationRequest>,
) -> Result<Json<AgentView>, AppError> {
    require(&actor, &[Role::Agent])?;
    ensure_own_record(&state, &actor, id)?;
    Ok(Json(agents::update_location(&state, id, payload)?))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<StatusRequest>,
) -> Result<Json<AgentView>, AppError> {
    require(&actor, &[Role::Agent])?;
    ensure_own_record(&state, &actor, id)?;
    Ok(Json(agents::update_status(&state, id, payload.status)?))
}

async fn delete_agent(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
) -> Result<StatusCode, AppError> {
    require(&actor, &[Role::Admin])?;
    agents::delete_agent(&state, id)?;
    Ok(StatusCode::NO_CONTENT)
}
