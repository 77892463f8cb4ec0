use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::api::rest::auth::require;
use crate::api::rest::extract::QueryParams;
use crate::engine::analytics::{
    self, AgentPerformance, Dashboard, FailedDeliveryAnalysis, ParcelAnalytics,
    RevenueAnalytics, TopCustomer,
};
use crate::error::AppError;
use crate::models::user::{Actor, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analytics/dashboard", get(dashboard))
        .route("/analytics/parcels", get(parcel_analytics))
        .route("/analytics/revenue", get(revenue_analytics))
        .route("/analytics/agents/performance", get(agent_performance))
        .route("/analytics/customers/top", get(top_customers))
        .route("/analytics/failed-deliveries", get(failed_deliveries))
}

#[derive(Debug, Deserialize)]
struct DaysParams {
    days: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    limit: Option<u32>,
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Dashboard>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(analytics::dashboard(&state)))
}

async fn parcel_analytics(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    QueryParams(params): QueryParams<DaysParams>,
) -> Result<Json<ParcelAnalytics>, AppError> {
    require(&actor, &[Role::Admin])?;
    let days = analytics::validate_days(params.days)?;
    Ok(Json(analytics::parcel_analytics(&state, days)))
}

async fn revenue_analytics(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    QueryParams(params): QueryParams<DaysParams>,
) -> Result<Json<RevenueAnalytics>, AppError> {
    require(&actor, &[Role::Admin])?;
    let days = analytics::validate_days(params.days)?;
    Ok(Json(analytics::revenue_analytics(&state, days)))
}

async fn agent_performance(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<AgentPerformance>>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(analytics::agent_performance(&state)))
}

async fn top_customers(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    QueryParams(params): QueryParams<LimitParams>,
) -> Result<Json<Vec<TopCustomer>>, AppError> {
    require(&actor, &[Role::Admin])?;
    let limit = analytics::validate_top_limit(params.limit)?;
    Ok(Json(analytics::top_customers(&state, limit)))
}

async fn failed_deliveries(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<FailedDeliveryAnalysis>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(analytics::failed_deliveries(&state)))
}
