use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::Json;
use axum::Router;
use uuid::Uuid;

use crate::api::rest::auth::require;
use crate::api::rest::extract::{JsonBody, PathParam, QueryParams};
use crate::engine::payments::{
    self, CreatePaymentRequest, FailPaymentRequest, PaymentStats, RefundPaymentRequest,
};
use crate::engine::query::{Page, PaginationParams};
use crate::error::AppError;
use crate::models::payment::PaymentView;
use crate::models::user::{Actor, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments", get(list_payments).post(create_payment))
        .route("/payments/stats", get(payment_stats))
        .route("/payments/:id/confirm", patch(confirm_payment))
        .route("/payments/:id/fail", patch(fail_payment))
        .route("/payments/:id/refund", patch(refund_payment))
}

async fn create_payment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    JsonBody(payload): JsonBody<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentView>), AppError> {
    require(&actor, &[Role::Customer])?;
    let payment = payments::create_payment(&state, actor.user_id, payload)?;
    Ok((StatusCode::CREATED, Json(payment)))
}

async fn list_payments(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    QueryParams(params): QueryParams<PaginationParams>,
) -> Result<Json<Page<PaymentView>>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(payments::list_payments(&state, &params.validate()?)?))
}

async fn payment_stats(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<PaymentStats>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(payments::payment_stats(&state)))
}

async fn confirm_payment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<PaymentView>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(payments::confirm_payment(&state, id)?))
}

async fn fail_payment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<FailPaymentRequest>,
) -> Result<Json<PaymentView>, AppError> {
    require(&actor, &[Role::Admin])?;
    Ok(Json(payments::fail_payment(&state, id, &payload.reason)?))
}

async fn refund_payment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    PathParam(id): PathParam<Uuid>,
    body: Bytes,
) -> Result<Json<PaymentView>, AppError> {
    require(&actor, &[Role::Admin])?;
    // An empty body refunds the full amount.
    let payload: RefundPaymentRequest = if body.is_empty() {
        RefundPaymentRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| AppError::BadRequest(format!("invalid refund body: {err}")))?
    };
    Ok(Json(payments::refund_payment(&state, id, payload.amount)?))
}
