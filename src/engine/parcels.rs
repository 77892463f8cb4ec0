use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::agents;
use crate::engine::lifecycle::{self, StatusChange, BOOKING_NOTE};
use crate::engine::notifications::notify_in_app;
use crate::engine::query::{compose_parcel_view, paginate, Page, PageRequest, ParcelQuery};
use crate::engine::settings::{number_setting, MAX_PARCEL_WEIGHT};
use crate::engine::tracking_code::{
    generate_barcode, generate_tracking_id, qr_payload, reserve_tracking_id,
};
use crate::engine::validate;
use crate::error::AppError;
use crate::models::agent::AgentStatus;
use crate::models::parcel::{
    Parcel, ParcelPaymentType, ParcelSize, ParcelStatus, ParcelType, ParcelView, StatusEntry,
};
use crate::models::user::{Actor, Role};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParcelRequest {
    pub recipient_name: String,
    pub recipient_phone: String,
    pub pickup_address: String,
    pub delivery_address: String,
    pub parcel_size: ParcelSize,
    pub parcel_type: ParcelType,
    pub weight: f64,
    #[serde(default)]
    pub is_fragile: bool,
    #[serde(default)]
    pub requires_signature: bool,
    pub special_instructions: Option<String>,
    pub scheduled_pickup_date: Option<DateTime<Utc>>,
    pub scheduled_delivery_date: Option<DateTime<Utc>>,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    pub payment_type: ParcelPaymentType,
    pub cod_amount: Option<f64>,
    pub delivery_fee: f64,
}

/// Shipment, scheduling and commercial attributes; everything else on a
/// parcel changes only through the lifecycle.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParcelRequest {
    pub recipient_name: Option<String>,
    pub recipient_phone: Option<String>,
    pub pickup_address: Option<String>,
    pub delivery_address: Option<String>,
    pub parcel_size: Option<ParcelSize>,
    pub parcel_type: Option<ParcelType>,
    pub weight: Option<f64>,
    pub is_fragile: Option<bool>,
    pub requires_signature: Option<bool>,
    pub special_instructions: Option<String>,
    pub scheduled_pickup_date: Option<DateTime<Utc>>,
    pub scheduled_delivery_date: Option<DateTime<Utc>>,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    pub delivery_notes: Option<String>,
    pub payment_type: Option<ParcelPaymentType>,
    pub cod_amount: Option<f64>,
    pub delivery_fee: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: ParcelStatus,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub failure_reason: Option<String>,
    pub expected_version: Option<u64>,
    #[serde(default)]
    pub force: bool,
}

impl UpdateStatusRequest {
    pub fn into_change(self, actor: Uuid) -> StatusChange {
        StatusChange {
            status: self.status,
            actor,
            notes: validate::optional(self.notes),
            location: validate::optional(self.location),
            latitude: self.latitude,
            longitude: self.longitude,
            failure_reason: validate::optional(self.failure_reason),
            expected_version: self.expected_version,
            force: self.force,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignAgentRequest {
    pub agent_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelStats {
    pub total_parcels: usize,
    pub today_parcels: usize,
    pub cod_parcels: usize,
    pub total_cod_amount: f64,
    pub status_distribution: BTreeMap<ParcelStatus, usize>,
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("parcel {id} not found"))
}

fn max_weight(state: &AppState, weight: f64) -> Result<f64, AppError> {
    let weight = validate::positive("weight", weight)?;
    if let Some(limit) = number_setting(state, MAX_PARCEL_WEIGHT) {
        if weight > limit {
            return Err(AppError::BadRequest(format!(
                "weight {weight} exceeds the maximum of {limit}"
            )));
        }
    }
    Ok(weight)
}

/// Agent record id of an agent caller; `None` for everyone else.
fn agent_scope(state: &AppState, actor: &Actor) -> Result<Option<Uuid>, AppError> {
    match actor.role {
        Role::Agent => agents::agent_for_user(state, actor.user_id)
            .map(|agent| Some(agent.id))
            .map_err(|_| AppError::Forbidden("caller has no agent profile".to_string())),
        _ => Ok(None),
    }
}

/// Who may read or touch a parcel: admins always, customers their own,
/// agents the ones assigned to them.
pub fn ensure_access(state: &AppState, parcel: &Parcel, actor: &Actor) -> Result<(), AppError> {
    let allowed = match actor.role {
        Role::Admin => true,
        Role::Customer => parcel.customer_id == actor.user_id,
        Role::Agent => {
            let agent_id = agent_scope(state, actor)?;
            agent_id.is_some() && parcel.agent_id == agent_id
        }
    };

    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "parcel {} is not accessible to this caller",
            parcel.id
        )))
    }
}

pub fn create_parcel(
    state: &AppState,
    customer_id: Uuid,
    payload: CreateParcelRequest,
) -> Result<ParcelView, AppError> {
    if !state.users.contains_key(&customer_id) {
        return Err(AppError::NotFound(format!("customer {customer_id} not found")));
    }

    let recipient_name = validate::required("recipientName", &payload.recipient_name)?;
    let recipient_phone = validate::phone("recipientPhone", &payload.recipient_phone)?;
    let pickup_address = validate::required("pickupAddress", &payload.pickup_address)?;
    let delivery_address = validate::required("deliveryAddress", &payload.delivery_address)?;
    let weight = max_weight(state, payload.weight)?;
    let delivery_fee = validate::non_negative("deliveryFee", payload.delivery_fee)?;
    let cod_amount = match payload.payment_type {
        ParcelPaymentType::Prepaid => 0.0,
        ParcelPaymentType::Cod => {
            validate::non_negative("codAmount", payload.cod_amount.unwrap_or_default())?
        }
    };

    let id = Uuid::new_v4();
    let (tracking_id, collisions) = reserve_tracking_id(
        &state.tracking_index,
        id,
        state.tracking_id_max_attempts,
        generate_tracking_id,
    )?;
    if collisions > 0 {
        state
            .metrics
            .tracking_id_collisions_total
            .inc_by(u64::from(collisions));
    }

    let now = Utc::now();
    let parcel = Parcel {
        id,
        qr_code: qr_payload(&tracking_id),
        barcode: generate_barcode(),
        tracking_id,
        customer_id,
        agent_id: None,
        recipient_name,
        recipient_phone,
        pickup_address: pickup_address.clone(),
        delivery_address,
        parcel_size: payload.parcel_size,
        parcel_type: payload.parcel_type,
        weight,
        is_fragile: payload.is_fragile,
        requires_signature: payload.requires_signature,
        special_instructions: validate::optional(payload.special_instructions),
        scheduled_pickup_date: payload.scheduled_pickup_date,
        scheduled_delivery_date: payload.scheduled_delivery_date,
        estimated_delivery_time: payload.estimated_delivery_time,
        delivery_notes: None,
        payment_type: payload.payment_type,
        cod_amount,
        delivery_fee,
        status: ParcelStatus::Pending,
        status_history: vec![StatusEntry {
            status: ParcelStatus::Pending,
            timestamp: now,
            location: pickup_address,
            notes: BOOKING_NOTE.to_string(),
            updated_by: customer_id,
        }],
        current_location: None,
        picked_up_at: None,
        delivered_at: None,
        delivery_attempts: 0,
        failure_reason: None,
        version: 1,
        created_at: now,
        updated_at: now,
        seq: state.next_seq(),
    };

    state.parcels.insert(parcel.id, parcel.clone());
    state.metrics.parcels_created_total.inc();
    info!(
        parcel_id = %parcel.id,
        tracking_id = %parcel.tracking_id,
        customer_id = %customer_id,
        "parcel booked"
    );

    Ok(compose_parcel_view(state, parcel))
}

pub fn get_parcel(state: &AppState, id: Uuid) -> Result<Parcel, AppError> {
    state
        .parcels
        .get(&id)
        .map(|parcel| parcel.value().clone())
        .ok_or_else(|| not_found(id))
}

pub fn get_parcel_view(state: &AppState, id: Uuid, actor: &Actor) -> Result<ParcelView, AppError> {
    let parcel = get_parcel(state, id)?;
    if actor.role == Role::Customer {
        ensure_access(state, &parcel, actor)?;
    }
    Ok(compose_parcel_view(state, parcel))
}

pub fn find_by_tracking_id(state: &AppState, tracking_id: &str) -> Result<Parcel, AppError> {
    let id = state
        .tracking_index
        .get(tracking_id.trim())
        .map(|entry| *entry.value())
        .ok_or_else(|| AppError::NotFound(format!("parcel {tracking_id} not found")))?;
    get_parcel(state, id)
}

pub fn get_by_tracking_id(state: &AppState, tracking_id: &str) -> Result<ParcelView, AppError> {
    Ok(compose_parcel_view(
        state,
        find_by_tracking_id(state, tracking_id)?,
    ))
}

/// Runs `query`, then sorts, slices and composes the page.
pub fn list_parcels(
    state: &AppState,
    query: &ParcelQuery,
    request: &PageRequest,
) -> Result<Page<ParcelView>, AppError> {
    query.validate()?;

    let matching: Vec<Parcel> = state
        .parcels
        .iter()
        .filter(|entry| query.matches(entry.value()))
        .map(|entry| entry.value().clone())
        .collect();

    let page = paginate(matching, request)?;
    Ok(page.map(|parcel| compose_parcel_view(state, parcel)))
}

/// Parcels on the calling agent's books.
pub fn list_assigned(
    state: &AppState,
    agent_user_id: Uuid,
    query: ParcelQuery,
    request: &PageRequest,
) -> Result<Page<ParcelView>, AppError> {
    let agent = agents::agent_for_user(state, agent_user_id)?;
    list_parcels(state, &query.agent(agent.id), request)
}

pub fn update_parcel(
    state: &AppState,
    id: Uuid,
    payload: UpdateParcelRequest,
    actor: &Actor,
) -> Result<ParcelView, AppError> {
    let recipient_name = payload
        .recipient_name
        .as_deref()
        .map(|value| validate::required("recipientName", value))
        .transpose()?;
    let recipient_phone = payload
        .recipient_phone
        .as_deref()
        .map(|value| validate::phone("recipientPhone", value))
        .transpose()?;
    let pickup_address = payload
        .pickup_address
        .as_deref()
        .map(|value| validate::required("pickupAddress", value))
        .transpose()?;
    let delivery_address = payload
        .delivery_address
        .as_deref()
        .map(|value| validate::required("deliveryAddress", value))
        .transpose()?;
    let weight = payload
        .weight
        .map(|weight| max_weight(state, weight))
        .transpose()?;
    let cod_amount = payload
        .cod_amount
        .map(|amount| validate::non_negative("codAmount", amount))
        .transpose()?;
    let delivery_fee = payload
        .delivery_fee
        .map(|fee| validate::non_negative("deliveryFee", fee))
        .transpose()?;
    let scope = agent_scope(state, actor)?;

    let updated = {
        let mut parcel = state.parcels.get_mut(&id).ok_or_else(|| not_found(id))?;
        if scope.is_some() && parcel.agent_id != scope {
            return Err(AppError::Forbidden(format!(
                "parcel {id} is not assigned to this agent"
            )));
        }

        if let Some(value) = recipient_name {
            parcel.recipient_name = value;
        }
        if let Some(value) = recipient_phone {
            parcel.recipient_phone = value;
        }
        if let Some(value) = pickup_address {
            parcel.pickup_address = value;
        }
        if let Some(value) = delivery_address {
            parcel.delivery_address = value;
        }
        if let Some(value) = payload.parcel_size {
            parcel.parcel_size = value;
        }
        if let Some(value) = payload.parcel_type {
            parcel.parcel_type = value;
        }
        if let Some(value) = weight {
            parcel.weight = value;
        }
        if let Some(value) = payload.is_fragile {
            parcel.is_fragile = value;
        }
        if let Some(value) = payload.requires_signature {
            parcel.requires_signature = value;
        }
        if payload.special_instructions.is_some() {
            parcel.special_instructions = validate::optional(payload.special_instructions);
        }
        if payload.scheduled_pickup_date.is_some() {
            parcel.scheduled_pickup_date = payload.scheduled_pickup_date;
        }
        if payload.scheduled_delivery_date.is_some() {
            parcel.scheduled_delivery_date = payload.scheduled_delivery_date;
        }
        if payload.estimated_delivery_time.is_some() {
            parcel.estimated_delivery_time = payload.estimated_delivery_time;
        }
        if payload.delivery_notes.is_some() {
            parcel.delivery_notes = validate::optional(payload.delivery_notes);
        }
        if let Some(value) = payload.payment_type {
            parcel.payment_type = value;
        }
        if let Some(value) = delivery_fee {
            parcel.delivery_fee = value;
        }
        parcel.cod_amount = match parcel.payment_type {
            ParcelPaymentType::Prepaid => 0.0,
            ParcelPaymentType::Cod => cod_amount.unwrap_or(parcel.cod_amount),
        };

        parcel.version += 1;
        parcel.updated_at = Utc::now();
        parcel.clone()
    };

    info!(parcel_id = %id, version = updated.version, "parcel attributes updated");
    Ok(compose_parcel_view(state, updated))
}

pub fn delete_parcel(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let (_, parcel) = state.parcels.remove(&id).ok_or_else(|| not_found(id))?;
    state
        .tracking_index
        .remove_if(&parcel.tracking_id, |_, owner| *owner == id);
    info!(parcel_id = %id, tracking_id = %parcel.tracking_id, "parcel deleted");
    Ok(())
}

/// `Some(true)` for delivered, `Some(false)` for failed.
fn delivery_outcome(status: ParcelStatus) -> Option<bool> {
    match status {
        ParcelStatus::Delivered => Some(true),
        ParcelStatus::Failed => Some(false),
        _ => None,
    }
}

/// Moves a parcel through the lifecycle on behalf of `actor`.
///
/// The parcel entry stays locked for the whole read-check-write; agent
/// counters and the customer notification are updated after it is released.
pub fn update_status(
    state: &AppState,
    id: Uuid,
    change: StatusChange,
    actor: &Actor,
) -> Result<ParcelView, AppError> {
    if change.force && !actor.is_admin() {
        return Err(AppError::Forbidden(
            "only administrators may force a status change".to_string(),
        ));
    }
    let scope = agent_scope(state, actor)?;

    let (transition, parcel) = {
        let mut parcel = state.parcels.get_mut(&id).ok_or_else(|| not_found(id))?;
        if scope.is_some() && parcel.agent_id != scope {
            return Err(AppError::Forbidden(format!(
                "parcel {id} is not assigned to this agent"
            )));
        }

        let refused = !change.force && !lifecycle::can_transition(parcel.status, change.status);
        match lifecycle::apply_status(&mut parcel, change, Utc::now()) {
            Ok(transition) => (transition, parcel.clone()),
            Err(err) => {
                if refused {
                    state.metrics.rejected_transitions_total.inc();
                }
                warn!(parcel_id = %id, error = %err, "status change rejected");
                return Err(err);
            }
        }
    };

    state
        .metrics
        .status_transitions_total
        .with_label_values(&[transition.to.as_str()])
        .inc();
    if transition.forced {
        warn!(
            parcel_id = %id,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            actor = %actor.user_id,
            "status change forced past the transition table"
        );
    } else {
        info!(
            parcel_id = %id,
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            version = parcel.version,
            "parcel status changed"
        );
    }

    if let Some(agent_id) = parcel.agent_id {
        let before = delivery_outcome(transition.from);
        let after = delivery_outcome(transition.to);
        if before != after {
            if let Some(successful) = before {
                agents::retract_delivery_outcome(state, agent_id, successful);
            }
            if let Some(successful) = after {
                agents::record_delivery_outcome(state, agent_id, successful);
            }
        }
    }

    notify_in_app(
        state,
        parcel.customer_id,
        format!("Parcel {}", transition.to.as_str().replace('_', " ")),
        format!(
            "Your parcel {} is now {}",
            parcel.tracking_id,
            transition.to.as_str().replace('_', " ")
        ),
        Some(json!({
            "parcelId": parcel.id,
            "trackingId": parcel.tracking_id,
            "status": transition.to,
        })),
    );

    Ok(compose_parcel_view(state, parcel))
}

pub fn assign_agent(
    state: &AppState,
    parcel_id: Uuid,
    agent_id: Uuid,
) -> Result<ParcelView, AppError> {
    let agent = agents::get_agent(state, agent_id)?;
    if !agent.is_active || agent.status != AgentStatus::Available {
        return Err(AppError::Conflict(format!(
            "agent {agent_id} is not available for assignment"
        )));
    }

    let parcel = {
        let mut parcel = state
            .parcels
            .get_mut(&parcel_id)
            .ok_or_else(|| not_found(parcel_id))?;
        lifecycle::record_assignment(&mut parcel, agent.id, agent.user_id, Utc::now())?;
        parcel.clone()
    };

    state.metrics.agent_assignments_total.inc();
    state
        .metrics
        .status_transitions_total
        .with_label_values(&[ParcelStatus::Assigned.as_str()])
        .inc();
    info!(
        parcel_id = %parcel_id,
        agent_id = %agent_id,
        tracking_id = %parcel.tracking_id,
        "agent assigned"
    );

    let metadata = json!({
        "parcelId": parcel.id,
        "trackingId": parcel.tracking_id,
        "agentId": agent.id,
    });
    notify_in_app(
        state,
        parcel.customer_id,
        "Parcel assigned",
        format!("A delivery agent has been assigned to parcel {}", parcel.tracking_id),
        Some(metadata.clone()),
    );
    notify_in_app(
        state,
        agent.user_id,
        "New delivery assigned",
        format!("Pick up parcel {} at {}", parcel.tracking_id, parcel.pickup_address),
        Some(metadata),
    );

    Ok(compose_parcel_view(state, parcel))
}

pub fn parcel_stats(state: &AppState) -> ParcelStats {
    let today = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc());

    let mut stats = ParcelStats {
        total_parcels: 0,
        today_parcels: 0,
        cod_parcels: 0,
        total_cod_amount: 0.0,
        status_distribution: BTreeMap::new(),
    };

    for entry in state.parcels.iter() {
        let parcel = entry.value();
        stats.total_parcels += 1;
        if today.is_some_and(|today| parcel.created_at >= today) {
            stats.today_parcels += 1;
        }
        if parcel.payment_type == ParcelPaymentType::Cod {
            stats.cod_parcels += 1;
            if parcel.status == ParcelStatus::Delivered {
                stats.total_cod_amount += parcel.cod_amount;
            }
        }
        *stats.status_distribution.entry(parcel.status).or_default() += 1;
    }

    stats
}
