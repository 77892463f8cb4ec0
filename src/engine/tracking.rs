use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::agents;
use crate::engine::parcels::{ensure_access, find_by_tracking_id};
use crate::error::AppError;
use crate::models::location::LocationFix;
use crate::models::parcel::{ParcelStatus, StatusEntry};
use crate::models::user::{Actor, Role};
use crate::state::AppState;

/// What the public sees when looking up a tracking id.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingView {
    pub parcel_id: Uuid,
    pub tracking_id: String,
    pub status: ParcelStatus,
    pub current_location: Option<LocationFix>,
    pub agent_location: Option<LocationFix>,
    pub status_history: Vec<StatusEntry>,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stop {
    Pickup,
    Delivery,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    pub parcel_id: Uuid,
    pub tracking_id: String,
    pub stop: Stop,
    pub address: String,
    pub status: ParcelStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRoute {
    pub agent_id: Uuid,
    pub agent_location: Option<LocationFix>,
    pub stops: Vec<RouteStop>,
}

pub fn track(state: &AppState, tracking_id: &str) -> Result<TrackingView, AppError> {
    let parcel = find_by_tracking_id(state, tracking_id)?;
    let agent_location = parcel
        .agent_id
        .and_then(|agent_id| state.agents.get(&agent_id))
        .and_then(|agent| agent.current_location.clone());

    Ok(TrackingView {
        parcel_id: parcel.id,
        tracking_id: parcel.tracking_id,
        status: parcel.status,
        current_location: parcel.current_location,
        agent_location,
        status_history: parcel.status_history,
        estimated_delivery_time: parcel.estimated_delivery_time,
    })
}

/// Overwrites the parcel's live position. No history entry is written.
pub fn update_parcel_location(
    state: &AppState,
    parcel_id: Uuid,
    payload: ParcelLocationRequest,
    actor: &Actor,
) -> Result<LocationFix, AppError> {
    let now = Utc::now();
    let fix = LocationFix::new(payload.latitude, payload.longitude, payload.address, now)?;

    let mut parcel = state
        .parcels
        .get_mut(&parcel_id)
        .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;
    ensure_access(state, &parcel, actor)?;
    parcel.current_location = Some(fix.clone());
    parcel.version += 1;
    parcel.updated_at = now;

    info!(
        parcel_id = %parcel_id,
        latitude = fix.latitude,
        longitude = fix.longitude,
        "parcel location updated"
    );
    Ok(fix)
}

/// Active stops for an agent: pickups before deliveries, then booking order.
pub fn agent_route(state: &AppState, agent_id: Uuid, actor: &Actor) -> Result<AgentRoute, AppError> {
    let agent = agents::get_agent(state, agent_id)?;
    if actor.role == Role::Agent && agent.user_id != actor.user_id {
        return Err(AppError::Forbidden(
            "agents may only view their own route".to_string(),
        ));
    }

    let mut active: Vec<(Stop, u64, RouteStop)> = state
        .parcels
        .iter()
        .filter(|entry| {
            let parcel = entry.value();
            parcel.agent_id == Some(agent_id) && parcel.status.is_active_delivery()
        })
        .map(|entry| {
            let parcel = entry.value();
            let (stop, address) = if parcel.status == ParcelStatus::Assigned {
                (Stop::Pickup, parcel.pickup_address.clone())
            } else {
                (Stop::Delivery, parcel.delivery_address.clone())
            };
            (
                stop,
                parcel.seq,
                RouteStop {
                    parcel_id: parcel.id,
                    tracking_id: parcel.tracking_id.clone(),
                    stop,
                    address,
                    status: parcel.status,
                },
            )
        })
        .collect();

    active.sort_by_key(|(stop, seq, _)| (*stop, *seq));

    Ok(AgentRoute {
        agent_id,
        agent_location: agent.current_location,
        stops: active.into_iter().map(|(_, _, stop)| stop).collect(),
    })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{agent_route, track, update_parcel_location, ParcelLocationRequest, Stop};
    use crate::config::Config;
    use crate::engine::fixtures::{agent, parcel};
    use crate::error::AppError;
    use crate::models::parcel::{Parcel, ParcelStatus};
    use crate::models::user::{Actor, Role};
    use crate::state::AppState;

    fn state_with(parcels: Vec<Parcel>) -> AppState {
        let state = AppState::new(&Config::default());
        for parcel in parcels {
            state.tracking_index.insert(parcel.tracking_id.clone(), parcel.id);
            state.parcels.insert(parcel.id, parcel);
        }
        state
    }

    #[test]
    fn tracking_view_exposes_history() {
        let p = parcel(3);
        let state = state_with(vec![p.clone()]);

        let view = track(&state, &p.tracking_id).unwrap();

        assert_eq!(view.parcel_id, p.id);
        assert_eq!(view.status_history.len(), 1);
        assert!(view.agent_location.is_none());
        assert!(matches!(track(&state, "TRK000000NOPE00"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn location_update_leaves_history_alone() {
        let p = parcel(1);
        let customer = Actor::new(p.customer_id, Role::Customer);
        let state = state_with(vec![p.clone()]);
        let request = ParcelLocationRequest {
            latitude: 48.1,
            longitude: 11.6,
            address: Some("Munich hub".to_string()),
        };

        update_parcel_location(&state, p.id, request.clone(), &customer).unwrap();
        let stored = state.parcels.get(&p.id).unwrap().clone();
        assert_eq!(stored.status_history.len(), 1);
        assert_eq!(stored.current_location.unwrap().address, "Munich hub");

        let stranger = Actor::new(Uuid::new_v4(), Role::Customer);
        assert!(update_parcel_location(&state, p.id, request, &stranger).is_err());
    }

    #[test]
    fn route_orders_pickups_first() {
        let state = AppState::new(&Config::default());
        let user_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();
        state.agents.insert(agent_id, agent(agent_id, user_id));

        let mut delivering = parcel(1);
        delivering.agent_id = Some(agent_id);
        delivering.status = ParcelStatus::InTransit;
        let mut pickup = parcel(2);
        pickup.agent_id = Some(agent_id);
        pickup.status = ParcelStatus::Assigned;
        let mut done = parcel(3);
        done.agent_id = Some(agent_id);
        done.status = ParcelStatus::Delivered;
        for p in [delivering.clone(), pickup.clone(), done] {
            state.parcels.insert(p.id, p);
        }

        let actor = Actor::new(user_id, Role::Agent);
        let route = agent_route(&state, agent_id, &actor).unwrap();

        assert_eq!(route.stops.len(), 2);
        assert_eq!(route.stops[0].parcel_id, pickup.id);
        assert_eq!(route.stops[0].stop, Stop::Pickup);
        assert_eq!(route.stops[0].address, "2 Pickup Street");
        assert_eq!(route.stops[1].address, "1 Delivery Road");

        let other = Actor::new(Uuid::new_v4(), Role::Agent);
        assert!(matches!(
            agent_route(&state, agent_id, &other),
            Err(AppError::Forbidden(_))
        ));
    }
}
