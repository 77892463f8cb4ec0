use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::query::{
    compose_agent_view, contains_ci, paginate, search, Page, PageRequest, Searchable, SortValue,
    Sortable,
};
use crate::engine::validate;
use crate::error::AppError;
use crate::models::agent::{Agent, AgentStatus, AgentView, VehicleType};
use crate::models::location::LocationFix;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAgentRequest {
    pub user_id: Uuid,
    pub vehicle_type: VehicleType,
    pub vehicle_number: String,
    pub license_number: String,
    #[serde(default)]
    pub service_areas: Vec<String>,
    pub profile_image: Option<String>,
    pub emergency_contact: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAgentRequest {
    pub vehicle_type: Option<VehicleType>,
    pub vehicle_number: Option<String>,
    pub license_number: Option<String>,
    pub service_areas: Option<Vec<String>>,
    pub profile_image: Option<String>,
    pub emergency_contact: Option<String>,
    pub status: Option<AgentStatus>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
    pub total_agents: usize,
    pub active_agents: usize,
    pub available_agents: usize,
    pub status_distribution: BTreeMap<AgentStatus, usize>,
}

impl Sortable for Agent {
    const SORT_FIELDS: &'static [&'static str] = &[
        "createdAt",
        "updatedAt",
        "rating",
        "totalDeliveries",
        "vehicleNumber",
        "lastActiveAt",
    ];

    fn sort_value(&self, field: &str) -> SortValue<'_> {
        match field {
            "createdAt" => SortValue::Time(self.created_at),
            "updatedAt" => SortValue::Time(self.updated_at),
            "rating" => SortValue::Number(self.rating),
            "totalDeliveries" => SortValue::Number(self.total_deliveries as f64),
            "vehicleNumber" => SortValue::Text(&self.vehicle_number),
            "lastActiveAt" => SortValue::Time(self.last_active_at),
            _ => SortValue::Missing,
        }
    }

    fn seq(&self) -> u64 {
        self.seq
    }
}

impl Searchable for Agent {
    fn matches_search(&self, needle: &str) -> bool {
        contains_ci(&self.vehicle_number, needle) || contains_ci(&self.license_number, needle)
    }
}

impl Sortable for AgentView {
    const SORT_FIELDS: &'static [&'static str] = Agent::SORT_FIELDS;

    fn sort_value(&self, field: &str) -> SortValue<'_> {
        self.agent.sort_value(field)
    }

    fn seq(&self) -> u64 {
        self.agent.seq
    }
}

/// Matches the agent's own identifiers or the joined user's name, email and phone.
impl Searchable for AgentView {
    fn matches_search(&self, needle: &str) -> bool {
        self.agent.matches_search(needle)
            || self.user.as_ref().is_some_and(|user| {
                contains_ci(&user.name, needle)
                    || contains_ci(&user.email, needle)
                    || contains_ci(&user.phone, needle)
            })
    }
}

/// Trimmed, non-empty areas in first-seen order; repeats are dropped
/// regardless of case.
fn clean_areas(areas: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    areas
        .into_iter()
        .filter_map(|area| validate::optional(Some(area)))
        .filter(|area| seen.insert(area.to_lowercase()))
        .collect()
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("agent {id} not found"))
}

pub fn create_agent(state: &AppState, payload: CreateAgentRequest) -> Result<AgentView, AppError> {
    if !state.users.contains_key(&payload.user_id) {
        return Err(AppError::NotFound(format!(
            "user {} not found",
            payload.user_id
        )));
    }

    let vehicle_number = validate::required("vehicleNumber", &payload.vehicle_number)?;
    let license_number = validate::required("licenseNumber", &payload.license_number)?;
    let emergency_contact = match validate::optional(payload.emergency_contact) {
        Some(contact) => Some(validate::phone("emergencyContact", &contact)?),
        None => None,
    };

    let id = Uuid::new_v4();
    match state.agents_by_user.entry(payload.user_id) {
        Entry::Occupied(_) => {
            return Err(AppError::Conflict(format!(
                "user {} already has an agent profile",
                payload.user_id
            )));
        }
        Entry::Vacant(slot) => {
            slot.insert(id);
        }
    }

    let now = Utc::now();
    let agent = Agent {
        id,
        user_id: payload.user_id,
        vehicle_type: payload.vehicle_type,
        vehicle_number,
        license_number,
        status: AgentStatus::Available,
        current_location: None,
        service_areas: clean_areas(payload.service_areas),
        total_deliveries: 0,
        successful_deliveries: 0,
        failed_deliveries: 0,
        rating: 5.0,
        total_ratings: 0,
        profile_image: validate::optional(payload.profile_image),
        emergency_contact,
        is_active: true,
        joined_date: now,
        last_active_at: now,
        created_at: now,
        updated_at: now,
        seq: state.next_seq(),
    };

    state.agents.insert(agent.id, agent.clone());
    info!(agent_id = %agent.id, user_id = %agent.user_id, "agent created");

    Ok(compose_agent_view(state, agent))
}

pub fn get_agent(state: &AppState, id: Uuid) -> Result<Agent, AppError> {
    state
        .agents
        .get(&id)
        .map(|agent| agent.value().clone())
        .ok_or_else(|| not_found(id))
}

pub fn get_agent_view(state: &AppState, id: Uuid) -> Result<AgentView, AppError> {
    Ok(compose_agent_view(state, get_agent(state, id)?))
}

pub fn agent_for_user(state: &AppState, user_id: Uuid) -> Result<Agent, AppError> {
    let agent_id = state
        .agents_by_user
        .get(&user_id)
        .map(|entry| *entry.value())
        .ok_or_else(|| AppError::NotFound(format!("no agent profile for user {user_id}")))?;
    get_agent(state, agent_id)
}

pub fn list_agents(state: &AppState, request: &PageRequest) -> Result<Page<AgentView>, AppError> {
    let agents: Vec<Agent> = state.agents.iter().map(|entry| entry.value().clone()).collect();
    let views = agents
        .into_iter()
        .map(|agent| compose_agent_view(state, agent))
        .collect();
    paginate(search(views, request.search.as_deref()), request)
}

/// Active, available agents, best rated first.
pub fn available_agents(state: &AppState, service_area: Option<&str>) -> Vec<AgentView> {
    let area = service_area
        .map(str::trim)
        .filter(|area| !area.is_empty())
        .map(str::to_lowercase);

    let mut agents: Vec<Agent> = state
        .agents
        .iter()
        .filter(|entry| {
            let agent = entry.value();
            agent.is_active
                && agent.status == AgentStatus::Available
                && area.as_ref().is_none_or(|area| {
                    agent
                        .service_areas
                        .iter()
                        .any(|served| served.to_lowercase() == *area)
                })
        })
        .map(|entry| entry.value().clone())
        .collect();

    agents.sort_by(|a, b| b.rating.total_cmp(&a.rating).then(a.seq.cmp(&b.seq)));
    agents
        .into_iter()
        .map(|agent| compose_agent_view(state, agent))
        .collect()
}

pub fn update_agent(
    state: &AppState,
    id: Uuid,
    payload: UpdateAgentRequest,
) -> Result<AgentView, AppError> {
    let vehicle_number = payload
        .vehicle_number
        .as_deref()
        .map(|value| validate::required("vehicleNumber", value))
        .transpose()?;
    let license_number = payload
        .license_number
        .as_deref()
        .map(|value| validate::required("licenseNumber", value))
        .transpose()?;
    let emergency_contact = payload
        .emergency_contact
        .as_deref()
        .map(|value| validate::phone("emergencyContact", value))
        .transpose()?;

    let updated = {
        let mut agent = state.agents.get_mut(&id).ok_or_else(|| not_found(id))?;

        if let Some(vehicle_type) = payload.vehicle_type {
            agent.vehicle_type = vehicle_type;
        }
        if let Some(vehicle_number) = vehicle_number {
            agent.vehicle_number = vehicle_number;
        }
        if let Some(license_number) = license_number {
            agent.license_number = license_number;
        }
        if let Some(areas) = payload.service_areas {
            agent.service_areas = clean_areas(areas);
        }
        if payload.profile_image.is_some() {
            agent.profile_image = validate::optional(payload.profile_image);
        }
        if emergency_contact.is_some() {
            agent.emergency_contact = emergency_contact;
        }
        if let Some(status) = payload.status {
            agent.status = status;
        }
        if let Some(is_active) = payload.is_active {
            agent.is_active = is_active;
        }
        agent.updated_at = Utc::now();
        agent.clone()
    };

    info!(agent_id = %id, "agent updated");
    Ok(compose_agent_view(state, updated))
}

pub fn update_location(
    state: &AppState,
    id: Uuid,
    payload: UpdateLocationRequest,
) -> Result<AgentView, AppError> {
    let now = Utc::now();
    let fix = LocationFix::new(payload.latitude, payload.longitude, payload.address, now)?;

    let updated = {
        let mut agent = state.agents.get_mut(&id).ok_or_else(|| not_found(id))?;
        agent.current_location = Some(fix);
        agent.last_active_at = now;
        agent.updated_at = now;
        agent.clone()
    };

    Ok(compose_agent_view(state, updated))
}

pub fn update_status(
    state: &AppState,
    id: Uuid,
    status: AgentStatus,
) -> Result<AgentView, AppError> {
    let now = Utc::now();
    let updated = {
        let mut agent = state.agents.get_mut(&id).ok_or_else(|| not_found(id))?;
        agent.status = status;
        agent.last_active_at = now;
        agent.updated_at = now;
        agent.clone()
    };

    info!(agent_id = %id, status = ?status, "agent status changed");
    Ok(compose_agent_view(state, updated))
}

/// Bumps the delivery counters after a parcel reaches a final outcome.
pub fn record_delivery_outcome(state: &AppState, id: Uuid, successful: bool) {
    if let Some(mut agent) = state.agents.get_mut(&id) {
        agent.total_deliveries += 1;
        if successful {
            agent.successful_deliveries += 1;
        } else {
            agent.failed_deliveries += 1;
        }
        agent.updated_at = Utc::now();
    }
}

/// Undoes a [`record_delivery_outcome`] when an administrator moves a parcel
/// back out of `delivered` or `failed`.
pub fn retract_delivery_outcome(state: &AppState, id: Uuid, successful: bool) {
    if let Some(mut agent) = state.agents.get_mut(&id) {
        agent.total_deliveries = agent.total_deliveries.saturating_sub(1);
        if successful {
            agent.successful_deliveries = agent.successful_deliveries.saturating_sub(1);
        } else {
            agent.failed_deliveries = agent.failed_deliveries.saturating_sub(1);
        }
        agent.updated_at = Utc::now();
    }
}

pub fn delete_agent(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let (_, agent) = state.agents.remove(&id).ok_or_else(|| not_found(id))?;
    state
        .agents_by_user
        .remove_if(&agent.user_id, |_, agent_id| *agent_id == id);
    info!(agent_id = %id, "agent deleted");
    Ok(())
}

pub fn agent_stats(state: &AppState) -> AgentStats {
    let mut stats = AgentStats {
        total_agents: 0,
        active_agents: 0,
        available_agents: 0,
        status_distribution: BTreeMap::new(),
    };

    for entry in state.agents.iter() {
        let agent = entry.value();
        stats.total_agents += 1;
        if agent.is_active {
            stats.active_agents += 1;
        }
        if agent.status == AgentStatus::Available {
            stats.available_agents += 1;
        }
        *stats.status_distribution.entry(agent.status).or_default() += 1;
    }

    stats
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{
        available_agents, create_agent, delete_agent, list_agents, record_delivery_outcome,
        update_status, CreateAgentRequest,
    };
    use crate::config::Config;
    use crate::engine::query::PageRequest;
    use crate::engine::users::{create_user, CreateUserRequest};
    use crate::models::agent::{AgentStatus, VehicleType};
    use crate::models::user::Role;
    use crate::state::AppState;

    fn agent_user(state: &AppState, n: u8) -> Uuid {
        create_user(
            state,
            CreateUserRequest {
                name: format!("Rider {n}"),
                email: format!("rider{n}@example.com"),
                phone: format!("+4915100000{n:02}"),
                role: Role::Agent,
                address: None,
                city: None,
                state: None,
                zip_code: None,
                country: None,
                avatar: None,
            },
        )
        .unwrap()
        .id
    }

    fn request(user_id: Uuid, areas: &[&str]) -> CreateAgentRequest {
        CreateAgentRequest {
            user_id,
            vehicle_type: VehicleType::Bike,
            vehicle_number: "B-XY 123".to_string(),
            license_number: "LIC-1".to_string(),
            service_areas: areas.iter().map(|area| area.to_string()).collect(),
            profile_image: None,
            emergency_contact: None,
        }
    }

    #[test]
    fn profile_requires_an_existing_user_and_is_unique() {
        let state = AppState::new(&Config::default());
        assert!(create_agent(&state, request(Uuid::new_v4(), &[])).is_err());

        let user = agent_user(&state, 1);
        let view = create_agent(&state, request(user, &[])).unwrap();
        assert_eq!(view.user.unwrap().name, "Rider 1");
        assert!(create_agent(&state, request(user, &[])).is_err());
    }

    #[test]
    fn service_areas_drop_repeats_in_any_position() {
        let state = AppState::new(&Config::default());
        let view = create_agent(
            &state,
            request(agent_user(&state, 1), &["North", " South ", "north", "", "South"]),
        )
        .unwrap();

        assert_eq!(view.agent.service_areas, vec!["North", "South"]);
    }

    #[test]
    fn list_searches_the_agent_user_identity() {
        let state = AppState::new(&Config::default());
        let first = create_agent(&state, request(agent_user(&state, 1), &[])).unwrap();
        create_agent(&state, request(agent_user(&state, 2), &[])).unwrap();

        let by_name = PageRequest {
            search: Some("RIDER 1".to_string()),
            ..PageRequest::default()
        };
        let page = list_agents(&state, &by_name).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].agent.id, first.agent.id);

        let by_email = PageRequest {
            search: Some("rider2@example".to_string()),
            ..PageRequest::default()
        };
        assert_eq!(list_agents(&state, &by_email).unwrap().total, 1);

        let by_vehicle = PageRequest {
            search: Some("b-xy".to_string()),
            ..PageRequest::default()
        };
        assert_eq!(list_agents(&state, &by_vehicle).unwrap().total, 2);
    }

    #[test]
    fn available_agents_filter_by_area_and_status() {
        let state = AppState::new(&Config::default());
        let north = create_agent(&state, request(agent_user(&state, 1), &["North"])).unwrap();
        let south = create_agent(&state, request(agent_user(&state, 2), &["South"])).unwrap();
        update_status(&state, south.agent.id, AgentStatus::Offline).unwrap();

        assert_eq!(available_agents(&state, None).len(), 1);
        let northern = available_agents(&state, Some("north"));
        assert_eq!(northern.len(), 1);
        assert_eq!(northern[0].agent.id, north.agent.id);
        assert!(available_agents(&state, Some("South")).is_empty());
    }

    #[test]
    fn delivery_outcomes_update_counters() {
        let state = AppState::new(&Config::default());
        let agent = create_agent(&state, request(agent_user(&state, 1), &[])).unwrap();

        record_delivery_outcome(&state, agent.agent.id, true);
        record_delivery_outcome(&state, agent.agent.id, false);

        let stored = state.agents.get(&agent.agent.id).unwrap().clone();
        assert_eq!(stored.total_deliveries, 2);
        assert_eq!(stored.successful_deliveries, 1);
        assert_eq!(stored.failed_deliveries, 1);
        assert_eq!(stored.success_rate(), 50.0);
    }

    #[test]
    fn deleting_frees_the_user_for_a_new_profile() {
        let state = AppState::new(&Config::default());
        let user = agent_user(&state, 1);
        let agent = create_agent(&state, request(user, &[])).unwrap();

        delete_agent(&state, agent.agent.id).unwrap();

        assert!(create_agent(&state, request(user, &[])).is_ok());
    }
}
