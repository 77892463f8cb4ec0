//! Parcel status state machine.
//!
//! Every change to `status` goes through [`apply_status`] or
//! [`record_assignment`], which keep the history log and the derived
//! timestamps consistent with the current status.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::location::LocationFix;
use crate::models::parcel::{Parcel, ParcelStatus, StatusEntry};

pub const ASSIGNMENT_NOTE: &str = "Agent assigned to parcel";
pub const BOOKING_NOTE: &str = "Parcel booking created";

/// Statuses reachable from `from` without an override.
pub fn allowed_transitions(from: ParcelStatus) -> &'static [ParcelStatus] {
    use ParcelStatus::*;

    match from {
        Pending => &[Assigned, Cancelled],
        Assigned => &[PickedUp, Failed, Cancelled],
        PickedUp => &[InTransit, Delivered, Failed],
        InTransit => &[InTransit, Delivered, Failed],
        Delivered | Failed | Cancelled => &[],
    }
}

pub fn can_transition(from: ParcelStatus, to: ParcelStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: ParcelStatus,
    pub actor: Uuid,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub failure_reason: Option<String>,
    pub expected_version: Option<u64>,
    /// Skip the transition table. Reserved for administrators.
    pub force: bool,
}

impl StatusChange {
    pub fn new(status: ParcelStatus, actor: Uuid) -> Self {
        Self {
            status,
            actor,
            notes: None,
            location: None,
            latitude: None,
            longitude: None,
            failure_reason: None,
            expected_version: None,
            force: false,
        }
    }

    fn coordinates(&self) -> Result<Option<(f64, f64)>, AppError> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Ok(Some((latitude, longitude))),
            (None, None) => Ok(None),
            _ => Err(AppError::BadRequest(
                "latitude and longitude must be supplied together".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ParcelStatus,
    pub to: ParcelStatus,
    pub forced: bool,
}

pub fn check_version(parcel: &Parcel, expected: Option<u64>) -> Result<(), AppError> {
    match expected {
        Some(expected) if expected != parcel.version => Err(AppError::Conflict(format!(
            "parcel {} is at version {}, expected {}",
            parcel.id, parcel.version, expected
        ))),
        _ => Ok(()),
    }
}

/// Validates `change` against the parcel and, if accepted, applies it.
///
/// The parcel is left untouched when an error is returned.
pub fn apply_status(
    parcel: &mut Parcel,
    change: StatusChange,
    now: DateTime<Utc>,
) -> Result<Transition, AppError> {
    check_version(parcel, change.expected_version)?;

    let from = parcel.status;
    let to = change.status;
    let forced = !can_transition(from, to);

    if forced && !change.force {
        return Err(AppError::Conflict(format!(
            "cannot move parcel {} from {} to {}",
            parcel.tracking_id,
            from.as_str(),
            to.as_str()
        )));
    }

    if to == ParcelStatus::Assigned && parcel.agent_id.is_none() {
        return Err(AppError::BadRequest(
            "parcel has no agent; assign one through the assignment endpoint".to_string(),
        ));
    }

    let coordinates = change.coordinates()?;
    let fix = match coordinates {
        Some((latitude, longitude)) => Some(LocationFix::new(
            latitude,
            longitude,
            change.location.clone(),
            now,
        )?),
        None => None,
    };

    let location = change
        .location
        .filter(|location| !location.trim().is_empty())
        .unwrap_or_else(|| parcel.last_known_address());

    parcel.status = to;
    parcel.status_history.push(StatusEntry {
        status: to,
        timestamp: now,
        location,
        notes: change.notes.clone().unwrap_or_default(),
        updated_by: change.actor,
    });

    if let Some(fix) = fix {
        parcel.current_location = Some(fix);
    }

    match to {
        ParcelStatus::PickedUp => {
            parcel.picked_up_at.get_or_insert(now);
        }
        ParcelStatus::Delivered => {
            parcel.delivered_at.get_or_insert(now);
            parcel.delivery_attempts += 1;
        }
        ParcelStatus::Failed => {
            parcel.delivery_attempts += 1;
            parcel.failure_reason = change.failure_reason.or(change.notes);
        }
        _ => {}
    }

    parcel.version += 1;
    parcel.updated_at = now;

    Ok(Transition { from, to, forced })
}

/// Binds `agent_id` to a pending parcel and logs the assignment under the
/// agent's user identity.
pub fn record_assignment(
    parcel: &mut Parcel,
    agent_id: Uuid,
    agent_user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if parcel.status != ParcelStatus::Pending {
        return Err(AppError::Conflict(format!(
            "parcel {} is {} and cannot be assigned",
            parcel.tracking_id,
            parcel.status.as_str()
        )));
    }

    parcel.agent_id = Some(agent_id);
    parcel.status = ParcelStatus::Assigned;
    parcel.status_history.push(StatusEntry {
        status: ParcelStatus::Assigned,
        timestamp: now,
        location: parcel.pickup_address.clone(),
        notes: ASSIGNMENT_NOTE.to_string(),
        updated_by: agent_user_id,
    });
    parcel.version += 1;
    parcel.updated_at = now;

    Ok(())
}

/// History and derived-field invariants every stored parcel must satisfy.
pub fn check_invariants(parcel: &Parcel) -> Result<(), String> {
    let last = parcel
        .status_history
        .last()
        .ok_or_else(|| "status history is empty".to_string())?;

    if last.status != parcel.status {
        return Err(format!(
            "status {} does not match last history entry {}",
            parcel.status.as_str(),
            last.status.as_str()
        ));
    }

    let saw = |status: ParcelStatus| parcel.status_history.iter().any(|e| e.status == status);

    if saw(ParcelStatus::PickedUp) != parcel.picked_up_at.is_some() {
        return Err("pickedUpAt disagrees with history".to_string());
    }
    if saw(ParcelStatus::Delivered) != parcel.delivered_at.is_some() {
        return Err("deliveredAt disagrees with history".to_string());
    }

    Ok(())
}
