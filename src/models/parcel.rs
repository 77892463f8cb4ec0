use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::LocationFix;
use crate::models::user::UserSummary;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ParcelStatus {
    Pending,
    Assigned,
    PickedUp,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
}

impl ParcelStatus {
    pub const ALL: [ParcelStatus; 7] = [
        ParcelStatus::Pending,
        ParcelStatus::Assigned,
        ParcelStatus::PickedUp,
        ParcelStatus::InTransit,
        ParcelStatus::Delivered,
        ParcelStatus::Failed,
        ParcelStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelStatus::Pending => "pending",
            ParcelStatus::Assigned => "assigned",
            ParcelStatus::PickedUp => "picked_up",
            ParcelStatus::InTransit => "in_transit",
            ParcelStatus::Delivered => "delivered",
            ParcelStatus::Failed => "failed",
            ParcelStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ParcelStatus::Delivered | ParcelStatus::Failed | ParcelStatus::Cancelled
        )
    }

    /// Statuses in which a parcel sits on an agent's route.
    pub fn is_active_delivery(&self) -> bool {
        matches!(
            self,
            ParcelStatus::Assigned | ParcelStatus::PickedUp | ParcelStatus::InTransit
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParcelSize {
    Small,
    Medium,
    Large,
    ExtraLarge,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParcelType {
    Document,
    Package,
    Fragile,
    Electronics,
    Clothing,
    Food,
    Other,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParcelPaymentType {
    Cod,
    Prepaid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEntry {
    pub status: ParcelStatus,
    pub timestamp: DateTime<Utc>,
    pub location: String,
    pub notes: String,
    pub updated_by: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
    pub id: Uuid,
    pub tracking_id: String,
    pub qr_code: String,
    pub barcode: String,
    pub customer_id: Uuid,
    pub agent_id: Option<Uuid>,

    pub recipient_name: String,
    pub recipient_phone: String,
    pub pickup_address: String,
    pub delivery_address: String,
    pub parcel_size: ParcelSize,
    pub parcel_type: ParcelType,
    pub weight: f64,
    pub is_fragile: bool,
    pub requires_signature: bool,
    pub special_instructions: Option<String>,
    pub scheduled_pickup_date: Option<DateTime<Utc>>,
    pub scheduled_delivery_date: Option<DateTime<Utc>>,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    pub delivery_notes: Option<String>,

    pub payment_type: ParcelPaymentType,
    pub cod_amount: f64,
    pub delivery_fee: f64,

    pub status: ParcelStatus,
    pub status_history: Vec<StatusEntry>,
    pub current_location: Option<LocationFix>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivery_attempts: u32,
    pub failure_reason: Option<String>,

    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub seq: u64,
}

impl Parcel {
    /// Address of the most recent known position: the live fix if any, else
    /// wherever the last history entry was recorded.
    pub fn last_known_address(&self) -> String {
        if let Some(location) = &self.current_location {
            if !location.address.is_empty() {
                return location.address.clone();
            }
        }

        self.status_history
            .last()
            .map(|entry| entry.location.clone())
            .unwrap_or_default()
    }
}

/// Parcel with customer and agent identity composed in for responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelView {
    #[serde(flatten)]
    pub parcel: Parcel,
    pub customer: Option<UserSummary>,
    pub agent: Option<UserSummary>,
}
