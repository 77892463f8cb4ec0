use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Last known position of a parcel or an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub timestamp: DateTime<Utc>,
}

impl LocationFix {
    pub fn new(
        latitude: f64,
        longitude: f64,
        address: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, AppError> {
        validate_coordinates(latitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
            address: address.unwrap_or_default(),
            timestamp,
        })
    }
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), AppError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::BadRequest(format!(
            "latitude {latitude} is out of range [-90, 90]"
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::BadRequest(format!(
            "longitude {longitude} is out of range [-180, 180]"
        )));
    }
    Ok(())
}
