use chrono::Utc;
use dashmap::mapref::entry::Entry;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::error::AppError;
use crate::models::setting::{Setting, SettingCategory, SettingType};
use crate::state::AppState;

pub const MAX_PARCEL_WEIGHT: &str = "max_parcel_weight";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSettingRequest {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: SettingType,
    #[serde(default)]
    pub category: SettingCategory,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingRequest {
    pub value: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<SettingType>,
    pub category: Option<SettingCategory>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingFilter {
    pub category: Option<SettingCategory>,
    pub is_public: Option<bool>,
}

struct SeedSetting {
    key: &'static str,
    value: &'static str,
    description: &'static str,
    kind: SettingType,
    category: SettingCategory,
    is_public: bool,
}

const DEFAULTS: &[SeedSetting] = &[
    SeedSetting {
        key: "delivery_fee_per_km",
        value: "5",
        description: "Delivery fee per kilometer",
        kind: SettingType::Number,
        category: SettingCategory::Pricing,
        is_public: true,
    },
    SeedSetting {
        key: MAX_PARCEL_WEIGHT,
        value: "50",
        description: "Maximum parcel weight in kg",
        kind: SettingType::Number,
        category: SettingCategory::System,
        is_public: true,
    },
    SeedSetting {
        key: "cod_fee_percentage",
        value: "2",
        description: "Cash on delivery fee percentage",
        kind: SettingType::Number,
        category: SettingCategory::Pricing,
        is_public: true,
    },
    SeedSetting {
        key: "notification_email",
        value: "noreply@courier.com",
        description: "Sender address for outgoing notifications",
        kind: SettingType::String,
        category: SettingCategory::System,
        is_public: false,
    },
    SeedSetting {
        key: "company_name",
        value: "Courier Express",
        description: "Company name",
        kind: SettingType::String,
        category: SettingCategory::System,
        is_public: true,
    },
    SeedSetting {
        key: "support_phone",
        value: "+1234567890",
        description: "Customer support phone number",
        kind: SettingType::String,
        category: SettingCategory::System,
        is_public: true,
    },
    SeedSetting {
        key: "working_hours",
        value: r#"{"start":"09:00","end":"18:00","days":["monday","tuesday","wednesday","thursday","friday"]}"#,
        description: "Business working hours",
        kind: SettingType::Json,
        category: SettingCategory::System,
        is_public: true,
    },
];

/// Inserts the built-in settings that are not present yet.
pub fn seed_defaults(state: &AppState) {
    let now = Utc::now();
    let mut seeded = 0;

    for default in DEFAULTS {
        if let Entry::Vacant(slot) = state.settings.entry(default.key.to_string()) {
            slot.insert(Setting {
                key: default.key.to_string(),
                value: default.value.to_string(),
                description: Some(default.description.to_string()),
                kind: default.kind,
                category: default.category,
                is_public: default.is_public,
                created_at: now,
                updated_at: now,
            });
            seeded += 1;
        }
    }

    info!(seeded, "default settings seeded");
}

/// Parses `raw` according to `kind`.
pub fn typed_value(kind: SettingType, raw: &str) -> Result<Value, AppError> {
    let invalid = || AppError::BadRequest(format!("value {raw:?} is not a valid {kind:?}"));

    match kind {
        SettingType::String => Ok(Value::String(raw.to_string())),
        SettingType::Number => {
            let number: f64 = raw.trim().parse().map_err(|_| invalid())?;
            serde_json::Number::from_f64(number)
                .map(Value::Number)
                .ok_or_else(invalid)
        }
        SettingType::Boolean => match raw.trim() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        SettingType::Json => serde_json::from_str(raw).map_err(|_| invalid()),
    }
}

fn not_found(key: &str) -> AppError {
    AppError::NotFound(format!("setting {key} not found"))
}

pub fn create_setting(
    state: &AppState,
    payload: CreateSettingRequest,
) -> Result<Setting, AppError> {
    let key = payload.key.trim().to_string();
    if key.is_empty() {
        return Err(AppError::BadRequest("key is required".to_string()));
    }
    typed_value(payload.kind, &payload.value)?;

    let now = Utc::now();
    let setting = Setting {
        key: key.clone(),
        value: payload.value,
        description: payload.description,
        kind: payload.kind,
        category: payload.category,
        is_public: payload.is_public,
        created_at: now,
        updated_at: now,
    };

    match state.settings.entry(key) {
        Entry::Occupied(taken) => Err(AppError::Conflict(format!(
            "setting {} already exists",
            taken.key()
        ))),
        Entry::Vacant(slot) => {
            slot.insert(setting.clone());
            info!(key = %setting.key, "setting created");
            Ok(setting)
        }
    }
}

pub fn list_settings(state: &AppState, filter: &SettingFilter) -> Vec<Setting> {
    let mut settings: Vec<Setting> = state
        .settings
        .iter()
        .filter(|entry| {
            let setting = entry.value();
            filter.category.is_none_or(|category| setting.category == category)
                && filter.is_public.is_none_or(|public| setting.is_public == public)
        })
        .map(|entry| entry.value().clone())
        .collect();
    settings.sort_by(|a, b| a.key.cmp(&b.key));
    settings
}

pub fn get_setting(state: &AppState, key: &str) -> Result<Setting, AppError> {
    state
        .settings
        .get(key)
        .map(|setting| setting.value().clone())
        .ok_or_else(|| not_found(key))
}

pub fn get_value(state: &AppState, key: &str) -> Result<Value, AppError> {
    let setting = get_setting(state, key)?;
    typed_value(setting.kind, &setting.value)
}

/// Numeric setting, or `None` when unset or not a number.
pub fn number_setting(state: &AppState, key: &str) -> Option<f64> {
    let setting = state.settings.get(key)?;
    if setting.kind != SettingType::Number {
        return None;
    }
    setting.value.trim().parse().ok()
}

pub fn update_setting(
    state: &AppState,
    key: &str,
    payload: UpdateSettingRequest,
) -> Result<Setting, AppError> {
    let mut setting = state.settings.get_mut(key).ok_or_else(|| not_found(key))?;

    let kind = payload.kind.unwrap_or(setting.kind);
    let value = payload.value.unwrap_or_else(|| setting.value.clone());
    typed_value(kind, &value)?;

    setting.kind = kind;
    setting.value = value;
    if payload.description.is_some() {
        setting.description = payload.description;
    }
    if let Some(category) = payload.category {
        setting.category = category;
    }
    if let Some(is_public) = payload.is_public {
        setting.is_public = is_public;
    }
    setting.updated_at = Utc::now();

    info!(key, "setting updated");
    Ok(setting.clone())
}

/// Stores `value`; strings are kept verbatim, anything else serialized.
pub fn set_value(state: &AppState, key: &str, value: Value) -> Result<Setting, AppError> {
    let raw = match value {
        Value::String(raw) => raw,
        other => other.to_string(),
    };
    update_setting(
        state,
        key,
        UpdateSettingRequest {
            value: Some(raw),
            ..UpdateSettingRequest::default()
        },
    )
}

pub fn delete_setting(state: &AppState, key: &str) -> Result<(), AppError> {
    state.settings.remove(key).ok_or_else(|| not_found(key))?;
    info!(key, "setting deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        create_setting, get_value, list_settings, number_setting, set_value, typed_value,
        CreateSettingRequest, SettingFilter, MAX_PARCEL_WEIGHT,
    };
    use crate::config::Config;
    use crate::models::setting::{SettingCategory, SettingType};
    use crate::state::AppState;

    fn request(key: &str, value: &str, kind: SettingType) -> CreateSettingRequest {
        CreateSettingRequest {
            key: key.to_string(),
            value: value.to_string(),
            description: None,
            kind,
            category: SettingCategory::Admin,
            is_public: false,
        }
    }

    #[test]
    fn defaults_are_seeded() {
        let state = AppState::new(&Config::default());
        assert_eq!(number_setting(&state, MAX_PARCEL_WEIGHT), Some(50.0));
        assert_eq!(
            get_value(&state, "company_name").unwrap(),
            json!("Courier Express")
        );
        assert_eq!(get_value(&state, "working_hours").unwrap()["start"], "09:00");
    }

    #[test]
    fn duplicate_key_is_a_conflict() {
        let state = AppState::new(&Config::default());
        assert!(create_setting(&state, request("company_name", "x", SettingType::String)).is_err());
    }

    #[test]
    fn value_must_match_declared_type() {
        assert!(typed_value(SettingType::Number, "abc").is_err());
        assert!(typed_value(SettingType::Boolean, "yes").is_err());
        assert!(typed_value(SettingType::Json, "{").is_err());
        assert_eq!(typed_value(SettingType::Boolean, "true").unwrap(), json!(true));
    }

    #[test]
    fn set_value_serializes_non_strings() {
        let state = AppState::new(&Config::default());
        create_setting(&state, request("flags", "{}", SettingType::Json)).unwrap();

        let stored = set_value(&state, "flags", json!({"beta": true})).unwrap();

        assert_eq!(stored.value, r#"{"beta":true}"#);
        assert_eq!(get_value(&state, "flags").unwrap(), json!({"beta": true}));
    }

    #[test]
    fn list_filters_by_category_and_visibility() {
        let state = AppState::new(&Config::default());
        let pricing = list_settings(
            &state,
            &SettingFilter {
                category: Some(SettingCategory::Pricing),
                is_public: None,
            },
        );
        assert_eq!(pricing.len(), 2);

        let private = list_settings(
            &state,
            &SettingFilter {
                category: None,
                is_public: Some(false),
            },
        );
        assert_eq!(private.len(), 1);
        assert_eq!(private[0].key, "notification_email");
    }
}
