use std::collections::BTreeMap;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::query::{contains_ci, paginate, search, Page, PageRequest, Searchable, SortValue, Sortable};
use crate::engine::validate;
use crate::error::AppError;
use crate::models::user::{Role, User, UserStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
    pub avatar: Option<String>,
    pub email_verified: Option<bool>,
    pub phone_verified: Option<bool>,
}

impl UpdateUserRequest {
    /// Fields only an administrator may change.
    pub fn touches_privileged_fields(&self) -> bool {
        self.role.is_some()
            || self.status.is_some()
            || self.email_verified.is_some()
            || self.phone_verified.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: usize,
    pub active_users: usize,
    pub role_distribution: BTreeMap<Role, usize>,
}

impl Sortable for User {
    const SORT_FIELDS: &'static [&'static str] =
        &["createdAt", "updatedAt", "name", "email", "role", "status"];

    fn sort_value(&self, field: &str) -> SortValue<'_> {
        match field {
            "createdAt" => SortValue::Time(self.created_at),
            "updatedAt" => SortValue::Time(self.updated_at),
            "name" => SortValue::Text(&self.name),
            "email" => SortValue::Text(&self.email),
            "role" => SortValue::Text(self.role.as_str()),
            "status" => SortValue::Number(self.status as u8 as f64),
            _ => SortValue::Missing,
        }
    }

    fn seq(&self) -> u64 {
        self.seq
    }
}

impl Searchable for User {
    fn matches_search(&self, needle: &str) -> bool {
        contains_ci(&self.name, needle)
            || contains_ci(&self.email, needle)
            || contains_ci(&self.phone, needle)
    }
}

fn claim(index: &DashMap<String, Uuid>, key: &str, owner: Uuid, what: &str) -> Result<(), AppError> {
    match index.entry(key.to_string()) {
        Entry::Vacant(slot) => {
            slot.insert(owner);
            Ok(())
        }
        Entry::Occupied(taken) if *taken.get() == owner => Ok(()),
        Entry::Occupied(_) => Err(AppError::Conflict(format!(
            "user with this {what} already exists"
        ))),
    }
}

fn release(index: &DashMap<String, Uuid>, key: &str, owner: Uuid) {
    index.remove_if(key, |_, holder| *holder == owner);
}

pub fn create_user(state: &AppState, payload: CreateUserRequest) -> Result<User, AppError> {
    let name = validate::required("name", &payload.name)?;
    let email = validate::email(&payload.email)?;
    let phone = validate::phone("phone", &payload.phone)?;
    let id = Uuid::new_v4();

    claim(&state.user_emails, &email, id, "email")?;
    if let Err(err) = claim(&state.user_phones, &validate::phone_key(&phone), id, "phone") {
        release(&state.user_emails, &email, id);
        return Err(err);
    }

    let now = Utc::now();
    let user = User {
        id,
        name,
        email,
        phone,
        role: payload.role,
        status: UserStatus::Active,
        address: validate::optional(payload.address),
        city: validate::optional(payload.city),
        state: validate::optional(payload.state),
        zip_code: validate::optional(payload.zip_code),
        country: validate::optional(payload.country),
        avatar: validate::optional(payload.avatar),
        email_verified: false,
        phone_verified: false,
        last_login: None,
        created_at: now,
        updated_at: now,
        seq: state.next_seq(),
    };

    state.users.insert(user.id, user.clone());
    info!(user_id = %user.id, role = user.role.as_str(), "user created");

    Ok(user)
}

pub fn get_user(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .users
        .get(&id)
        .map(|user| user.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))
}

pub fn list_users(state: &AppState, request: &PageRequest) -> Result<Page<User>, AppError> {
    let users: Vec<User> = state.users.iter().map(|entry| entry.value().clone()).collect();
    paginate(search(users, request.search.as_deref()), request)
}

pub fn update_user(
    state: &AppState,
    id: Uuid,
    payload: UpdateUserRequest,
) -> Result<User, AppError> {
    let current = get_user(state, id)?;

    let name = payload
        .name
        .as_deref()
        .map(|name| validate::required("name", name))
        .transpose()?;
    let email = payload.email.as_deref().map(validate::email).transpose()?;
    let phone = payload
        .phone
        .as_deref()
        .map(|phone| validate::phone("phone", phone))
        .transpose()?;

    if let Some(email) = &email {
        claim(&state.user_emails, email, id, "email")?;
    }
    if let Some(phone) = &phone {
        if let Err(err) = claim(&state.user_phones, &validate::phone_key(phone), id, "phone") {
            if let Some(email) = &email {
                if *email != current.email {
                    release(&state.user_emails, email, id);
                }
            }
            return Err(err);
        }
    }

    let updated = {
        let mut user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;

        if let Some(name) = name {
            user.name = name;
        }
        if let Some(email) = email.clone() {
            user.email = email;
        }
        if let Some(phone) = phone.clone() {
            user.phone = phone;
        }
        if let Some(role) = payload.role {
            user.role = role;
        }
        if let Some(status) = payload.status {
            user.status = status;
        }
        if payload.address.is_some() {
            user.address = validate::optional(payload.address);
        }
        if payload.city.is_some() {
            user.city = validate::optional(payload.city);
        }
        if payload.state.is_some() {
            user.state = validate::optional(payload.state);
        }
        if payload.zip_code.is_some() {
            user.zip_code = validate::optional(payload.zip_code);
        }
        if payload.country.is_some() {
            user.country = validate::optional(payload.country);
        }
        if payload.avatar.is_some() {
            user.avatar = validate::optional(payload.avatar);
        }
        if let Some(verified) = payload.email_verified {
            user.email_verified = verified;
        }
        if let Some(verified) = payload.phone_verified {
            user.phone_verified = verified;
        }
        user.updated_at = Utc::now();
        user.clone()
    };

    if updated.email != current.email {
        release(&state.user_emails, &current.email, id);
    }
    let old_phone = validate::phone_key(&current.phone);
    if validate::phone_key(&updated.phone) != old_phone {
        release(&state.user_phones, &old_phone, id);
    }

    info!(user_id = %id, "user updated");
    Ok(updated)
}

pub fn delete_user(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let (_, user) = state
        .users
        .remove(&id)
        .ok_or_else(|| AppError::NotFound(format!("user {id} not found")))?;

    release(&state.user_emails, &user.email, id);
    release(&state.user_phones, &validate::phone_key(&user.phone), id);
    info!(user_id = %id, "user deleted");

    Ok(())
}

pub fn user_stats(state: &AppState) -> UserStats {
    let mut stats = UserStats {
        total_users: 0,
        active_users: 0,
        role_distribution: BTreeMap::new(),
    };

    for entry in state.users.iter() {
        let user = entry.value();
        stats.total_users += 1;
        if user.status == UserStatus::Active {
            stats.active_users += 1;
        }
        *stats.role_distribution.entry(user.role).or_default() += 1;
    }

    stats
}
