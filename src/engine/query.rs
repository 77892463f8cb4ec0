use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::agent::{Agent, AgentView};
use crate::models::parcel::{Parcel, ParcelStatus, ParcelView};
use crate::models::user::UserSummary;
use crate::state::AppState;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;
const DEFAULT_SORT_FIELD: &str = "createdAt";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Raw `page`/`limit`/`search`/`sortBy`/`sortOrder` query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            search: None,
            sort_by: None,
            sort_order: SortOrder::Desc,
        }
    }
}

impl PaginationParams {
    pub fn validate(self) -> Result<PageRequest, AppError> {
        let page = self.page.unwrap_or(DEFAULT_PAGE);
        if page < 1 {
            return Err(AppError::BadRequest("page must be >= 1".to_string()));
        }

        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(AppError::BadRequest(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }

        Ok(PageRequest {
            page,
            limit,
            search: non_blank(self.search),
            sort_by: non_blank(self.sort_by),
            sort_order: self.sort_order.unwrap_or_default(),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}

pub enum SortValue<'a> {
    Text(&'a str),
    Number(f64),
    Time(DateTime<Utc>),
    Missing,
}

fn compare_values(a: &SortValue<'_>, b: &SortValue<'_>) -> Ordering {
    match (a, b) {
        (SortValue::Text(a), SortValue::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
        (SortValue::Time(a), SortValue::Time(b)) => a.cmp(b),
        (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
        (SortValue::Missing, _) => Ordering::Less,
        (_, SortValue::Missing) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

pub trait Sortable {
    /// Field names accepted in `sortBy`.
    const SORT_FIELDS: &'static [&'static str];

    fn sort_value(&self, field: &str) -> SortValue<'_>;

    /// Insertion sequence, used as the tie-breaker.
    fn seq(&self) -> u64;
}

pub trait Searchable {
    /// `needle` is already lowercased.
    fn matches_search(&self, needle: &str) -> bool;
}

pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

pub fn search<T: Searchable>(items: Vec<T>, needle: Option<&str>) -> Vec<T> {
    match needle {
        Some(needle) => {
            let needle = needle.to_lowercase();
            items
                .into_iter()
                .filter(|item| item.matches_search(&needle))
                .collect()
        }
        None => items,
    }
}

/// Sorts and slices already-filtered records.
pub fn paginate<T: Sortable>(mut items: Vec<T>, request: &PageRequest) -> Result<Page<T>, AppError> {
    let field = request.sort_by.as_deref().unwrap_or(DEFAULT_SORT_FIELD);
    if !T::SORT_FIELDS.contains(&field) {
        return Err(AppError::BadRequest(format!(
            "cannot sort by {field}, expected one of: {}",
            T::SORT_FIELDS.join(", ")
        )));
    }

    items.sort_by(|a, b| {
        let ordering = compare_values(&a.sort_value(field), &b.sort_value(field))
            .then_with(|| a.seq().cmp(&b.seq()));
        match request.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    let total = items.len();
    let limit = request.limit.max(1);
    let skip = (request.page.max(1) as usize - 1).saturating_mul(limit as usize);
    let data = items.into_iter().skip(skip).take(limit as usize).collect();

    Ok(Page {
        data,
        total,
        page: request.page,
        limit,
        total_pages: (total as u64).div_ceil(limit as u64),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParcelFilter {
    Customer(Uuid),
    Agent(Uuid),
    Status(ParcelStatus),
    /// Lowercased needle.
    Search(String),
    CreatedBetween {
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    },
}

impl ParcelFilter {
    pub fn matches(&self, parcel: &Parcel) -> bool {
        match self {
            ParcelFilter::Customer(id) => parcel.customer_id == *id,
            ParcelFilter::Agent(id) => parcel.agent_id == Some(*id),
            ParcelFilter::Status(status) => parcel.status == *status,
            ParcelFilter::Search(needle) => parcel.matches_search(needle),
            ParcelFilter::CreatedBetween { from, to } => {
                from.is_none_or(|from| parcel.created_at >= from)
                    && to.is_none_or(|to| parcel.created_at <= to)
            }
        }
    }
}

/// Conjunction of parcel filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParcelQuery {
    filters: Vec<ParcelFilter>,
}

impl ParcelQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: ParcelFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn customer(self, id: Uuid) -> Self {
        self.with(ParcelFilter::Customer(id))
    }

    pub fn agent(self, id: Uuid) -> Self {
        self.with(ParcelFilter::Agent(id))
    }

    pub fn status(self, status: ParcelStatus) -> Self {
        self.with(ParcelFilter::Status(status))
    }

    pub fn search(self, needle: Option<&str>) -> Self {
        match needle.map(str::trim).filter(|needle| !needle.is_empty()) {
            Some(needle) => self.with(ParcelFilter::Search(needle.to_lowercase())),
            None => self,
        }
    }

    pub fn created_between(self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        if from.is_none() && to.is_none() {
            return self;
        }
        self.with(ParcelFilter::CreatedBetween { from, to })
    }

    pub fn filters(&self) -> &[ParcelFilter] {
        &self.filters
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for filter in &self.filters {
            if let ParcelFilter::CreatedBetween {
                from: Some(from),
                to: Some(to),
            } = filter
            {
                if from > to {
                    return Err(AppError::BadRequest(
                        "creation window starts after it ends".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn matches(&self, parcel: &Parcel) -> bool {
        self.filters.iter().all(|filter| filter.matches(parcel))
    }
}

impl Sortable for Parcel {
    const SORT_FIELDS: &'static [&'static str] = &[
        "createdAt",
        "updatedAt",
        "trackingId",
        "recipientName",
        "status",
        "deliveryFee",
        "weight",
    ];

    fn sort_value(&self, field: &str) -> SortValue<'_> {
        match field {
            "createdAt" => SortValue::Time(self.created_at),
            "updatedAt" => SortValue::Time(self.updated_at),
            "trackingId" => SortValue::Text(&self.tracking_id),
            "recipientName" => SortValue::Text(&self.recipient_name),
            "status" => SortValue::Text(self.status.as_str()),
            "deliveryFee" => SortValue::Number(self.delivery_fee),
            "weight" => SortValue::Number(self.weight),
            _ => SortValue::Missing,
        }
    }

    fn seq(&self) -> u64 {
        self.seq
    }
}

impl Searchable for Parcel {
    fn matches_search(&self, needle: &str) -> bool {
        contains_ci(&self.tracking_id, needle)
            || contains_ci(&self.recipient_name, needle)
            || contains_ci(&self.delivery_address, needle)
    }
}

pub fn user_summary(state: &AppState, user_id: Uuid) -> Option<UserSummary> {
    state
        .users
        .get(&user_id)
        .map(|user| UserSummary::from(user.value()))
}

/// Identity of the user behind an agent record.
pub fn agent_summary(state: &AppState, agent_id: Uuid) -> Option<UserSummary> {
    let user_id = state.agents.get(&agent_id).map(|agent| agent.user_id)?;
    user_summary(state, user_id)
}

pub fn compose_parcel_view(state: &AppState, parcel: Parcel) -> ParcelView {
    let customer = user_summary(state, parcel.customer_id);
    let agent = parcel
        .agent_id
        .and_then(|agent_id| agent_summary(state, agent_id));

    ParcelView {
        parcel,
        customer,
        agent,
    }
}

pub fn compose_agent_view(state: &AppState, agent: Agent) -> AgentView {
    let user = user_summary(state, agent.user_id);
    AgentView { agent, user }
}
