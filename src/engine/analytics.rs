use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::agent::AgentStatus;
use crate::models::parcel::ParcelStatus;
use crate::models::payment::{PaymentStatus, PaymentType};
use crate::models::user::Role;
use crate::state::AppState;

pub const DEFAULT_DAYS: u32 = 30;
pub const MAX_DAYS: u32 = 365;
pub const DEFAULT_TOP_CUSTOMERS: u32 = 10;
const MAX_TOP_CUSTOMERS: u32 = 100;
const UNSPECIFIED_REASON: &str = "unspecified";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub parcels: ParcelCounts,
    pub revenue: RevenueTotals,
    pub customers: usize,
    pub agents: AgentCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParcelCounts {
    pub total: usize,
    pub today: usize,
    pub monthly: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueTotals {
    pub total: f64,
    pub monthly: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentCounts {
    pub total: usize,
    pub available: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStatusCount {
    pub date: NaiveDate,
    pub status: ParcelStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelAnalytics {
    pub days: u32,
    pub daily_stats: Vec<DailyStatusCount>,
    pub status_distribution: BTreeMap<ParcelStatus, usize>,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueBucket {
    pub revenue: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub payment_type: PaymentType,
    pub revenue: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueAnalytics {
    pub days: u32,
    pub daily_revenue: Vec<DailyRevenue>,
    pub payment_types: BTreeMap<PaymentType, RevenueBucket>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPerformance {
    pub agent_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub total_deliveries: u64,
    pub successful_deliveries: u64,
    pub failed_deliveries: u64,
    pub rating: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopCustomer {
    pub customer_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub total_parcels: usize,
    pub total_spent: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReason {
    pub reason: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFailures {
    pub agent_id: Uuid,
    pub agent_name: Option<String>,
    pub failed_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedDeliveryAnalysis {
    pub reason_analysis: Vec<FailureReason>,
    pub agent_analysis: Vec<AgentFailures>,
}

pub fn validate_days(days: Option<u32>) -> Result<u32, AppError> {
    let days = days.unwrap_or(DEFAULT_DAYS);
    if !(1..=MAX_DAYS).contains(&days) {
        return Err(AppError::BadRequest(format!(
            "days must be between 1 and {MAX_DAYS}"
        )));
    }
    Ok(days)
}

pub fn validate_top_limit(limit: Option<u32>) -> Result<u32, AppError> {
    let limit = limit.unwrap_or(DEFAULT_TOP_CUSTOMERS);
    if !(1..=MAX_TOP_CUSTOMERS).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {MAX_TOP_CUSTOMERS}"
        )));
    }
    Ok(limit)
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc()
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .with_day(1)
        .unwrap_or(now.date_naive())
        .and_time(chrono::NaiveTime::MIN)
        .and_utc()
}

fn user_identity(state: &AppState, user_id: Uuid) -> (Option<String>, Option<String>) {
    state
        .users
        .get(&user_id)
        .map(|user| (Some(user.name.clone()), Some(user.email.clone())))
        .unwrap_or((None, None))
}

pub fn dashboard(state: &AppState) -> Dashboard {
    let now = Utc::now();
    let today = start_of_day(now);
    let month = start_of_month(now);

    let mut parcels = ParcelCounts {
        total: 0,
        today: 0,
        monthly: 0,
    };
    for entry in state.parcels.iter() {
        let created_at = entry.value().created_at;
        parcels.total += 1;
        if created_at >= today {
            parcels.today += 1;
        }
        if created_at >= month {
            parcels.monthly += 1;
        }
    }

    let mut revenue = RevenueTotals {
        total: 0.0,
        monthly: 0.0,
    };
    for entry in state.payments.iter() {
        let payment = entry.value();
        if payment.status != PaymentStatus::Completed {
            continue;
        }
        revenue.total += payment.amount;
        if payment.created_at >= month {
            revenue.monthly += payment.amount;
        }
    }

    let customers = state
        .users
        .iter()
        .filter(|entry| entry.value().role == Role::Customer)
        .count();

    let agents = AgentCounts {
        total: state.agents.len(),
        available: state
            .agents
            .iter()
            .filter(|entry| entry.value().status == AgentStatus::Available)
            .count(),
    };

    Dashboard {
        parcels,
        revenue,
        customers,
        agents,
    }
}

pub fn parcel_analytics(state: &AppState, days: u32) -> ParcelAnalytics {
    let since = Utc::now() - Duration::days(i64::from(days));
    let mut daily: BTreeMap<(NaiveDate, ParcelStatus), usize> = BTreeMap::new();
    let mut status_distribution = BTreeMap::new();

    for entry in state.parcels.iter() {
        let parcel = entry.value();
        *status_distribution.entry(parcel.status).or_default() += 1;
        if parcel.created_at >= since {
            *daily
                .entry((parcel.created_at.date_naive(), parcel.status))
                .or_default() += 1;
        }
    }

    let delivered = status_distribution
        .get(&ParcelStatus::Delivered)
        .copied()
        .unwrap_or_default();
    let failed = status_distribution
        .get(&ParcelStatus::Failed)
        .copied()
        .unwrap_or_default();

    ParcelAnalytics {
        days,
        daily_stats: daily
            .into_iter()
            .map(|((date, status), count)| DailyStatusCount {
                date,
                status,
                count,
            })
            .collect(),
        status_distribution,
        delivered,
        failed,
    }
}

pub fn revenue_analytics(state: &AppState, days: u32) -> RevenueAnalytics {
    let since = Utc::now() - Duration::days(i64::from(days));
    let mut daily: BTreeMap<(NaiveDate, PaymentType), RevenueBucket> = BTreeMap::new();
    let mut payment_types: BTreeMap<PaymentType, RevenueBucket> = BTreeMap::new();

    for entry in state.payments.iter() {
        let payment = entry.value();
        if payment.status != PaymentStatus::Completed {
            continue;
        }

        let total = payment_types.entry(payment.payment_type).or_default();
        total.revenue += payment.amount;
        total.count += 1;

        if payment.created_at >= since {
            let bucket = daily
                .entry((payment.created_at.date_naive(), payment.payment_type))
                .or_default();
            bucket.revenue += payment.amount;
            bucket.count += 1;
        }
    }

    RevenueAnalytics {
        days,
        daily_revenue: daily
            .into_iter()
            .map(|((date, payment_type), bucket)| DailyRevenue {
                date,
                payment_type,
                revenue: bucket.revenue,
                count: bucket.count,
            })
            .collect(),
        payment_types,
    }
}

/// Agents by success rate, best first.
pub fn agent_performance(state: &AppState) -> Vec<AgentPerformance> {
    let agents: Vec<_> = state
        .agents
        .iter()
        .map(|entry| entry.value().clone())
        .collect();

    let mut performance: Vec<AgentPerformance> = agents
        .into_iter()
        .map(|agent| {
            let (name, email) = user_identity(state, agent.user_id);
            AgentPerformance {
                agent_id: agent.id,
                name,
                email,
                total_deliveries: agent.total_deliveries,
                successful_deliveries: agent.successful_deliveries,
                failed_deliveries: agent.failed_deliveries,
                rating: agent.rating,
                success_rate: agent.success_rate(),
            }
        })
        .collect();

    performance.sort_by(|a, b| {
        b.success_rate
            .total_cmp(&a.success_rate)
            .then(b.total_deliveries.cmp(&a.total_deliveries))
    });
    performance
}

pub fn top_customers(state: &AppState, limit: u32) -> Vec<TopCustomer> {
    let mut totals: HashMap<Uuid, (usize, f64)> = HashMap::new();
    for entry in state.parcels.iter() {
        let parcel = entry.value();
        let total = totals.entry(parcel.customer_id).or_default();
        total.0 += 1;
        total.1 += parcel.delivery_fee;
    }

    let mut customers: Vec<TopCustomer> = totals
        .into_iter()
        .map(|(customer_id, (total_parcels, total_spent))| {
            let (name, email) = user_identity(state, customer_id);
            TopCustomer {
                customer_id,
                name,
                email,
                total_parcels,
                total_spent,
            }
        })
        .collect();

    customers.sort_by(|a, b| {
        b.total_parcels
            .cmp(&a.total_parcels)
            .then(b.total_spent.total_cmp(&a.total_spent))
            .then(a.customer_id.cmp(&b.customer_id))
    });
    customers.truncate(limit as usize);
    customers
}

pub fn failed_deliveries(state: &AppState) -> FailedDeliveryAnalysis {
    let mut reasons: HashMap<String, usize> = HashMap::new();
    let mut by_agent: HashMap<Uuid, usize> = HashMap::new();

    for entry in state.parcels.iter() {
        let parcel = entry.value();
        if parcel.status != ParcelStatus::Failed {
            continue;
        }
        let reason = parcel
            .failure_reason
            .clone()
            .unwrap_or_else(|| UNSPECIFIED_REASON.to_string());
        *reasons.entry(reason).or_default() += 1;
        if let Some(agent_id) = parcel.agent_id {
            *by_agent.entry(agent_id).or_default() += 1;
        }
    }

    let mut reason_analysis: Vec<FailureReason> = reasons
        .into_iter()
        .map(|(reason, count)| FailureReason { reason, count })
        .collect();
    reason_analysis.sort_by(|a, b| b.count.cmp(&a.count).then(a.reason.cmp(&b.reason)));

    let mut agent_analysis: Vec<AgentFailures> = by_agent
        .into_iter()
        .map(|(agent_id, failed_count)| {
            let user_id = state.agents.get(&agent_id).map(|agent| agent.user_id);
            let agent_name = user_id.and_then(|user_id| user_identity(state, user_id).0);
            AgentFailures {
                agent_id,
                agent_name,
                failed_count,
            }
        })
        .collect();
    agent_analysis.sort_by(|a, b| {
        b.failed_count
            .cmp(&a.failed_count)
            .then(a.agent_id.cmp(&b.agent_id))
    });

    FailedDeliveryAnalysis {
        reason_analysis,
        agent_analysis,
    }
}
