use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::query::{
    paginate, user_summary, Page, PageRequest, SortValue, Sortable,
};
use crate::engine::tracking_code::random_base36;
use crate::engine::validate;
use crate::error::AppError;
use crate::models::payment::{Payment, PaymentStatus, PaymentType, PaymentView};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub parcel_id: Uuid,
    pub amount: f64,
    pub payment_type: PaymentType,
    pub payment_method: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailPaymentRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundPaymentRequest {
    /// Defaults to the full paid amount.
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBucket {
    pub count: usize,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStats {
    pub total_revenue: f64,
    pub cod_payments: usize,
    pub online_payments: usize,
    pub status_distribution: BTreeMap<PaymentStatus, StatusBucket>,
}

impl Sortable for Payment {
    const SORT_FIELDS: &'static [&'static str] = &["createdAt", "updatedAt", "amount", "paidAt"];

    fn sort_value(&self, field: &str) -> SortValue<'_> {
        match field {
            "createdAt" => SortValue::Time(self.created_at),
            "updatedAt" => SortValue::Time(self.updated_at),
            "amount" => SortValue::Number(self.amount),
            "paidAt" => self.paid_at.map_or(SortValue::Missing, SortValue::Time),
            _ => SortValue::Missing,
        }
    }

    fn seq(&self) -> u64 {
        self.seq
    }
}

/// `TXN` + Unix millis + six random base-36 chars.
pub fn generate_transaction_id() -> String {
    format!(
        "TXN{}{}",
        Utc::now().timestamp_millis(),
        random_base36(6)
    )
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("payment {id} not found"))
}

fn compose(state: &AppState, payment: Payment) -> PaymentView {
    let tracking_id = state
        .parcels
        .get(&payment.parcel_id)
        .map(|parcel| parcel.tracking_id.clone());
    let customer = user_summary(state, payment.customer_id);
    PaymentView {
        payment,
        tracking_id,
        customer,
    }
}

/// Records a pending payment for one of the customer's own parcels.
pub fn create_payment(
    state: &AppState,
    customer_id: Uuid,
    payload: CreatePaymentRequest,
) -> Result<PaymentView, AppError> {
    let amount = validate::positive("amount", payload.amount)?;
    let owner = state
        .parcels
        .get(&payload.parcel_id)
        .map(|parcel| parcel.customer_id)
        .ok_or_else(|| AppError::NotFound(format!("parcel {} not found", payload.parcel_id)))?;
    if owner != customer_id {
        return Err(AppError::Forbidden(format!(
            "parcel {} belongs to another customer",
            payload.parcel_id
        )));
    }

    let now = Utc::now();
    let payment = Payment {
        id: Uuid::new_v4(),
        parcel_id: payload.parcel_id,
        customer_id,
        amount,
        payment_type: payload.payment_type,
        status: PaymentStatus::Pending,
        transaction_id: generate_transaction_id(),
        payment_method: validate::optional(payload.payment_method)
            .unwrap_or_else(|| payload.payment_type.as_str().to_string()),
        paid_at: None,
        refunded_at: None,
        refund_amount: None,
        failure_reason: None,
        metadata: payload.metadata,
        created_at: now,
        updated_at: now,
        seq: state.next_seq(),
    };

    state.payments.insert(payment.id, payment.clone());
    info!(
        payment_id = %payment.id,
        parcel_id = %payment.parcel_id,
        transaction_id = %payment.transaction_id,
        amount,
        "payment recorded"
    );

    Ok(compose(state, payment))
}

pub fn list_payments(state: &AppState, request: &PageRequest) -> Result<Page<PaymentView>, AppError> {
    let payments: Vec<Payment> = state
        .payments
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    let page = paginate(payments, request)?;
    Ok(page.map(|payment| compose(state, payment)))
}

/// Applies `change` to the payment if it is currently in `from`.
fn transition(
    state: &AppState,
    id: Uuid,
    from: PaymentStatus,
    change: impl FnOnce(&mut Payment) -> Result<(), AppError>,
) -> Result<PaymentView, AppError> {
    let updated = {
        let mut payment = state.payments.get_mut(&id).ok_or_else(|| not_found(id))?;
        if payment.status != from {
            return Err(AppError::Conflict(format!(
                "payment {id} is {:?}, expected {:?}",
                payment.status, from
            )));
        }
        change(payment.value_mut())?;
        payment.updated_at = Utc::now();
        payment.clone()
    };

    info!(payment_id = %id, status = ?updated.status, "payment status changed");
    Ok(compose(state, updated))
}

pub fn confirm_payment(state: &AppState, id: Uuid) -> Result<PaymentView, AppError> {
    transition(state, id, PaymentStatus::Pending, |payment| {
        payment.status = PaymentStatus::Completed;
        payment.paid_at = Some(Utc::now());
        Ok(())
    })
}

pub fn fail_payment(state: &AppState, id: Uuid, reason: &str) -> Result<PaymentView, AppError> {
    let reason = validate::required("reason", reason)?;
    let view = transition(state, id, PaymentStatus::Pending, |payment| {
        payment.status = PaymentStatus::Failed;
        payment.failure_reason = Some(reason);
        Ok(())
    })?;
    warn!(payment_id = %id, "payment failed");
    Ok(view)
}

pub fn refund_payment(
    state: &AppState,
    id: Uuid,
    amount: Option<f64>,
) -> Result<PaymentView, AppError> {
    let amount = amount.map(|amount| validate::positive("amount", amount)).transpose()?;
    transition(state, id, PaymentStatus::Completed, |payment| {
        let refund = amount.unwrap_or(payment.amount);
        if refund > payment.amount {
            return Err(AppError::BadRequest(format!(
                "refund {refund} exceeds the paid amount {}",
                payment.amount
            )));
        }
        payment.status = PaymentStatus::Refunded;
        payment.refund_amount = Some(refund);
        payment.refunded_at = Some(Utc::now());
        Ok(())
    })
}

pub fn payment_stats(state: &AppState) -> PaymentStats {
    let mut stats = PaymentStats {
        total_revenue: 0.0,
        cod_payments: 0,
        online_payments: 0,
        status_distribution: BTreeMap::new(),
    };

    for entry in state.payments.iter() {
        let payment = entry.value();
        let bucket = stats.status_distribution.entry(payment.status).or_default();
        bucket.count += 1;
        bucket.total_amount += payment.amount;

        if payment.status == PaymentStatus::Completed {
            stats.total_revenue += payment.amount;
            match payment.payment_type {
                PaymentType::Cod => stats.cod_payments += 1,
                PaymentType::Online => stats.online_payments += 1,
                PaymentType::Prepaid => {}
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{
        confirm_payment, create_payment, fail_payment, generate_transaction_id, payment_stats,
        refund_payment, CreatePaymentRequest,
    };
    use crate::config::Config;
    use crate::engine::fixtures::parcel;
    use crate::error::AppError;
    use crate::models::payment::{PaymentStatus, PaymentType};
    use crate::state::AppState;

    fn seeded() -> (AppState, Uuid, Uuid) {
        let state = AppState::new(&Config::default());
        let parcel = parcel(1);
        let ids = (parcel.id, parcel.customer_id);
        state.parcels.insert(parcel.id, parcel);
        (state, ids.0, ids.1)
    }

    fn request(parcel_id: Uuid, amount: f64, payment_type: PaymentType) -> CreatePaymentRequest {
        CreatePaymentRequest {
            parcel_id,
            amount,
            payment_type,
            payment_method: None,
            metadata: None,
        }
    }

    #[test]
    fn transaction_id_shape() {
        let id = generate_transaction_id();
        assert!(id.starts_with("TXN"));
        assert_eq!(id.len(), 3 + 13 + 6);
    }

    #[test]
    fn customers_pay_only_for_their_own_parcels() {
        let (state, parcel_id, customer_id) = seeded();

        assert!(matches!(
            create_payment(&state, Uuid::new_v4(), request(parcel_id, 10.0, PaymentType::Online)),
            Err(AppError::Forbidden(_))
        ));
        assert!(create_payment(&state, customer_id, request(parcel_id, 0.0, PaymentType::Online)).is_err());

        let view = create_payment(&state, customer_id, request(parcel_id, 10.0, PaymentType::Online)).unwrap();
        assert_eq!(view.payment.status, PaymentStatus::Pending);
        assert_eq!(view.tracking_id.as_deref(), Some("TRK000001TEST00"));
    }

    #[test]
    fn lifecycle_confirm_then_refund() {
        let (state, parcel_id, customer_id) = seeded();
        let id = create_payment(&state, customer_id, request(parcel_id, 40.0, PaymentType::Cod))
            .unwrap()
            .payment
            .id;

        assert!(matches!(refund_payment(&state, id, None), Err(AppError::Conflict(_))));

        let paid = confirm_payment(&state, id).unwrap();
        assert!(paid.payment.paid_at.is_some());
        assert!(confirm_payment(&state, id).is_err());

        assert!(refund_payment(&state, id, Some(50.0)).is_err());
        let refunded = refund_payment(&state, id, Some(15.0)).unwrap();
        assert_eq!(refunded.payment.status, PaymentStatus::Refunded);
        assert_eq!(refunded.payment.refund_amount, Some(15.0));
    }

    #[test]
    fn failed_payments_keep_the_reason_and_stats_count_revenue() {
        let (state, parcel_id, customer_id) = seeded();
        let failed = create_payment(&state, customer_id, request(parcel_id, 12.0, PaymentType::Online))
            .unwrap()
            .payment
            .id;
        let paid = create_payment(&state, customer_id, request(parcel_id, 20.0, PaymentType::Online))
            .unwrap()
            .payment
            .id;

        let view = fail_payment(&state, failed, "card declined").unwrap();
        assert_eq!(view.payment.failure_reason.as_deref(), Some("card declined"));
        confirm_payment(&state, paid).unwrap();

        let stats = payment_stats(&state);
        assert_eq!(stats.total_revenue, 20.0);
        assert_eq!(stats.online_payments, 1);
        assert_eq!(stats.status_distribution[&PaymentStatus::Failed].count, 1);
    }
}
