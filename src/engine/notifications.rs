use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::query::{
    contains_ci, paginate, search, Page, PageRequest, Searchable, SortValue, Sortable,
};
use crate::engine::validate;
use crate::error::AppError;
use crate::models::notification::{Notification, NotificationStatus, NotificationType};
use crate::models::user::User;
use crate::state::AppState;

/// Outbound delivery for email, SMS and push notifications.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn deliver(
        &self,
        notification: &Notification,
        recipient: Option<&User>,
    ) -> Result<(), AppError>;
}

/// Channel that records the delivery in the log and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn deliver(
        &self,
        notification: &Notification,
        recipient: Option<&User>,
    ) -> Result<(), AppError> {
        let recipient = recipient.ok_or_else(|| {
            AppError::NotFound(format!("recipient {} not found", notification.user_id))
        })?;

        let address = match notification.kind {
            NotificationType::Email => &recipient.email,
            _ => &recipient.phone,
        };
        info!(
            notification_id = %notification.id,
            kind = ?notification.kind,
            to = %address,
            title = %notification.title,
            "notification dispatched"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationRequest {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: NotificationType,
    pub metadata: Option<Value>,
}

fn default_kind() -> NotificationType {
    NotificationType::InApp
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub count: usize,
}

impl Sortable for Notification {
    const SORT_FIELDS: &'static [&'static str] = &["createdAt", "sentAt", "title"];

    fn sort_value(&self, field: &str) -> SortValue<'_> {
        match field {
            "createdAt" => SortValue::Time(self.created_at),
            "sentAt" => self.sent_at.map_or(SortValue::Missing, SortValue::Time),
            "title" => SortValue::Text(&self.title),
            _ => SortValue::Missing,
        }
    }

    fn seq(&self) -> u64 {
        self.seq
    }
}

impl Searchable for Notification {
    fn matches_search(&self, needle: &str) -> bool {
        contains_ci(&self.title, needle) || contains_ci(&self.message, needle)
    }
}

fn outcome_label(status: NotificationStatus) -> &'static str {
    match status {
        NotificationStatus::Pending => "pending",
        NotificationStatus::Sent => "sent",
        NotificationStatus::Failed => "failed",
    }
}

/// Stores the notification and pushes it through the delivery channel.
///
/// Delivery failures are recorded on the notification, not returned.
pub async fn create_notification(
    state: &AppState,
    payload: CreateNotificationRequest,
) -> Result<Notification, AppError> {
    let title = validate::required("title", &payload.title)?;
    let message = validate::required("message", &payload.message)?;
    let recipient = state.users.get(&payload.user_id).map(|user| user.value().clone());
    if recipient.is_none() {
        return Err(AppError::NotFound(format!(
            "user {} not found",
            payload.user_id
        )));
    }

    let mut notification = Notification {
        id: Uuid::new_v4(),
        user_id: payload.user_id,
        title,
        message,
        kind: payload.kind,
        status: NotificationStatus::Pending,
        is_read: false,
        sent_at: None,
        read_at: None,
        metadata: payload.metadata,
        failure_reason: None,
        created_at: Utc::now(),
        seq: state.next_seq(),
    };

    if notification.kind == NotificationType::InApp {
        notification.status = NotificationStatus::Sent;
        notification.sent_at = Some(notification.created_at);
    } else {
        match state
            .notifier
            .deliver(&notification, recipient.as_ref())
            .await
        {
            Ok(()) => {
                notification.status = NotificationStatus::Sent;
                notification.sent_at = Some(Utc::now());
            }
            Err(err) => {
                warn!(notification_id = %notification.id, error = %err, "notification delivery failed");
                notification.status = NotificationStatus::Failed;
                notification.failure_reason = Some(err.to_string());
            }
        }
    }

    state
        .metrics
        .notifications_total
        .with_label_values(&[outcome_label(notification.status)])
        .inc();
    state.notifications.insert(notification.id, notification.clone());

    Ok(notification)
}

/// In-app message raised by the system itself, e.g. on a status change.
pub fn notify_in_app(
    state: &AppState,
    user_id: Uuid,
    title: impl Into<String>,
    message: impl Into<String>,
    metadata: Option<Value>,
) -> Notification {
    let now = Utc::now();
    let notification = Notification {
        id: Uuid::new_v4(),
        user_id,
        title: title.into(),
        message: message.into(),
        kind: NotificationType::InApp,
        status: NotificationStatus::Sent,
        is_read: false,
        sent_at: Some(now),
        read_at: None,
        metadata,
        failure_reason: None,
        created_at: now,
        seq: state.next_seq(),
    };

    state
        .metrics
        .notifications_total
        .with_label_values(&[outcome_label(notification.status)])
        .inc();
    state.notifications.insert(notification.id, notification.clone());
    notification
}

pub fn list_for_user(
    state: &AppState,
    user_id: Uuid,
    request: &PageRequest,
) -> Result<Page<Notification>, AppError> {
    let own: Vec<Notification> = state
        .notifications
        .iter()
        .filter(|entry| entry.value().user_id == user_id)
        .map(|entry| entry.value().clone())
        .collect();
    paginate(search(own, request.search.as_deref()), request)
}

pub fn unread_count(state: &AppState, user_id: Uuid) -> UnreadCount {
    let count = state
        .notifications
        .iter()
        .filter(|entry| entry.value().user_id == user_id && !entry.value().is_read)
        .count();
    UnreadCount { count }
}

/// Marks one notification read. Only its owner, or an admin, may do so.
pub fn mark_read(
    state: &AppState,
    id: Uuid,
    caller: Uuid,
    is_admin: bool,
) -> Result<Notification, AppError> {
    let mut notification = state
        .notifications
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;

    if notification.user_id != caller && !is_admin {
        return Err(AppError::Forbidden(
            "notification belongs to another user".to_string(),
        ));
    }

    if !notification.is_read {
        notification.is_read = true;
        notification.read_at = Some(Utc::now());
    }
    Ok(notification.clone())
}

/// Returns how many notifications changed.
pub fn mark_all_read(state: &AppState, user_id: Uuid) -> usize {
    let now = Utc::now();
    let mut updated = 0;

    for mut entry in state.notifications.iter_mut() {
        let notification = entry.value_mut();
        if notification.user_id == user_id && !notification.is_read {
            notification.is_read = true;
            notification.read_at = Some(now);
            updated += 1;
        }
    }

    info!(user_id = %user_id, updated, "notifications marked read");
    updated
}
