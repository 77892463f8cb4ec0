use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::notifications::{LogChannel, NotificationChannel};
use crate::engine::settings::seed_defaults;
use crate::models::agent::Agent;
use crate::models::notification::Notification;
use crate::models::parcel::Parcel;
use crate::models::payment::Payment;
use crate::models::setting::Setting;
use crate::models::user::User;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub users: DashMap<Uuid, User>,
    pub user_emails: DashMap<String, Uuid>,
    pub user_phones: DashMap<String, Uuid>,
    pub agents: DashMap<Uuid, Agent>,
    pub agents_by_user: DashMap<Uuid, Uuid>,
    pub parcels: DashMap<Uuid, Parcel>,
    pub tracking_index: DashMap<String, Uuid>,
    pub payments: DashMap<Uuid, Payment>,
    pub notifications: DashMap<Uuid, Notification>,
    pub settings: DashMap<String, Setting>,
    pub notifier: Arc<dyn NotificationChannel>,
    pub metrics: Metrics,
    pub tracking_id_max_attempts: u32,
    sequence: AtomicU64,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self::with_notifier(config, Arc::new(LogChannel))
    }

    pub fn with_notifier(config: &Config, notifier: Arc<dyn NotificationChannel>) -> Self {
        let state = Self {
            users: DashMap::new(),
            user_emails: DashMap::new(),
            user_phones: DashMap::new(),
            agents: DashMap::new(),
            agents_by_user: DashMap::new(),
            parcels: DashMap::new(),
            tracking_index: DashMap::new(),
            payments: DashMap::new(),
            notifications: DashMap::new(),
            settings: DashMap::new(),
            notifier,
            metrics: Metrics::new(),
            tracking_id_max_attempts: config.tracking_id_max_attempts.max(1),
            sequence: AtomicU64::new(0),
        };

        if config.seed_default_settings {
            seed_defaults(&state);
        }

        state
    }

    /// Monotonic insertion counter; breaks ties between records created in
    /// the same instant so listings have a stable order.
    pub fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }
}
