pub mod agents;
pub mod analytics;
pub mod lifecycle;
pub mod notifications;
pub mod parcels;
pub mod payments;
pub mod query;
pub mod settings;
pub mod tracking;
pub mod tracking_code;
pub mod users;
pub mod validate;
