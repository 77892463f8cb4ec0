pub mod agent;
pub mod location;
pub mod notification;
pub mod parcel;
pub mod payment;
pub mod setting;
pub mod user;
