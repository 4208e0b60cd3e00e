// Systemd integration module

pub mod client;
pub mod models;
pub mod resilience;


pub use client::SystemdClient;
pub use models::{
    Counters, Event, EventKind, PropertiesSnapshot, UnitRecord, RUNNING_LIKE, STOPPED_LIKE,
};
pub use resilience::ConnectionManager;
