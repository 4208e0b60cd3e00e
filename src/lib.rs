// Unitwatch - systemd service state monitor
// Library root

pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod systemd;
pub mod version;
