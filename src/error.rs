// Error types for unitwatch

use thiserror::Error;

/// Result type alias using anyhow::Error
pub type Result<T> = anyhow::Result<T>;

/// Unitwatch-specific error types
#[derive(Error, Debug)]
pub enum UnitwatchError {
    #[error("Failed to connect to systemd D-Bus: {0}")]
    SystemdConnection(String),

    #[error("Failed to fetch unit information: {0}")]
    UnitInfo(String),

    #[error("Unit '{0}' is not loaded")]
    UnitNotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
