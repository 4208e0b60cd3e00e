// Resilient D-Bus connection handling with retry logic

use crate::error::{Result, UnitwatchError};
use std::time::Duration;
use tokio::time::sleep;
use zbus::Connection;

/// Connection manager with bounded retry for bus calls.
///
/// One hung unit must not stall monitoring of the rest, so every
/// synchronous call goes through `call_timeout`.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    max_retries: usize,
    retry_delay: Duration,
    call_timeout: Duration,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            call_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionManager {
    pub fn new(max_retries: usize, retry_delay: Duration, call_timeout: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            call_timeout,
        }
    }

    /// Bound one bus call by the configured call timeout. A hung peer
    /// must not stall the caller indefinitely.
    pub async fn bounded<T>(
        &self,
        operation_name: &str,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| UnitwatchError::UnitInfo(format!("{} timed out", operation_name)))?
    }

    /// Establish the system bus connection with retry logic.
    pub async fn connect_system(&self) -> Result<Connection> {
        self.with_retry("system bus connection", || async {
            let conn = tokio::time::timeout(self.call_timeout, Connection::system())
                .await
                .map_err(|_| UnitwatchError::SystemdConnection("Connection timeout".to_string()))?
                .map_err(|e| {
                    UnitwatchError::SystemdConnection(format!("Failed to connect: {}", e))
                })?;

            Ok(conn)
        })
        .await
    }

    /// Execute an operation with automatic retry.
    pub async fn with_retry<F, T, Fut>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::info!(
                            "Operation '{}' succeeded on attempt {}",
                            operation_name,
                            attempt
                        );
                    }
                    return Ok(result);
                }
                Err(error) => {
                    tracing::warn!(
                        "Operation '{}' failed on attempt {}: {}",
                        operation_name,
                        attempt,
                        error
                    );
                    last_error = Some(error);

                    if self.should_not_retry(last_error.as_ref().unwrap()) {
                        break;
                    }

                    if attempt < self.max_retries {
                        tracing::debug!("Retrying in {:?}...", self.retry_delay);
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            UnitwatchError::SystemdConnection("No error recorded during retry".to_string()).into()
        }))
    }

    /// Errors that retrying cannot fix.
    fn should_not_retry(&self, error: &anyhow::Error) -> bool {
        let error_str = error.to_string().to_lowercase();

        if error_str.contains("permission denied") || error_str.contains("access denied") {
            return true;
        }

        // NoSuchUnit from GetUnit means the unit is not loaded, which the
        // monitor handles as a state, not a transient failure.
        if error_str.contains("not loaded") || error_str.contains("no such") {
            return true;
        }

        if error_str.contains("authentication") || error_str.contains("auth") {
            return true;
        }

        if error_str.contains("invalid argument") || error_str.contains("invalid name") {
            return true;
        }

        false
    }
}
