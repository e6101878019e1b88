//! Connection health checking
//!
//! Runs the sentinel query and classifies the round-trip latency.

use crate::Connection;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Sentinel query used to test a session
pub const PING_QUERY: &str = "SELECT 1 AS test_value";

/// Result of a ping operation
pub type PingResult = std::result::Result<Duration, PingError>;

/// Error that can occur during a ping operation
#[derive(Debug, Clone, thiserror::Error)]
pub enum PingError {
    #[error("Connection is closed")]
    ConnectionClosed,
    #[error("Ping query failed: {0}")]
    QueryFailed(String),
    #[error("Ping returned an unexpected result: {0}")]
    UnexpectedResult(String),
}

/// Ping a connection and return the round-trip time.
///
/// Succeeds only when the sentinel value `1` comes back.
pub async fn ping_database<C: Connection + ?Sized>(conn: &C) -> PingResult {
    if conn.is_closed() {
        return Err(PingError::ConnectionClosed);
    }

    let start = Instant::now();
    let result = conn
        .execute(PING_QUERY, &[])
        .await
        .map_err(|e| PingError::QueryFailed(e.to_string()))?;
    let latency = start.elapsed();

    match result.first().and_then(|row| row.get_i64("test_value")) {
        Some(1) => Ok(latency),
        Some(other) => Err(PingError::UnexpectedResult(other.to_string())),
        None => Err(PingError::UnexpectedResult("no rows".to_string())),
    }
}

/// Health status of a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Latency at or below 100ms
    #[default]
    Healthy,
    /// Latency at or below 500ms
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn from_latency(latency: Duration) -> Self {
        if latency <= Duration::from_millis(100) {
            HealthStatus::Healthy
        } else if latency <= Duration::from_millis(500) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}
