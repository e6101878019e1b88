//! TPC-C transaction profiles
//!
//! Each profile assembles statements over the fixed TPC-C schema and runs the
//! writes as one batch. Profiles are an error boundary: they return a
//! [`ProfileOutcome`] instead of propagating errors.

mod delivery;
mod new_order;
mod payment;
mod stock_level;

use std::sync::Arc;
use std::time::Instant;
use tpcc_core::{Connection, Row};

use crate::error::{ServiceError, ServiceResult};

/// Districts per warehouse
pub const DISTRICTS_PER_WAREHOUSE: i32 = 10;

/// Result of running a profile
#[derive(Debug)]
pub enum ProfileOutcome<T> {
    Success(T),
    Failure { error: ServiceError },
}

impl<T> ProfileOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ProfileOutcome::Success(_))
    }

    pub fn success(&self) -> Option<&T> {
        match self {
            ProfileOutcome::Success(value) => Some(value),
            ProfileOutcome::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ServiceError> {
        match self {
            ProfileOutcome::Success(_) => None,
            ProfileOutcome::Failure { error } => Some(error),
        }
    }

    pub fn into_result(self) -> ServiceResult<T> {
        match self {
            ProfileOutcome::Success(value) => Ok(value),
            ProfileOutcome::Failure { error } => Err(error),
        }
    }
}

impl<T> From<ServiceResult<T>> for ProfileOutcome<T> {
    fn from(result: ServiceResult<T>) -> Self {
        match result {
            Ok(value) => ProfileOutcome::Success(value),
            Err(error) => ProfileOutcome::Failure { error },
        }
    }
}

/// Runs the TPC-C transaction profiles on one connection
pub struct TpccService {
    conn: Arc<dyn Connection>,
}

impl TpccService {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.conn
    }
}

/// Log the outcome of a profile with its timing and turn it into a [`ProfileOutcome`]
fn finish<T>(profile: &str, started: Instant, result: ServiceResult<T>) -> ProfileOutcome<T> {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &result {
        Ok(_) => tracing::info!(profile, elapsed_ms, "transaction completed"),
        Err(e) => tracing::error!(profile, elapsed_ms, error = %e, "transaction failed"),
    }
    result.into()
}

fn required_i64(row: &Row, column: &str) -> ServiceResult<i64> {
    row.get_i64(column).ok_or_else(|| {
        ServiceError::Database(tpcc_core::TpccError::Other(format!(
            "column '{}' missing or not an integer",
            column
        )))
    })
}

fn timestamp_now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}
