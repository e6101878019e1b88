//! Shared fixtures for the integration tests.
//!
//! Each test gets a fresh connection to the seeded database from
//! [`crate::test_containers`]. Modules that write claim their own warehouse
//! through [`Warehouse`] so their writes never meet.
//!
//! ```rust,ignore
//! use crate::fixtures::{Warehouse, test_connection};
//!
//! #[rstest]
//! #[tokio::test]
//! async fn test_something() -> anyhow::Result<()> {
//!     let conn = test_connection().await?;
//!     let w = Warehouse::Payment.id();
//!     // ...
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use std::sync::{Arc, Once};
use tpcc_core::{Connection, ConnectionConfig, DatabaseDriver, DbProvider, Value};
use tpcc_drivers::DriverRegistry;

use crate::test_containers::test_database;

static LOGGING: Once = Once::new();

/// Install a test-writer subscriber once per process. `RUST_LOG` overrides
/// the default of warnings plus info from the tpcc crates.
pub fn initialize_logging() {
    LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("warn,tpcc_driver_tests=info,tpcc_services=info")
        });
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Warehouse owned by one test module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warehouse {
    /// New Order placements
    NewOrder,
    /// Payments
    Payment,
    /// Deliveries
    Delivery,
    /// Read-only checks: stock level, analytics
    ReadOnly,
    /// Raw batch and autocommit tests on district rows
    Batch,
    /// Remote supplier for New Order lines
    Supplier,
}

impl Warehouse {
    /// Warehouse id in the seeded dataset
    pub fn id(self) -> i32 {
        match self {
            Warehouse::NewOrder => 1,
            Warehouse::Payment => 2,
            Warehouse::Delivery => 3,
            Warehouse::ReadOnly => 4,
            Warehouse::Batch => 5,
            Warehouse::Supplier => 6,
        }
    }
}

/// Connection configuration for the seeded database
pub async fn test_config() -> Result<ConnectionConfig> {
    let database = test_database().await?;
    Ok(ConnectionConfig::new(DbProvider::Cockroach, &database.connection_string)
        .with_application_name("tpcc-driver-tests"))
}

/// The registered driver for the test provider
pub fn test_driver() -> Result<Arc<dyn DatabaseDriver>> {
    Ok(DriverRegistry::with_defaults().driver_for(DbProvider::Cockroach)?)
}

/// A fresh connection to the seeded database
pub async fn test_connection() -> Result<Arc<dyn Connection>> {
    initialize_logging();
    let config = test_config().await?;
    test_driver()?
        .connect(&config)
        .await
        .context("failed to connect to test database")
}

/// Run a single-value query and read column `column` as an integer
pub async fn query_i64(
    conn: &Arc<dyn Connection>,
    sql: &str,
    params: &[Value],
    column: &str,
) -> Result<i64> {
    let result = conn.execute(sql, params).await?;
    result
        .first()
        .and_then(|row| row.get_i64(column))
        .with_context(|| format!("no integer column '{}' in result of: {}", column, sql))
}

/// Run a single-value query and read column `column` as a decimal
pub async fn query_decimal(
    conn: &Arc<dyn Connection>,
    sql: &str,
    params: &[Value],
    column: &str,
) -> Result<rust_decimal::Decimal> {
    let result = conn.execute(sql, params).await?;
    result
        .first()
        .and_then(|row| row.get_decimal(column))
        .with_context(|| format!("no decimal column '{}' in result of: {}", column, sql))
}
