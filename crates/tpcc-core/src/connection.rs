//! Connection trait and transaction handling

use crate::{Result, ResultSet, StatementBatch, Value};
use async_trait::async_trait;

/// A database session.
///
/// Connections start in autocommit mode. With autocommit disabled, `execute`
/// opens an implicit transaction that stays open until [`Connection::commit`]
/// or [`Connection::rollback`].
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "cockroach")
    fn driver_name(&self) -> &str;

    /// Execute a single statement.
    ///
    /// Rows are returned for statements classified as reads (see
    /// [`crate::StatementKind`]); otherwise only the affected row count is set.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ResultSet>;

    /// Begin an explicit transaction on this session
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Whether each statement currently commits on its own
    fn autocommit(&self) -> bool;

    /// Change the autocommit mode.
    ///
    /// Fails when an implicit transaction is open and the mode would change.
    async fn set_autocommit(&self, enabled: bool) -> Result<()>;

    /// Commit the implicit transaction, if one is open
    async fn commit(&self) -> Result<()>;

    /// Roll back the implicit transaction, if one is open
    async fn rollback(&self) -> Result<()>;

    /// Close the connection. Idempotent; the handle is closed afterwards
    /// even when the backend reports an error.
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Execute statements as one all-or-nothing unit of work.
    ///
    /// Returns one result set per statement, in order. On failure the
    /// transaction is rolled back before the error is returned. The autocommit
    /// mode is restored afterwards either way.
    async fn execute_batch(&self, batch: &StatementBatch) -> Result<Vec<ResultSet>> {
        crate::transaction::run_batch(self, batch).await
    }

    /// Run the sentinel query and report whether the session is usable.
    ///
    /// Never fails; errors are logged and reported as `false`.
    async fn test_connection(&self) -> bool {
        match crate::health::ping_database(self).await {
            Ok(latency) => {
                tracing::info!(
                    driver = self.driver_name(),
                    latency_ms = latency.as_millis() as u64,
                    status = ?crate::health::HealthStatus::from_latency(latency),
                    "connection test passed"
                );
                true
            }
            Err(e) => {
                tracing::error!(driver = self.driver_name(), error = %e, "connection test failed");
                false
            }
        }
    }
}

/// An explicit database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Execute a statement inside the transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ResultSet>;

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;
}
