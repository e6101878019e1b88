//! Batch state machine

use crate::statement::preview;
use crate::{Connection, Result, ResultSet, StatementBatch, TpccError};
use std::time::Instant;

/// Lifecycle of a transactional batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Transaction begun, statements executing
    Open,
    /// Every statement succeeded and COMMIT was issued
    Committed,
    /// A statement (or the commit) failed and the work was discarded
    RolledBack,
}

impl BatchState {
    /// Move to `next`. Only `Open` may transition, and only to a terminal state.
    pub fn transition(self, next: BatchState) -> Result<BatchState> {
        match (self, next) {
            (BatchState::Open, BatchState::Committed | BatchState::RolledBack) => Ok(next),
            (from, to) => Err(TpccError::Other(format!(
                "invalid batch transition {:?} -> {:?}",
                from, to
            ))),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchState::Open)
    }
}

/// Execute `batch` atomically on `conn`.
///
/// Autocommit is switched off for the duration of the batch and restored to
/// its previous value afterwards, whatever the outcome.
pub async fn run_batch<C: Connection + ?Sized>(
    conn: &C,
    batch: &StatementBatch,
) -> Result<Vec<ResultSet>> {
    if batch.is_empty() {
        tracing::debug!("empty batch, nothing to execute");
        return Ok(Vec::new());
    }

    let saved_autocommit = conn.autocommit();
    conn.set_autocommit(false).await?;

    let result = execute_atomically(conn, batch).await;

    let restored = conn.set_autocommit(saved_autocommit).await;
    if let Err(e) = &restored {
        tracing::error!(error = %e, autocommit = saved_autocommit, "failed to restore autocommit");
    }

    let results = result?;
    restored?;
    Ok(results)
}

async fn execute_atomically<C: Connection + ?Sized>(
    conn: &C,
    batch: &StatementBatch,
) -> Result<Vec<ResultSet>> {
    let start = Instant::now();
    let tx = conn.begin_transaction().await?;
    let state = BatchState::Open;
    let mut results = Vec::with_capacity(batch.len());

    for (index, statement) in batch.iter().enumerate() {
        match tx.execute(&statement.sql, &statement.params).await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!(
                    index,
                    statement = %preview(&statement.sql),
                    error = %e,
                    "batch statement failed, rolling back"
                );
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback after failed statement also failed");
                }
                let state = state.transition(BatchState::RolledBack)?;
                tracing::debug!(?state, "batch finished");
                return Err(e);
            }
        }
    }

    if let Err(e) = tx.commit().await {
        tracing::error!(error = %e, "batch commit failed");
        let state = state.transition(BatchState::RolledBack)?;
        tracing::debug!(?state, "batch finished");
        return Err(e);
    }
    let state = state.transition(BatchState::Committed)?;

    tracing::info!(
        statements = batch.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        ?state,
        "batch committed"
    );
    Ok(results)
}
