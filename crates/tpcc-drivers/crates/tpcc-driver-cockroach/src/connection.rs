//! CockroachDB connection implementation

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Socket};
use tpcc_core::security::TlsConfig;
use tpcc_core::{
    Connection, ConnectionConfig, ResultSet, Result, Row, StatementKind, TpccError, Transaction,
    Value, preview,
};

use crate::tls::{CockroachTlsConnector, negotiation_mode};
use crate::values::{bind_params, row_from_pg};

pub(crate) fn format_cockroach_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let code = db_error.code();
    let mut message = db_error.message().to_string();

    if let Some(detail) = db_error.detail()
        && !detail.trim().is_empty()
    {
        message.push_str(&format!(" (detail: {})", detail));
    }

    if let Some(hint) = db_error.hint()
        && !hint.trim().is_empty()
    {
        message.push_str(&format!(" (hint: {})", hint));
    }

    if let Some(column) = db_error.column()
        && !column.trim().is_empty()
    {
        message.push_str(&format!(" (column: {})", column));
    }

    match code.code() {
        "23505" => format!("duplicate value violates unique constraint: {}", message),
        "23503" => format!("foreign key violation: {}", message),
        "23502" => format!("null value violates not-null constraint: {}", message),
        "23514" => format!("check constraint violation: {}", message),
        "40001" => format!("serialization failure, transaction must be retried: {}", message),
        "22007" => format!("invalid datetime format: {}", message),
        "22P02" => format!("invalid input syntax: {}", message),
        other => format!("{} (code: {})", message, other),
    }
}

/// Prepare, bind and run one statement, shaping the result by statement kind
async fn run_statement(client: &Client, sql: &str, params: &[Value]) -> Result<ResultSet> {
    let start = Instant::now();

    // Prepare first so parameters can be bound to the types the server inferred
    let statement = client
        .prepare(sql)
        .await
        .map_err(|e| TpccError::query(format_cockroach_error(&e), sql, params))?;

    let pg_params = bind_params(params, statement.params()).map_err(|(position, e)| {
        TpccError::query(format!("Invalid parameter ${}: {}", position, e), sql, params)
    })?;
    let param_refs: Vec<&(dyn ToSql + Sync)> =
        pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    if StatementKind::classify(sql).returns_rows() {
        let pg_rows = client
            .query(&statement, &param_refs)
            .await
            .map_err(|e| TpccError::query(format_cockroach_error(&e), sql, params))?;
        let rows: Vec<Row> = pg_rows.iter().map(row_from_pg).collect();
        let execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(row_count = rows.len(), execution_time_ms, "query executed");
        Ok(ResultSet {
            affected_rows: rows.len() as u64,
            rows,
            execution_time_ms,
        })
    } else {
        let affected_rows = client
            .execute(&statement, &param_refs)
            .await
            .map_err(|e| TpccError::query(format_cockroach_error(&e), sql, params))?;
        let execution_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(affected_rows, execution_time_ms, "statement executed");
        Ok(ResultSet {
            rows: Vec::new(),
            affected_rows,
            execution_time_ms,
        })
    }
}

async fn session_command(client: &Client, command: &str) -> Result<()> {
    client.batch_execute(command).await.map_err(|e| {
        TpccError::session(format!("{} failed: {}", command, format_cockroach_error(&e)))
    })
}

/// Wire client plus the transaction state tracked on top of it
struct Session {
    client: Client,
    /// Transaction opened by `execute` while autocommit is off
    implicit_tx: bool,
    /// An explicit transaction was dropped without commit or rollback
    abandoned: bool,
}

impl Session {
    /// Roll back whatever an abandoned transaction left open
    async fn recover(&mut self) {
        if !self.abandoned {
            return;
        }
        self.abandoned = false;
        tracing::warn!("rolling back transaction that was dropped without commit or rollback");
        if let Err(e) = self.client.batch_execute("ROLLBACK").await {
            tracing::warn!(error = %e, "rollback of abandoned transaction failed");
        }
    }
}

/// A single CockroachDB session
pub struct CockroachConnection {
    session: Arc<Mutex<Option<Session>>>,
    autocommit: AtomicBool,
    closed: AtomicBool,
}

impl CockroachConnection {
    /// Connect using the connection string in `config`.
    ///
    /// TLS parameters (`sslmode`, `sslrootcert`, `sslcert`, `sslkey`) are
    /// taken out of the string and applied through native-tls.
    #[tracing::instrument(skip(config), fields(target = %config.masked_connection_string()))]
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let raw = config.require_connection_string()?;
        let (tls, remaining) = TlsConfig::from_connection_string(raw)?;

        let mut pg_config: tokio_postgres::Config = remaining.parse().map_err(|e| {
            TpccError::Configuration(format!("Invalid connection string: {}", e))
        })?;
        if pg_config.get_hosts().is_empty() {
            return Err(TpccError::Configuration(
                "Connection string does not name a host".to_string(),
            ));
        }
        pg_config.connect_timeout(config.connect_timeout);
        pg_config.ssl_mode(negotiation_mode(tls.mode));
        if let Some(name) = &config.application_name {
            pg_config.application_name(name);
        }

        tracing::info!(ssl_mode = ?tls.mode, "connecting to CockroachDB");
        let start = Instant::now();

        let client = if CockroachTlsConnector::is_disabled(&tls) {
            establish(&pg_config, NoTls, config.connect_timeout).await?
        } else {
            let connector = CockroachTlsConnector::build(&tls)?;
            establish(&pg_config, connector, config.connect_timeout).await?
        };

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            "CockroachDB connection established"
        );
        Ok(Self {
            session: Arc::new(Mutex::new(Some(Session {
                client,
                implicit_tx: false,
                abandoned: false,
            }))),
            autocommit: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        })
    }
}

async fn establish<T>(config: &tokio_postgres::Config, tls: T, timeout: Duration) -> Result<Client>
where
    T: MakeTlsConnect<Socket> + Send,
    T::Stream: Send + 'static,
    T::TlsConnect: Send,
    <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
{
    let (client, connection) = tokio::time::timeout(timeout, config.connect(tls))
        .await
        .map_err(|_| {
            TpccError::Connection(format!(
                "Timed out after {:?} connecting to CockroachDB",
                timeout
            ))
        })?
        .map_err(|e| {
            TpccError::Connection(format!(
                "Failed to connect to CockroachDB: {}",
                format_cockroach_error(&e)
            ))
        })?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "CockroachDB connection error");
        }
    });

    Ok(client)
}

#[async_trait]
impl Connection for CockroachConnection {
    fn driver_name(&self) -> &str {
        "cockroach"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %preview(sql)))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(TpccError::NoConnection)?;
        session.recover().await;

        if !self.autocommit() && !session.implicit_tx {
            session_command(&session.client, "BEGIN").await?;
            session.implicit_tx = true;
        }

        run_statement(&session.client, sql, params).await
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        let mut guard = Arc::clone(&self.session).lock_owned().await;
        let session = guard.as_mut().ok_or(TpccError::NoConnection)?;
        session.recover().await;

        if session.implicit_tx {
            return Err(TpccError::session(
                "Cannot begin a transaction while an implicit transaction is open; commit or roll it back first",
            ));
        }

        session_command(&session.client, "BEGIN").await?;
        tracing::debug!("transaction begun");

        Ok(Box::new(CockroachTransaction {
            session: guard,
            finished: false,
        }))
    }

    fn autocommit(&self) -> bool {
        self.autocommit.load(Ordering::SeqCst)
    }

    async fn set_autocommit(&self, enabled: bool) -> Result<()> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(TpccError::NoConnection)?;
        if enabled && session.implicit_tx {
            return Err(TpccError::session(
                "Cannot enable autocommit while a transaction is open; commit or roll it back first",
            ));
        }
        self.autocommit.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(TpccError::NoConnection)?;
        if !session.implicit_tx {
            tracing::debug!("commit requested with no open transaction");
            return Ok(());
        }
        session.implicit_tx = false;
        session_command(&session.client, "COMMIT").await
    }

    async fn rollback(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(TpccError::NoConnection)?;
        if !session.implicit_tx {
            tracing::debug!("rollback requested with no open transaction");
            return Ok(());
        }
        session.implicit_tx = false;
        session_command(&session.client, "ROLLBACK").await
    }

    async fn close(&self) -> Result<()> {
        let session = self.session.lock().await.take();
        self.closed.store(true, Ordering::SeqCst);

        let Some(session) = session else {
            tracing::debug!("connection already closed");
            return Ok(());
        };

        if session.implicit_tx || session.abandoned {
            if let Err(e) = session.client.batch_execute("ROLLBACK").await {
                tracing::warn!(error = %e, "rollback on close failed");
            }
        }
        drop(session);
        tracing::info!("CockroachDB connection closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// An explicit transaction.
///
/// Holds the session lock for its whole lifetime, so no other statement on
/// the connection can interleave with it.
pub struct CockroachTransaction {
    session: OwnedMutexGuard<Option<Session>>,
    finished: bool,
}

impl CockroachTransaction {
    fn client(&self) -> Result<&Client> {
        self.session
            .as_ref()
            .map(|s| &s.client)
            .ok_or(TpccError::NoConnection)
    }
}

impl Drop for CockroachTransaction {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("transaction dropped without commit or rollback");
            if let Some(session) = self.session.as_mut() {
                session.abandoned = true;
            }
        }
    }
}

#[async_trait]
impl Transaction for CockroachTransaction {
    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %preview(sql)))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        run_statement(self.client()?, sql, params).await
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        session_command(self.client()?, "COMMIT").await?;
        tracing::debug!("transaction committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        session_command(self.client()?, "ROLLBACK").await?;
        tracing::debug!("transaction rolled back");
        Ok(())
    }
}
