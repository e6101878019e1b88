//! In-memory scripted connection for unit tests

use crate::{
    Connection, Result, ResultSet, Row, Scalar, StatementKind, TpccError, Transaction, Value,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct Inner {
    log: Vec<String>,
    autocommit: bool,
    closed: bool,
    fail_on: Vec<String>,
    sentinel: i64,
}

/// Records every statement and session command; fails any call whose text
/// contains one of the configured patterns.
#[derive(Clone)]
pub(crate) struct ScriptedConnection {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedConnection {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                log: Vec::new(),
                autocommit: true,
                closed: false,
                fail_on: Vec::new(),
                sentinel: 1,
            })),
        }
    }

    pub fn failing_on(self, pattern: &str) -> Self {
        self.inner.lock().fail_on.push(pattern.to_string());
        self
    }

    pub fn with_sentinel(self, value: i64) -> Self {
        self.inner.lock().sentinel = value;
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.inner.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.inner.lock().log.clear();
    }

    fn record(&self, entry: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(TpccError::NoConnection);
        }
        inner.log.push(entry.to_string());
        if inner.fail_on.iter().any(|p| entry.contains(p.as_str())) {
            return Err(TpccError::session(format!("scripted failure on {}", entry)));
        }
        Ok(())
    }

    fn run(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        self.record(sql.trim())
            .map_err(|e| match e {
                TpccError::Query { message, .. } => TpccError::query(message, sql, params),
                other => other,
            })?;

        if StatementKind::classify(sql).returns_rows() {
            let sentinel = self.inner.lock().sentinel;
            let rows = if sql.contains("test_value") {
                vec![Row::from_pairs([("test_value", Scalar::Int(sentinel))])]
            } else {
                Vec::new()
            };
            Ok(ResultSet::from_rows(rows))
        } else {
            Ok(ResultSet {
                affected_rows: 1,
                ..ResultSet::default()
            })
        }
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn driver_name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        self.run(sql, params)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.record("BEGIN")?;
        Ok(Box::new(ScriptedTransaction { conn: self.clone() }))
    }

    fn autocommit(&self) -> bool {
        self.inner.lock().autocommit
    }

    async fn set_autocommit(&self, enabled: bool) -> Result<()> {
        self.record(&format!("SET AUTOCOMMIT {}", enabled))?;
        self.inner.lock().autocommit = enabled;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.record("COMMIT")
    }

    async fn rollback(&self) -> Result<()> {
        self.record("ROLLBACK")
    }

    async fn close(&self) -> Result<()> {
        self.inner.lock().closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

struct ScriptedTransaction {
    conn: ScriptedConnection,
}

#[async_trait]
impl Transaction for ScriptedTransaction {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        self.conn.run(sql, params)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.conn.record("COMMIT")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.conn.record("ROLLBACK")
    }
}
