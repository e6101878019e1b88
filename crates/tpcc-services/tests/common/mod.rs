//! Common test utilities and mocks

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tpcc_core::{
    Connection, Result, ResultSet, Row, Scalar, StatementKind, TpccError, Transaction, Value,
};

type Responder = Box<dyn Fn(&str, &[Value]) -> Option<Result<ResultSet>> + Send + Sync>;

#[derive(Default)]
struct MockState {
    responders: Vec<Responder>,
    query_log: Vec<String>,
    param_log: Vec<Vec<Value>>,
    autocommit: bool,
    closed: bool,
    unhealthy: bool,
}

/// Mock connection for testing service-layer logic without a real database.
///
/// Responses are chosen by the first responder that claims a statement;
/// unclaimed reads return no rows and unclaimed writes report one affected
/// row. Every statement and session command is logged for assertions.
#[derive(Clone)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                autocommit: true,
                ..MockState::default()
            })),
        }
    }

    /// Return `result` for every statement containing `sql_contains`
    pub fn with_query_response(self, sql_contains: &str, result: ResultSet) -> Self {
        let pattern = sql_contains.to_string();
        self.with_handler(move |sql, _| sql.contains(&pattern).then(|| Ok(result.clone())))
    }

    /// Fail every statement containing `sql_contains`
    pub fn with_failure_on(self, sql_contains: &str) -> Self {
        let pattern = sql_contains.to_string();
        self.with_handler(move |sql, params| {
            sql.contains(&pattern)
                .then(|| Err(TpccError::query("scripted failure", sql, params)))
        })
    }

    /// Register a responder that sees the statement and its parameters
    pub fn with_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Option<Result<ResultSet>> + Send + Sync + 'static,
    {
        self.state.lock().responders.push(Box::new(handler));
        self
    }

    /// Make the sentinel query return an unexpected value
    pub fn unhealthy(self) -> Self {
        self.state.lock().unhealthy = true;
        self
    }

    /// Statements and session commands in execution order
    pub fn query_log(&self) -> Vec<String> {
        self.state.lock().query_log.clone()
    }

    /// Parameters of the logged statements whose text contains `sql_contains`
    pub fn params_for(&self, sql_contains: &str) -> Vec<Vec<Value>> {
        let state = self.state.lock();
        state
            .query_log
            .iter()
            .zip(state.param_log.iter())
            .filter(|(sql, _)| sql.contains(sql_contains))
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn count_of(&self, sql_contains: &str) -> usize {
        self.query_log()
            .iter()
            .filter(|sql| sql.contains(sql_contains))
            .count()
    }

    fn log_command(&self, command: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TpccError::NoConnection);
        }
        state.query_log.push(command.to_string());
        state.param_log.push(Vec::new());
        Ok(())
    }

    fn respond(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TpccError::NoConnection);
        }
        let sql = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        state.query_log.push(sql.clone());
        state.param_log.push(params.to_vec());

        if sql.contains("test_value") {
            let value = if state.unhealthy { 0 } else { 1 };
            return Ok(result_set(vec![vec![("test_value", Scalar::Int(value))]]));
        }

        for responder in &state.responders {
            if let Some(result) = responder(&sql, params) {
                return result;
            }
        }

        if StatementKind::classify(&sql).returns_rows() {
            Ok(ResultSet::empty())
        } else {
            Ok(ResultSet {
                affected_rows: 1,
                ..ResultSet::default()
            })
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        self.respond(sql, params)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.log_command("BEGIN")?;
        Ok(Box::new(MockTransaction { conn: self.clone() }))
    }

    fn autocommit(&self) -> bool {
        self.state.lock().autocommit
    }

    async fn set_autocommit(&self, enabled: bool) -> Result<()> {
        self.log_command(&format!("SET AUTOCOMMIT {}", enabled))?;
        self.state.lock().autocommit = enabled;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.log_command("COMMIT")
    }

    async fn rollback(&self) -> Result<()> {
        self.log_command("ROLLBACK")
    }

    async fn close(&self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

struct MockTransaction {
    conn: MockConnection,
}

#[async_trait]
impl Transaction for MockTransaction {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        self.conn.respond(sql, params)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.conn.log_command("COMMIT")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.conn.log_command("ROLLBACK")
    }
}

/// Build a result set from rows of (column, cell) pairs
pub fn result_set(rows: Vec<Vec<(&str, Scalar)>>) -> ResultSet {
    ResultSet::from_rows(rows.into_iter().map(Row::from_pairs).collect())
}

/// A single-row, single-column result set
pub fn single(column: &str, value: Scalar) -> ResultSet {
    result_set(vec![vec![(column, value)]])
}

pub fn decimal(s: &str) -> Scalar {
    Scalar::Decimal(s.parse().expect("valid decimal"))
}

pub fn text(s: &str) -> Scalar {
    Scalar::Text(s.to_string())
}

/// Parameter at `index` as an integer
pub fn int_param(params: &[Value], index: usize) -> Option<i64> {
    params.get(index).and_then(Value::as_i64)
}
