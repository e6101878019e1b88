//! ACID property probes
//!
//! Each probe opens its own connections and works on the scratch table
//! `acid_probe`, scoped to a per-suite session id so concurrent runs do not
//! interfere.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tpcc_core::{
    Connection, ConnectionConfig, DatabaseDriver, Statement, StatementBatch, TpccError, Value,
};

const CREATE_PROBE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS acid_probe (
        session_id TEXT NOT NULL,
        id INT NOT NULL,
        balance DECIMAL(12, 2) NOT NULL CHECK (balance >= 0),
        PRIMARY KEY (session_id, id)
    )";

const INSERT_PROBE: &str = "INSERT INTO acid_probe (session_id, id, balance) VALUES ($1, $2, $3)";

const COUNT_PROBES: &str = "SELECT COUNT(*) AS count FROM acid_probe WHERE session_id = $1";

const COUNT_PROBE: &str =
    "SELECT COUNT(*) AS count FROM acid_probe WHERE session_id = $1 AND id = $2";

const PROBE_BALANCE: &str =
    "SELECT balance FROM acid_probe WHERE session_id = $1 AND id = $2";

const DELETE_PROBES: &str = "DELETE FROM acid_probe WHERE session_id = $1";

/// How long a reader may wait on an uncommitted write before the wait
/// itself counts as isolation
const ISOLATION_READ_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcidProperty {
    Atomicity,
    Consistency,
    Isolation,
    Durability,
}

impl AcidProperty {
    pub const ALL: [AcidProperty; 4] = [
        AcidProperty::Atomicity,
        AcidProperty::Consistency,
        AcidProperty::Isolation,
        AcidProperty::Durability,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            AcidProperty::Atomicity => "A failing batch leaves none of its writes behind",
            AcidProperty::Consistency => "Constraint violations are rejected without side effects",
            AcidProperty::Isolation => "Uncommitted writes are invisible to other sessions",
            AcidProperty::Durability => "Committed writes survive the writer's session",
        }
    }
}

impl std::fmt::Display for AcidProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AcidProperty::Atomicity => "atomicity",
            AcidProperty::Consistency => "consistency",
            AcidProperty::Isolation => "isolation",
            AcidProperty::Durability => "durability",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for AcidProperty {
    type Err = TpccError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AcidProperty::ALL
            .into_iter()
            .find(|p| p.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                TpccError::Configuration(format!(
                    "Unknown ACID test '{}'. Expected one of: atomicity, consistency, isolation, durability",
                    s
                ))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
}

/// One assertion inside a property test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    fn new(name: &str, passed: bool, detail: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            passed,
            detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcidTestResult {
    pub property: AcidProperty,
    pub status: TestStatus,
    pub description: &'static str,
    pub duration_ms: u64,
    pub checks: Vec<CheckResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AcidTestResult {
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcidSummary {
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    /// Percentage of passed tests, 0.0 when nothing ran
    pub success_rate: f64,
    pub duration_ms: u64,
}

impl AcidSummary {
    pub fn from_results(results: &[AcidTestResult], duration: Duration) -> Self {
        let total_tests = results.len();
        let passed_tests = results.iter().filter(|r| r.passed()).count();
        let success_rate = if total_tests == 0 {
            0.0
        } else {
            passed_tests as f64 * 100.0 / total_tests as f64
        };
        Self {
            total_tests,
            passed_tests,
            failed_tests: total_tests - passed_tests,
            success_rate,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcidReport {
    pub provider: String,
    pub session_id: String,
    pub tests: Vec<AcidTestResult>,
    pub summary: AcidSummary,
}

/// Runs the ACID probes against the configured database
pub struct AcidSuite {
    driver: Arc<dyn DatabaseDriver>,
    config: ConnectionConfig,
    session_id: String,
}

impl AcidSuite {
    pub fn new(driver: Arc<dyn DatabaseDriver>, config: ConnectionConfig) -> Self {
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        tracing::info!(provider = driver.name(), %session_id, "ACID suite initialized");
        Self {
            driver,
            config,
            session_id,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Run every property test and summarize
    pub async fn run_all(&self) -> AcidReport {
        self.run_selected(&AcidProperty::ALL).await
    }

    /// Run the given property tests in order and summarize
    pub async fn run_selected(&self, properties: &[AcidProperty]) -> AcidReport {
        let started = Instant::now();
        let mut tests = Vec::with_capacity(properties.len());
        for property in properties {
            tests.push(self.run(*property).await);
        }
        let summary = AcidSummary::from_results(&tests, started.elapsed());
        tracing::info!(
            passed = summary.passed_tests,
            failed = summary.failed_tests,
            success_rate = summary.success_rate,
            "ACID suite finished"
        );
        AcidReport {
            provider: self.driver.display_name().to_string(),
            session_id: self.session_id.clone(),
            tests,
            summary,
        }
    }

    /// Run one property test. Never fails; errors become a failed result.
    #[tracing::instrument(skip(self), fields(session_id = %self.session_id))]
    pub async fn run(&self, property: AcidProperty) -> AcidTestResult {
        let started = Instant::now();
        let outcome = match property {
            AcidProperty::Atomicity => self.atomicity().await,
            AcidProperty::Consistency => self.consistency().await,
            AcidProperty::Isolation => self.isolation().await,
            AcidProperty::Durability => self.durability().await,
        };
        self.cleanup().await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let (checks, error) = match outcome {
            Ok(checks) => (checks, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
        let status = if error.is_none() && checks.iter().all(|c| c.passed) {
            TestStatus::Passed
        } else {
            TestStatus::Failed
        };

        match status {
            TestStatus::Passed => tracing::info!(%property, duration_ms, "ACID test passed"),
            TestStatus::Failed => tracing::error!(
                %property,
                duration_ms,
                error = error.as_deref().unwrap_or("check failed"),
                "ACID test failed"
            ),
        }

        AcidTestResult {
            property,
            status,
            description: property.description(),
            duration_ms,
            checks,
            error,
        }
    }

    /// Create the scratch table if it does not exist yet
    pub async fn prepare_probe_table(conn: &dyn Connection) -> Result<(), TpccError> {
        conn.execute(CREATE_PROBE_TABLE, &[]).await.map(|_| ())
    }

    async fn open(&self) -> Result<Arc<dyn Connection>, TpccError> {
        let conn = self.driver.connect(&self.config).await?;
        Self::prepare_probe_table(conn.as_ref()).await?;
        Ok(conn)
    }

    fn insert(&self, id: i32, balance: Value) -> Statement {
        Statement::new(
            INSERT_PROBE,
            vec![Value::String(self.session_id.clone()), Value::Int32(id), balance],
        )
    }

    async fn count(&self, conn: &dyn Connection, id: Option<i32>) -> Result<i64, TpccError> {
        let result = match id {
            Some(id) => {
                conn.execute(
                    COUNT_PROBE,
                    &[Value::String(self.session_id.clone()), Value::Int32(id)],
                )
                .await?
            }
            None => {
                conn.execute(COUNT_PROBES, &[Value::String(self.session_id.clone())])
                    .await?
            }
        };
        Ok(result.first().and_then(|r| r.get_i64("count")).unwrap_or(0))
    }

    async fn atomicity(&self) -> Result<Vec<CheckResult>, TpccError> {
        let conn = self.open().await?;
        let autocommit_before = conn.autocommit();

        let batch: StatementBatch = [
            self.insert(1, Value::Decimal(Decimal::from(100))),
            self.insert(2, Value::Decimal(Decimal::from(100))),
            self.insert(1, Value::Decimal(Decimal::from(50))),
        ]
        .into_iter()
        .collect();

        let batch_error = conn.execute_batch(&batch).await.err();
        let remaining = self.count(conn.as_ref(), None).await?;
        close_quietly(conn.as_ref()).await;

        Ok(vec![
            CheckResult::new(
                "failing_batch_rejected",
                batch_error.is_some(),
                batch_error.map(|e| e.to_string()),
            ),
            CheckResult::new(
                "no_partial_writes",
                remaining == 0,
                Some(format!("{} rows visible after rollback", remaining)),
            ),
            CheckResult::new(
                "autocommit_restored",
                conn.autocommit() == autocommit_before,
                None,
            ),
        ])
    }

    async fn consistency(&self) -> Result<Vec<CheckResult>, TpccError> {
        let conn = self.open().await?;
        let baseline = self.insert(10, Value::Decimal(Decimal::from(100)));
        conn.execute(&baseline.sql, &baseline.params).await?;

        let violations = [
            ("duplicate_primary_key", self.insert(10, Value::Decimal(Decimal::from(5)))),
            ("check_constraint", self.insert(11, Value::Decimal(Decimal::from(-1)))),
            ("not_null_constraint", self.insert(12, Value::Null)),
        ];

        let mut checks = Vec::with_capacity(violations.len() + 1);
        for (name, statement) in violations {
            let result = conn.execute(&statement.sql, &statement.params).await;
            checks.push(CheckResult::new(
                name,
                result.is_err(),
                result.err().map(|e| e.to_string()),
            ));
        }

        let rows = self.count(conn.as_ref(), None).await?;
        let balance = conn
            .execute(
                PROBE_BALANCE,
                &[Value::String(self.session_id.clone()), Value::Int32(10)],
            )
            .await?
            .first()
            .and_then(|r| r.get_decimal("balance"));
        close_quietly(conn.as_ref()).await;

        checks.push(CheckResult::new(
            "state_unchanged",
            rows == 1 && balance == Some(Decimal::from(100)),
            Some(format!("{} rows, balance {:?}", rows, balance)),
        ));
        Ok(checks)
    }

    async fn isolation(&self) -> Result<Vec<CheckResult>, TpccError> {
        let writer = self.open().await?;
        let reader = self.open().await?;

        writer.set_autocommit(false).await?;
        let pending = self.insert(20, Value::Decimal(Decimal::from(100)));
        if let Err(e) = writer.execute(&pending.sql, &pending.params).await {
            rollback_quietly(writer.as_ref()).await;
            return Err(e);
        }

        // A reader may either skip the pending write or wait on it
        let uncommitted = match tokio::time::timeout(
            ISOLATION_READ_WAIT,
            self.count(reader.as_ref(), Some(20)),
        )
        .await
        {
            Ok(Ok(visible)) => CheckResult::new(
                "uncommitted_write_invisible",
                visible == 0,
                Some(format!("reader saw {} rows", visible)),
            ),
            Ok(Err(e)) => CheckResult::new("uncommitted_write_invisible", false, Some(e.to_string())),
            Err(_) => CheckResult::new(
                "uncommitted_write_invisible",
                true,
                Some("reader blocked until the writer finished".to_string()),
            ),
        };

        let commit = writer.commit().await;
        let restore = writer.set_autocommit(true).await;
        close_quietly(writer.as_ref()).await;
        close_quietly(reader.as_ref()).await;
        commit?;
        restore?;

        let observer = self.open().await?;
        let visible = self.count(observer.as_ref(), Some(20)).await?;
        close_quietly(observer.as_ref()).await;

        Ok(vec![
            uncommitted,
            CheckResult::new(
                "committed_write_visible",
                visible == 1,
                Some(format!("{} rows after commit", visible)),
            ),
        ])
    }

    async fn durability(&self) -> Result<Vec<CheckResult>, TpccError> {
        let writer = self.open().await?;
        let committed = self.insert(30, Value::Decimal(Decimal::from(250)));
        writer.execute(&committed.sql, &committed.params).await?;
        writer.close().await?;

        let reader = self.open().await?;
        let balance = reader
            .execute(
                PROBE_BALANCE,
                &[Value::String(self.session_id.clone()), Value::Int32(30)],
            )
            .await?
            .first()
            .and_then(|r| r.get_decimal("balance"));
        close_quietly(reader.as_ref()).await;

        Ok(vec![
            CheckResult::new("writer_closed", writer.is_closed(), None),
            CheckResult::new(
                "committed_row_persisted",
                balance == Some(Decimal::from(250)),
                Some(format!("balance {:?}", balance)),
            ),
        ])
    }

    /// Remove this session's probe rows; failures are only logged
    async fn cleanup(&self) {
        let conn = match self.driver.connect(&self.config).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "skipping ACID cleanup");
                return;
            }
        };
        if let Err(e) = conn
            .execute(DELETE_PROBES, &[Value::String(self.session_id.clone())])
            .await
        {
            tracing::warn!(error = %e, "failed to clean up ACID probe rows");
        }
        close_quietly(conn.as_ref()).await;
    }
}

async fn close_quietly(conn: &dyn Connection) {
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "failed to close probe connection");
    }
}

async fn rollback_quietly(conn: &dyn Connection) {
    if let Err(e) = conn.rollback().await {
        tracing::warn!(error = %e, "failed to roll back probe transaction");
    }
    if let Err(e) = conn.set_autocommit(true).await {
        tracing::warn!(error = %e, "failed to restore autocommit");
    }
    close_quietly(conn).await;
}
