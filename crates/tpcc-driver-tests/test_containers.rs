//! Docker container management and TPC-C seeding for integration tests.
//!
//! The database is prepared once per test process: the first test that asks
//! for it starts a PostgreSQL container (or picks up
//! `TPCC_TEST_CONNECTION_STRING`), creates the nine TPC-C tables plus the ACID
//! scratch table and loads a deterministic dataset. Later callers get the
//! cached connection string.
//!
//! # Dataset
//!
//! | table      | rows per warehouse | notes                                      |
//! |------------|--------------------|--------------------------------------------|
//! | district   | 10                 | `d_next_o_id = 31`                         |
//! | customer   | 300                | balance -10.00, credit `BC` every 10th     |
//! | item       | 100 (global)       | price `1.00 + 0.50 * i_id`                 |
//! | stock      | 100                | quantity 5 for every 10th item, else >= 50 |
//! | order      | 300                | orders 22..=30 of each district pending    |
//! | order_line | 1500               | 5 lines per order, 10.00 each when pending |
//! | new_order  | 90                 |                                            |

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use tpcc_core::{Connection, ConnectionConfig, DatabaseDriver, DbProvider};
use tpcc_drivers::cockroach::CockroachDriver;
use tpcc_services::AcidSuite;

/// Variable naming an existing database to test against instead of a container
pub const EXTERNAL_DATABASE_VAR: &str = "TPCC_TEST_CONNECTION_STRING";

/// Warehouses loaded by the seed
pub const WAREHOUSES: i32 = 6;
/// Orders loaded per district; the next order id is one past this
pub const ORDERS_PER_DISTRICT: i32 = 30;
/// First order id of each district still waiting in `new_order`
pub const FIRST_PENDING_ORDER: i32 = 22;
/// Items loaded into the catalog
pub const ITEMS: i32 = 100;

/// A prepared test database
pub struct TestDatabase {
    /// Connection string with TLS disabled
    pub connection_string: String,
    /// Where the database came from, for log output
    pub origin: &'static str,
    #[allow(dead_code)]
    container: Option<ContainerAsync<Postgres>>,
}

static DATABASE: OnceCell<TestDatabase> = OnceCell::const_new();

/// Get the seeded test database, starting and loading it on first use.
///
/// Container startup plus seeding takes a few seconds; subsequent calls
/// return immediately.
pub async fn test_database() -> Result<&'static TestDatabase> {
    DATABASE.get_or_try_init(prepare).await
}

async fn prepare() -> Result<TestDatabase> {
    let database = match std::env::var(EXTERNAL_DATABASE_VAR) {
        Ok(connection_string) if !connection_string.trim().is_empty() => {
            tracing::info!("using externally managed test database");
            TestDatabase {
                connection_string,
                origin: "external",
                container: None,
            }
        }
        _ => start_postgres().await?,
    };

    seed(&database.connection_string)
        .await
        .context("failed to seed TPC-C dataset")?;
    Ok(database)
}

async fn start_postgres() -> Result<TestDatabase> {
    tracing::info!("starting PostgreSQL test container");

    let container = Postgres::default()
        .start()
        .await
        .context("failed to start postgres container - is Docker running?")?;
    let host = container
        .get_host()
        .await
        .context("failed to get postgres host")?;
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .context("failed to get postgres port")?;

    tracing::info!(%host, port, "PostgreSQL test container started");

    // testcontainers-modules Postgres defaults: postgres user/password with "postgres" database
    Ok(TestDatabase {
        connection_string: format!(
            "postgresql://postgres:postgres@{}:{}/postgres?sslmode=disable",
            host, port
        ),
        origin: "container",
        container: Some(container),
    })
}

/// Connect with retries; the server may still be starting
async fn connect_with_retry(connection_string: &str) -> Result<Arc<dyn Connection>> {
    let config = ConnectionConfig::new(DbProvider::Cockroach, connection_string)
        .with_connect_timeout(Duration::from_secs(5));
    let driver = CockroachDriver::new();

    let max_retries = 8;
    for attempt in 1..=max_retries {
        match driver.connect(&config).await {
            Ok(conn) => return Ok(conn),
            Err(e) if attempt < max_retries => {
                let delay = Duration::from_millis(250 * 2u64.pow(attempt.min(4)));
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "test database not ready, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to connect after {} attempts: {}",
                    max_retries,
                    e
                ));
            }
        }
    }
    unreachable!("the last attempt returns")
}

const DROP_TABLES: &[&str] = &[
    "DROP TABLE IF EXISTS new_order",
    "DROP TABLE IF EXISTS order_line",
    r#"DROP TABLE IF EXISTS "order""#,
    "DROP TABLE IF EXISTS history",
    "DROP TABLE IF EXISTS stock",
    "DROP TABLE IF EXISTS item",
    "DROP TABLE IF EXISTS customer",
    "DROP TABLE IF EXISTS district",
    "DROP TABLE IF EXISTS warehouse",
    "DROP TABLE IF EXISTS acid_probe",
];

const CREATE_TABLES: &[&str] = &[
    "CREATE TABLE warehouse (
        w_id INT PRIMARY KEY,
        w_name VARCHAR(10),
        w_street_1 VARCHAR(20),
        w_street_2 VARCHAR(20),
        w_city VARCHAR(20),
        w_state CHAR(2),
        w_zip CHAR(9),
        w_tax DECIMAL(4,4),
        w_ytd DECIMAL(12,2)
    )",
    "CREATE TABLE district (
        d_id INT,
        d_w_id INT,
        d_name VARCHAR(10),
        d_street_1 VARCHAR(20),
        d_street_2 VARCHAR(20),
        d_city VARCHAR(20),
        d_state CHAR(2),
        d_zip CHAR(9),
        d_tax DECIMAL(4,4),
        d_ytd DECIMAL(12,2),
        d_next_o_id INT,
        PRIMARY KEY (d_w_id, d_id)
    )",
    "CREATE TABLE customer (
        c_id INT,
        c_d_id INT,
        c_w_id INT,
        c_first VARCHAR(16),
        c_middle CHAR(2),
        c_last VARCHAR(16),
        c_street_1 VARCHAR(20),
        c_city VARCHAR(20),
        c_state CHAR(2),
        c_zip CHAR(9),
        c_phone CHAR(16),
        c_since TIMESTAMP,
        c_credit CHAR(2),
        c_credit_lim DECIMAL(12,2),
        c_discount DECIMAL(4,4),
        c_balance DECIMAL(12,2),
        c_ytd_payment DECIMAL(12,2),
        c_payment_cnt INT,
        c_delivery_cnt INT,
        c_data VARCHAR(500),
        PRIMARY KEY (c_w_id, c_d_id, c_id)
    )",
    "CREATE TABLE history (
        h_c_id INT,
        h_c_d_id INT,
        h_c_w_id INT,
        h_d_id INT,
        h_w_id INT,
        h_date TIMESTAMP,
        h_amount DECIMAL(6,2),
        h_data VARCHAR(24)
    )",
    r#"CREATE TABLE "order" (
        o_id INT,
        o_d_id INT,
        o_w_id INT,
        o_c_id INT,
        o_entry_d TIMESTAMP,
        o_carrier_id INT,
        o_ol_cnt INT,
        o_all_local INT,
        PRIMARY KEY (o_w_id, o_d_id, o_id)
    )"#,
    "CREATE TABLE new_order (
        no_o_id INT,
        no_d_id INT,
        no_w_id INT,
        PRIMARY KEY (no_w_id, no_d_id, no_o_id)
    )",
    "CREATE TABLE item (
        i_id INT PRIMARY KEY,
        i_im_id INT,
        i_name VARCHAR(24),
        i_price DECIMAL(5,2),
        i_data VARCHAR(50)
    )",
    "CREATE TABLE stock (
        s_i_id INT,
        s_w_id INT,
        s_quantity INT,
        s_ytd INT,
        s_order_cnt INT,
        s_remote_cnt INT,
        s_data VARCHAR(50),
        PRIMARY KEY (s_w_id, s_i_id)
    )",
    "CREATE TABLE order_line (
        ol_o_id INT,
        ol_d_id INT,
        ol_w_id INT,
        ol_number INT,
        ol_i_id INT,
        ol_supply_w_id INT,
        ol_delivery_d TIMESTAMP,
        ol_quantity INT,
        ol_amount DECIMAL(6,2),
        ol_dist_info CHAR(24),
        PRIMARY KEY (ol_w_id, ol_d_id, ol_o_id, ol_number)
    )",
];

fn seed_statements() -> Vec<String> {
    let w = WAREHOUSES;
    let orders = ORDERS_PER_DISTRICT;
    let pending = FIRST_PENDING_ORDER;
    let items = ITEMS;

    vec![
        format!(
            "INSERT INTO warehouse (w_id, w_name, w_street_1, w_street_2, w_city, w_state, w_zip, w_tax, w_ytd)
             SELECT w, 'W' || w::TEXT, 'Main St', '', 'Springfield', 'NY', '123456789', 0.1000, 300000.00
             FROM generate_series(1, {w}) AS ws(w)"
        ),
        format!(
            "INSERT INTO district (d_id, d_w_id, d_name, d_street_1, d_street_2, d_city, d_state, d_zip, d_tax, d_ytd, d_next_o_id)
             SELECT d, w, 'D' || d::TEXT, 'Side St', '', 'Springfield', 'NY', '123456789', 0.0500, 30000.00, {next}
             FROM generate_series(1, {w}) AS ws(w), generate_series(1, 10) AS ds(d)",
            next = orders + 1
        ),
        format!(
            "INSERT INTO customer (c_id, c_d_id, c_w_id, c_first, c_middle, c_last, c_street_1, c_city,
                                   c_state, c_zip, c_phone, c_since, c_credit, c_credit_lim, c_discount,
                                   c_balance, c_ytd_payment, c_payment_cnt, c_delivery_cnt, c_data)
             SELECT c, d, w, 'First' || c::TEXT, 'OE', 'Last' || c::TEXT, 'Elm St', 'Springfield',
                    'NY', '123456789', '5550100', now()::TIMESTAMP,
                    CASE WHEN c % 10 = 0 THEN 'BC' ELSE 'GC' END, 50000.00, 0.1000,
                    -10.00, 10.00, 1, 0, 'customer data'
             FROM generate_series(1, {w}) AS ws(w), generate_series(1, 10) AS ds(d), generate_series(1, {orders}) AS cs(c)"
        ),
        format!(
            "INSERT INTO item (i_id, i_im_id, i_name, i_price, i_data)
             SELECT i, i, 'Item ' || i::TEXT, 1.00 + 0.50 * i, 'item data'
             FROM generate_series(1, {items}) AS its(i)"
        ),
        format!(
            "INSERT INTO stock (s_i_id, s_w_id, s_quantity, s_ytd, s_order_cnt, s_remote_cnt, s_data)
             SELECT i, w, CASE WHEN i % 10 = 0 THEN 5 ELSE 50 + i % 50 END, 0, 0, 0, 'stock data'
             FROM generate_series(1, {w}) AS ws(w), generate_series(1, {items}) AS its(i)"
        ),
        format!(
            r#"INSERT INTO "order" (o_id, o_d_id, o_w_id, o_c_id, o_entry_d, o_carrier_id, o_ol_cnt, o_all_local)
             SELECT o, d, w, o, now()::TIMESTAMP,
                    CASE WHEN o < {pending} THEN o % 10 + 1 ELSE NULL END, 5, 1
             FROM generate_series(1, {w}) AS ws(w), generate_series(1, 10) AS ds(d), generate_series(1, {orders}) AS os(o)"#
        ),
        format!(
            "INSERT INTO order_line (ol_o_id, ol_d_id, ol_w_id, ol_number, ol_i_id, ol_supply_w_id,
                                     ol_delivery_d, ol_quantity, ol_amount, ol_dist_info)
             SELECT o, d, w, n, (o * 5 + n) % {items} + 1, w,
                    CASE WHEN o < {pending} THEN now()::TIMESTAMP ELSE NULL END, 5,
                    CASE WHEN o < {pending} THEN 0.00 ELSE 10.00 END, 'dist_info'
             FROM generate_series(1, {w}) AS ws(w), generate_series(1, 10) AS ds(d),
                  generate_series(1, {orders}) AS os(o), generate_series(1, 5) AS ns(n)"
        ),
        format!(
            "INSERT INTO new_order (no_o_id, no_d_id, no_w_id)
             SELECT o, d, w
             FROM generate_series(1, {w}) AS ws(w), generate_series(1, 10) AS ds(d),
                  generate_series({pending}, {orders}) AS os(o)"
        ),
    ]
}

async fn seed(connection_string: &str) -> Result<()> {
    let conn = connect_with_retry(connection_string).await?;

    tracing::info!("creating TPC-C schema");
    for sql in DROP_TABLES.iter().chain(CREATE_TABLES) {
        conn.execute(sql, &[])
            .await
            .with_context(|| format!("schema statement failed: {}", tpcc_core::preview(sql)))?;
    }

    // Created up front so concurrently running ACID tests never race on the DDL
    AcidSuite::prepare_probe_table(conn.as_ref()).await?;

    tracing::info!("loading TPC-C dataset");
    for sql in seed_statements() {
        let result = conn
            .execute(&sql, &[])
            .await
            .with_context(|| format!("seed statement failed: {}", tpcc_core::preview(&sql)))?;
        tracing::debug!(rows = result.affected_rows, "seed statement executed");
    }

    let check = conn
        .execute("SELECT COUNT(*) AS count FROM new_order", &[])
        .await
        .context("failed to verify seed")?;
    let pending = check.first().and_then(|r| r.get_i64("count")).unwrap_or(0);
    if pending == 0 {
        return Err(anyhow::anyhow!("TPC-C data not loaded - new_order is empty"));
    }
    tracing::info!(pending_orders = pending, "TPC-C dataset ready");

    conn.close().await?;
    Ok(())
}
